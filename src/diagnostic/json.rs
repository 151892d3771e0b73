use super::{Diagnostic, Severity};

/// One diagnostic as a single-line JSON object.
pub fn render(d: &Diagnostic) -> String {
    let severity = match d.severity {
        Severity::Error => "error",
        Severity::Fatal => "fatal",
    };

    let mut obj = serde_json::json!({
        "severity": severity,
        "code": d.code.id(),
        "message": d.message,
        "line": d.line,
        "notes": d.notes,
    });

    if let Some(s) = &d.suggestion {
        obj["suggestion"] = serde_json::Value::String(s.clone());
    }

    serde_json::to_string(&obj).unwrap_or_else(|_| {
        r#"{"severity":"fatal","message":"internal error serializing diagnostic"}"#.to_string()
    })
}

/// Every diagnostic of a failed compile as one JSON document.
pub fn render_all(diagnostics: &[Diagnostic]) -> String {
    let items: Vec<serde_json::Value> = diagnostics
        .iter()
        .filter_map(|d| serde_json::from_str(&render(d)).ok())
        .collect();
    serde_json::json!({ "errors": items }).to_string()
}
