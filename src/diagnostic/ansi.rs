use super::{Diagnostic, Severity, SourceMap};

/// Human-readable diagnostic output for terminals.
pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color { format!("\x1b[{code}m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }

    fn bold_red(&self, s: &str) -> String {
        self.paint("1;31", s)
    }

    fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    /// Renders one diagnostic. With `source`, the offending line is quoted
    /// under the message.
    pub fn render(&self, d: &Diagnostic, file: Option<&str>, source: Option<&str>) -> String {
        let mut out = String::new();

        let label = match d.severity {
            Severity::Error => "error",
            Severity::Fatal => "fatal error",
        };
        out.push_str(&format!(
            "{}[{}]: {}\n",
            self.bold_red(label),
            d.code.id(),
            self.bold(&d.message)
        ));

        let location = match file {
            Some(file) => format!("{file}:{}", d.line),
            None => format!("line {}", d.line),
        };
        out.push_str(&format!("  {} {}\n", self.cyan("-->"), location));

        if let Some(source) = source {
            let map = SourceMap::new(source);
            let text = map.line_text(d.line);
            if !text.is_empty() {
                let gutter = d.line.to_string().len();
                let pad = " ".repeat(gutter);
                let pipe = self.cyan("|");
                out.push_str(&format!("{pad} {pipe}\n"));
                out.push_str(&format!("{} {pipe} {text}\n", self.cyan(&d.line.to_string())));
                out.push_str(&format!("{pad} {pipe}\n"));
            }
        }

        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", self.dim("="), note));
        }
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} suggestion: {}\n", self.dim("="), suggestion));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::ErrorCode;

    fn sample() -> Diagnostic {
        Diagnostic::error(ErrorCode::ExpectedRightParen, 2)
            .with_token("}")
            .with_note("in function 'main'")
    }

    #[test]
    fn render_header_and_location() {
        let r = AnsiRenderer { use_color: false };
        let out = r.render(&sample(), Some("demo.silk"), None);
        assert!(out.starts_with("error[E023]: Closing parenthesis"), "got:\n{out}");
        assert!(out.contains("--> demo.silk:2"), "got:\n{out}");
        assert!(out.contains("note: in function 'main'"), "got:\n{out}");
    }

    #[test]
    fn render_quotes_source_line() {
        let r = AnsiRenderer { use_color: false };
        let out = r.render(&sample(), None, Some("main() {\n  print(1 }\n}"));
        assert!(out.contains("2 |   print(1 }"), "got:\n{out}");
        assert!(out.contains("--> line 2"), "got:\n{out}");
    }

    #[test]
    fn fatal_label() {
        let r = AnsiRenderer { use_color: false };
        let d = Diagnostic::fatal(ErrorCode::TooManyErrors, 9);
        assert!(r.render(&d, None, None).starts_with("fatal error[E001]"));
    }

    #[test]
    fn color_toggle() {
        let colored = AnsiRenderer { use_color: true }.render(&sample(), None, None);
        let plain = AnsiRenderer { use_color: false }.render(&sample(), None, None);
        assert!(colored.contains("\x1b["));
        assert!(!plain.contains("\x1b["));
    }
}
