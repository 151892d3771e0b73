use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::variable::Variable;

/// Compiler settings. Every field has a default, so a JSON file only needs
/// the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Errors tolerated before compilation gives up with `TOO_MANY_ERRORS`.
    pub max_errors: usize,
    /// Store a source line for every instruction word.
    pub line_numbers: bool,
    /// Merge the built-in function and variable catalogue.
    pub internal_functions: bool,
    /// Extra read-only globals.
    pub variables: IndexMap<String, Variable>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            max_errors: 45,
            line_numbers: true,
            internal_functions: true,
            variables: IndexMap::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("invalid configuration in {path}: {source}")]
    Parse { path: String, source: serde_json::Error },
}

impl CompilerOptions {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: display.clone(), source })?;
        Self::from_json_str(&text).map_err(|source| ConfigError::Parse { path: display, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = CompilerOptions::default();
        assert_eq!(options.max_errors, 45);
        assert!(options.line_numbers);
        assert!(options.internal_functions);
        assert!(options.variables.is_empty());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let options = CompilerOptions::from_json_str(
            r#"{ "max_errors": 3, "variables": { "Version": "1.2", "Limit": 10 } }"#,
        )
        .unwrap();
        assert_eq!(options.max_errors, 3);
        assert!(options.line_numbers);
        assert_eq!(options.variables["Version"], Variable::from("1.2"));
        assert_eq!(options.variables["Limit"], Variable::Integer(10));
        let keys: Vec<&String> = options.variables.keys().collect();
        assert_eq!(keys, vec!["Version", "Limit"]);
    }

    #[test]
    fn unreadable_file() {
        let err = CompilerOptions::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silk.json");
        std::fs::write(&path, r#"{ "line_numbers": false }"#).unwrap();
        let options = CompilerOptions::from_json_file(&path).unwrap();
        assert!(!options.line_numbers);
        assert_eq!(options.max_errors, 45);
    }
}
