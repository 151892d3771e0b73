pub mod ansi;
pub mod json;
mod source_map;

use std::fmt;

pub use source_map::SourceMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL ERROR",
        }
    }
}

/// Compile diagnostic codes. Numbered by position (`E000`, `E001`, ...);
/// new codes are appended so published numbers stay valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,
    TooManyErrors,
    InternalError,

    CodeOutsideFunction,
    DuplicateFunctionName,
    DuplicateLabel,
    FunctionNotDefined,
    IllegalVar,
    InvalidStepValue,
    LabelNotDefined,
    MainNotDefined,
    NewLineInString,
    VariableAlreadyDefined,
    AssignToReadOnlyVariable,
    VariableNotDefined,
    WrongNumberOfArguments,

    ExpectedEquals,
    ExpectedExpression,
    ExpectedLeftBrace,
    ExpectedLeftParen,
    ExpectedLiteral,
    ExpectedOperand,
    ExpectedRightBrace,
    ExpectedRightParen,
    ExpectedRightBracket,
    ExpectedSymbol,
    ExpectedTo,

    BreakWithoutLoop,
    ContinueWithoutLoop,

    UnexpectedCharacter,
    UnexpectedKeyword,
    UnexpectedToken,
}

impl ErrorCode {
    pub fn number(self) -> u32 {
        self as u32
    }

    /// `E` followed by the zero-padded code number.
    pub fn id(self) -> String {
        format!("E{:03}", self.number())
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::NoError => "Operation completed successfully",
            ErrorCode::TooManyErrors => "Too many errors encountered",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::CodeOutsideFunction => "Code is not allowed outside of functions",
            ErrorCode::DuplicateFunctionName => "More than one function defined with the same name",
            ErrorCode::DuplicateLabel => "Label defined more than once",
            ErrorCode::FunctionNotDefined => "Function was not defined",
            ErrorCode::IllegalVar => {
                "The VAR keyword can only appear within a function, or before the first function"
            }
            ErrorCode::InvalidStepValue => "STEP value must be a non-zero numeric literal",
            ErrorCode::LabelNotDefined => "Label was referenced but never defined",
            ErrorCode::MainNotDefined => {
                "Function main() was not defined : You must define main() as the program's starting point"
            }
            ErrorCode::NewLineInString => "New line in string literal",
            ErrorCode::VariableAlreadyDefined => "Variable has already been defined",
            ErrorCode::AssignToReadOnlyVariable => "Cannot change read-only variable",
            ErrorCode::VariableNotDefined => "Use of undefined variable",
            ErrorCode::WrongNumberOfArguments => "Wrong number of arguments",
            ErrorCode::ExpectedEquals => "Expected equal sign \"=\"",
            ErrorCode::ExpectedExpression => "An expression was expected",
            ErrorCode::ExpectedLeftBrace => "Expected opening curly brace \"{\"",
            ErrorCode::ExpectedLeftParen => "Opening parenthesis expected \"(\"",
            ErrorCode::ExpectedLiteral => "Expected literal value",
            ErrorCode::ExpectedOperand => "Operand expected",
            ErrorCode::ExpectedRightBrace => "Closing curly brace \"}\" expected",
            ErrorCode::ExpectedRightParen => "Closing parenthesis \")\" expected",
            ErrorCode::ExpectedRightBracket => "Closing square bracket \"]\" expected",
            ErrorCode::ExpectedSymbol => "Identifier name expected",
            ErrorCode::ExpectedTo => "Expected TO keyword",
            ErrorCode::BreakWithoutLoop => "Break statement outside of loop",
            ErrorCode::ContinueWithoutLoop => "Continue statement outside of loop",
            ErrorCode::UnexpectedCharacter => "Unexpected character encountered",
            ErrorCode::UnexpectedKeyword => "Keyword is unexpected here",
            ErrorCode::UnexpectedToken => "Unexpected token encountered",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One compile problem, pinned to a source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    pub line: u32,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(code: ErrorCode, line: u32) -> Self {
        Diagnostic::new(Severity::Error, code, line)
    }

    pub fn fatal(code: ErrorCode, line: u32) -> Self {
        Diagnostic::new(Severity::Fatal, code, line)
    }

    fn new(severity: Severity, code: ErrorCode, line: u32) -> Self {
        Diagnostic {
            severity,
            code,
            message: code.description().to_string(),
            line,
            notes: Vec::new(),
            suggestion: None,
        }
    }

    /// Appends the offending token text, quoted.
    pub fn with_token(mut self, token: &str) -> Self {
        self.message.push_str(&format!(" : \"{token}\""));
        self
    }

    pub fn with_detail(mut self, detail: impl AsRef<str>) -> Self {
        self.message.push_str(" : ");
        self.message.push_str(detail.as_ref());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} : {} (Line {})",
            self.severity.as_str(),
            self.code.id(),
            self.message,
            self.line
        )
    }
}
