mod keywords;

pub use keywords::{Keyword, keyword};

use keywords::{OperatorWord, operator_word};
use logos::Logos;

use crate::bytecode::ByteCode;
use crate::diagnostic::{Diagnostic, ErrorCode};
use crate::variable::Variable;

#[derive(Debug, Clone, PartialEq)]
struct StringLiteral {
    text: String,
    newline: bool,
}

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\f]+")]
enum RawToken {
    #[token("\n")]
    Newline,
    #[regex(r"//[^\n]*", logos::skip, allow_greedy = true)]
    #[token("/*", block_comment)]
    Comment,

    #[regex(r"[_a-zA-Z][_a-zA-Z0-9]*")]
    Word,
    #[regex(r"0x[0-9a-fA-F]+")]
    Hex,
    #[regex(r"[0-9]+")]
    Integer,
    #[regex(r"[0-9]+\.[0-9]*|\.[0-9]+")]
    Float,
    #[token("\"", |lex| scan_string(lex, '"'))]
    #[token("'", |lex| scan_string(lex, '\''))]
    Text(StringLiteral),

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Multiply,
    #[token("/")]
    Divide,
    #[token("^")]
    Power,
    #[token("%")]
    Modulus,
    #[token("&")]
    Concat,
    #[token("=")]
    Equal,
    #[token("<>")]
    NotEqual,
    #[token(">")]
    GreaterThan,
    #[token(">=")]
    GreaterThanOrEqual,
    #[token("<")]
    LessThan,
    #[token("<=")]
    LessThanOrEqual,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
}

/// Block comments run to the closing `*/`, or to end of input.
fn block_comment(lex: &mut logos::Lexer<RawToken>) -> logos::Skip {
    let rest = lex.remainder();
    let len = rest.find("*/").map(|i| i + 2).unwrap_or(rest.len());
    lex.bump(len);
    logos::Skip
}

/// Scans a quoted string after its opening quote.
///
/// A backslash before a line break continues the string onto the next line
/// and keeps the break (`\r\n` as one unit). A raw line break ends the
/// string without being consumed and is reported as an error.
fn scan_string(lex: &mut logos::Lexer<RawToken>, quote: char) -> StringLiteral {
    let rest = lex.remainder();
    let mut text = String::new();
    let mut newline = false;
    let mut consumed = rest.len();
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => {
                consumed = i + 1;
                break;
            }
            '\r' | '\n' => {
                newline = true;
                consumed = i;
                break;
            }
            '\\' => match chars.next() {
                Some((_, 't')) => text.push('\t'),
                Some((_, 'r')) => text.push('\r'),
                Some((_, 'n')) => text.push('\n'),
                Some((_, '\'')) => text.push('\''),
                Some((_, '"')) => text.push('"'),
                Some((_, '\\')) => text.push('\\'),
                Some((_, '\r')) => {
                    text.push('\r');
                    if chars.next_if(|&(_, c)| c == '\n').is_some() {
                        text.push('\n');
                    }
                }
                Some((_, other)) => {
                    text.push('\\');
                    text.push(other);
                }
                None => {}
            },
            c => text.push(c),
        }
    }
    lex.bump(consumed);
    StringLiteral { text, newline }
}

// ── Tokens ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    EndOfFile,
    EndOfLine,
    Keyword(Keyword),
    Symbol,
    String,
    Integer,
    Float,

    Plus,
    Minus,
    Multiply,
    Divide,
    Power,
    Modulus,
    Concat,
    And,
    Or,
    Xor,
    Not,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,

    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
}

impl TokenKind {
    pub fn is_literal(self) -> bool {
        matches!(self, TokenKind::String | TokenKind::Integer | TokenKind::Float)
    }

    /// Opcode of a binary operator token. `-` maps to subtraction and `not`
    /// has no binary form.
    pub fn binary_byte_code(self) -> Option<ByteCode> {
        Some(match self {
            TokenKind::Plus => ByteCode::EvalAdd,
            TokenKind::Minus => ByteCode::EvalSubtract,
            TokenKind::Multiply => ByteCode::EvalMultiply,
            TokenKind::Divide => ByteCode::EvalDivide,
            TokenKind::Power => ByteCode::EvalPower,
            TokenKind::Modulus => ByteCode::EvalModulus,
            TokenKind::Concat => ByteCode::EvalConcat,
            TokenKind::And => ByteCode::EvalAnd,
            TokenKind::Or => ByteCode::EvalOr,
            TokenKind::Xor => ByteCode::EvalXor,
            TokenKind::Equal => ByteCode::EvalIsEqual,
            TokenKind::NotEqual => ByteCode::EvalIsNotEqual,
            TokenKind::GreaterThan => ByteCode::EvalIsGreaterThan,
            TokenKind::GreaterThanOrEqual => ByteCode::EvalIsGreaterThanOrEqual,
            TokenKind::LessThan => ByteCode::EvalIsLessThan,
            TokenKind::LessThanOrEqual => ByteCode::EvalIsLessThanOrEqual,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token; unescaped contents for strings.
    pub lexeme: String,
    pub line: u32,
}

impl Token {
    fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32) -> Self {
        Token { kind, lexeme: lexeme.into(), line }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        self.kind == TokenKind::Keyword(kw)
    }

    pub fn is_end_of_statement(&self) -> bool {
        matches!(self.kind, TokenKind::EndOfLine | TokenKind::EndOfFile)
    }

    /// Value of a literal token. Hex literals wrap to 32 bits; decimal
    /// integers too large for 32 bits become floats.
    pub fn literal(&self) -> Option<Variable> {
        match self.kind {
            TokenKind::String => Some(Variable::String(self.lexeme.clone())),
            TokenKind::Integer => Some(parse_integer_literal(&self.lexeme)),
            TokenKind::Float => Some(Variable::Float(self.lexeme.parse().unwrap_or(0.0))),
            _ => None,
        }
    }
}

fn parse_integer_literal(text: &str) -> Variable {
    if let Some(hex) = text.strip_prefix("0x") {
        let value = hex
            .chars()
            .filter_map(|c| c.to_digit(16))
            .fold(0u32, |acc, d| acc.wrapping_mul(16).wrapping_add(d));
        return Variable::Integer(value as i32);
    }
    match text.parse::<i32>() {
        Ok(v) => Variable::Integer(v),
        Err(_) => Variable::Float(text.parse().unwrap_or(0.0)),
    }
}

// ── Lexer ───────────────────────────────────────────────────────────

/// Pull lexer with one token of pushback.
///
/// Line breaks are significant and come back as `EndOfLine` tokens.
/// Lexical problems do not stop the scan; they are collected and handed
/// to the compiler through [`Lexer::take_errors`].
pub struct Lexer<'s> {
    source: &'s str,
    inner: logos::Lexer<'s, RawToken>,
    pos: usize,
    line: u32,
    pushed_back: Option<Token>,
    errors: Vec<Diagnostic>,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        Lexer {
            source,
            inner: RawToken::lexer(source),
            pos: 0,
            line: 1,
            pushed_back: None,
            errors: Vec::new(),
        }
    }

    /// Line of the most recently scanned text.
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.pushed_back.take() {
            return token;
        }
        self.scan()
    }

    pub fn peek(&mut self) -> &Token {
        let token = match self.pushed_back.take() {
            Some(token) => token,
            None => self.scan(),
        };
        self.pushed_back.insert(token)
    }

    /// Returns a token so the next read yields it again.
    pub fn unget(&mut self, token: Token) {
        debug_assert!(self.pushed_back.is_none(), "only one token of pushback");
        self.pushed_back = Some(token);
    }

    pub fn next_skipping_line_breaks(&mut self) -> Token {
        loop {
            let token = self.next_token();
            if token.kind != TokenKind::EndOfLine {
                return token;
            }
        }
    }

    /// Drains lexical diagnostics collected so far.
    pub fn take_errors(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.errors)
    }

    fn advance_to(&mut self, offset: usize) {
        self.line += count_newlines(&self.source[self.pos..offset]);
        self.pos = offset;
    }

    fn scan(&mut self) -> Token {
        loop {
            let Some(result) = self.inner.next() else {
                self.advance_to(self.source.len());
                return Token::new(TokenKind::EndOfFile, "<end of file>", self.line);
            };
            let span = self.inner.span();
            self.advance_to(span.start);
            let line = self.line;
            let source = self.source;
            let slice = &source[span.clone()];
            self.advance_to(span.end);

            let kind = match result {
                Ok(RawToken::Newline) => {
                    return Token::new(TokenKind::EndOfLine, "<end of line>", line);
                }
                Ok(RawToken::Comment) => continue,
                Ok(RawToken::Text(literal)) => {
                    if literal.newline {
                        self.errors.push(
                            Diagnostic::error(ErrorCode::NewLineInString, line)
                                .with_token(&literal.text),
                        );
                    }
                    return Token::new(TokenKind::String, literal.text, line);
                }
                Ok(RawToken::Word) => word_kind(slice),
                Ok(RawToken::Hex) | Ok(RawToken::Integer) => TokenKind::Integer,
                Ok(RawToken::Float) => TokenKind::Float,
                Ok(RawToken::Plus) => TokenKind::Plus,
                Ok(RawToken::Minus) => TokenKind::Minus,
                Ok(RawToken::Multiply) => TokenKind::Multiply,
                Ok(RawToken::Divide) => TokenKind::Divide,
                Ok(RawToken::Power) => TokenKind::Power,
                Ok(RawToken::Modulus) => TokenKind::Modulus,
                Ok(RawToken::Concat) => TokenKind::Concat,
                Ok(RawToken::Equal) => TokenKind::Equal,
                Ok(RawToken::NotEqual) => TokenKind::NotEqual,
                Ok(RawToken::GreaterThan) => TokenKind::GreaterThan,
                Ok(RawToken::GreaterThanOrEqual) => TokenKind::GreaterThanOrEqual,
                Ok(RawToken::LessThan) => TokenKind::LessThan,
                Ok(RawToken::LessThanOrEqual) => TokenKind::LessThanOrEqual,
                Ok(RawToken::LeftParen) => TokenKind::LeftParen,
                Ok(RawToken::RightParen) => TokenKind::RightParen,
                Ok(RawToken::LeftBrace) => TokenKind::LeftBrace,
                Ok(RawToken::RightBrace) => TokenKind::RightBrace,
                Ok(RawToken::LeftBracket) => TokenKind::LeftBracket,
                Ok(RawToken::RightBracket) => TokenKind::RightBracket,
                Ok(RawToken::Comma) => TokenKind::Comma,
                Ok(RawToken::Colon) => TokenKind::Colon,
                Err(()) => {
                    self.errors.push(
                        Diagnostic::error(ErrorCode::UnexpectedCharacter, line).with_token(slice),
                    );
                    continue;
                }
            };
            return Token::new(kind, slice, line);
        }
    }
}

fn word_kind(word: &str) -> TokenKind {
    if let Some(op) = operator_word(word) {
        return match op {
            OperatorWord::And => TokenKind::And,
            OperatorWord::Or => TokenKind::Or,
            OperatorWord::Xor => TokenKind::Xor,
            OperatorWord::Not => TokenKind::Not,
        };
    }
    match keyword(word) {
        Some(kw) => TokenKind::Keyword(kw),
        None => TokenKind::Symbol,
    }
}

fn count_newlines(text: &str) -> u32 {
    text.bytes().filter(|&b| b == b'\n').count() as u32
}
