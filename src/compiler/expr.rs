//! Expressions, emitted in postfix order.
//!
//! Precedence, loosest first: `or xor`, `and`, `not`, comparisons, `&`,
//! `+ -`, `* / %`, unary `-`, `^`.

use super::{Result, Session};
use crate::bytecode::{ByteCode, VariableAddress};
use crate::diagnostic::{Diagnostic, ErrorCode};
use crate::lexer::{Token, TokenKind};
use crate::variable::Variable;

/// A rule that emitted nothing but a single `EvalLiteral`, so the caller
/// may fold it.
#[derive(Debug, Clone)]
pub(super) struct Constant {
    value: Variable,
    /// Literal pool length before this constant's operands were interned.
    mark: usize,
}

type Folded = Option<Constant>;

type Rule<'s> = fn(&mut Session<'s>) -> Result<Folded>;

const OR_OPS: &[TokenKind] = &[TokenKind::Or, TokenKind::Xor];
const AND_OPS: &[TokenKind] = &[TokenKind::And];
const COMPARE_OPS: &[TokenKind] = &[
    TokenKind::Equal,
    TokenKind::NotEqual,
    TokenKind::LessThan,
    TokenKind::LessThanOrEqual,
    TokenKind::GreaterThan,
    TokenKind::GreaterThanOrEqual,
];
const CONCAT_OPS: &[TokenKind] = &[TokenKind::Concat];
const ADD_OPS: &[TokenKind] = &[TokenKind::Plus, TokenKind::Minus];
const MUL_OPS: &[TokenKind] = &[TokenKind::Multiply, TokenKind::Divide, TokenKind::Modulus];

impl<'s> Session<'s> {
    /// Compiles one expression: a count word, then its postfix tokens.
    pub(super) fn expression(&mut self) -> Result<()> {
        let token = self.next();
        if !starts_operand(token.kind) {
            let diagnostic = Diagnostic::error(ErrorCode::ExpectedExpression, token.line).with_token(&token.lexeme);
            self.unget(token);
            return Err(diagnostic.into());
        }
        self.unget(token);
        self.counted(|s| s.or_expr().map(drop))
    }

    /// Runs `body` in its own counter scope and patches the count word
    /// written in front of it.
    pub(super) fn counted(&mut self, body: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let count_addr = self.writer.write_word(0);
        self.writer.push_scope();
        let result = body(self);
        let count = self.writer.pop_scope();
        self.writer.write_word_at(count_addr, count as u32);
        result
    }

    pub(super) fn or_expr(&mut self) -> Result<Folded> {
        self.binary(OR_OPS, Self::and_expr)
    }

    fn and_expr(&mut self) -> Result<Folded> {
        self.binary(AND_OPS, Self::not_expr)
    }

    fn not_expr(&mut self) -> Result<Folded> {
        if self.accept(TokenKind::Not) {
            let operand = self.not_expr()?;
            return Ok(self.unary(ByteCode::EvalNot, operand));
        }
        self.binary(COMPARE_OPS, Self::concat_expr)
    }

    fn concat_expr(&mut self) -> Result<Folded> {
        self.binary(CONCAT_OPS, Self::add_expr)
    }

    fn add_expr(&mut self) -> Result<Folded> {
        self.binary(ADD_OPS, Self::mul_expr)
    }

    fn mul_expr(&mut self) -> Result<Folded> {
        self.binary(MUL_OPS, Self::negate_expr)
    }

    fn negate_expr(&mut self) -> Result<Folded> {
        if self.accept(TokenKind::Minus) {
            let operand = self.negate_expr()?;
            return Ok(self.unary(ByteCode::EvalNegate, operand));
        }
        self.power_expr()
    }

    fn power_expr(&mut self) -> Result<Folded> {
        let base = self.operand()?;
        if !self.accept(TokenKind::Power) {
            return Ok(base);
        }
        let exponent = self.negate_expr()?;
        Ok(self.fold_binary(ByteCode::EvalPower, base, exponent))
    }

    /// Left-associative chain of `ops` over `next`.
    fn binary(&mut self, ops: &[TokenKind], next: Rule<'s>) -> Result<Folded> {
        let mut left = next(self)?;
        loop {
            let kind = self.peek_kind();
            let Some(op) = kind.binary_byte_code().filter(|_| ops.contains(&kind)) else {
                return Ok(left);
            };
            self.next();
            let right = next(self)?;
            left = self.fold_binary(op, left, right);
        }
    }

    /// Replaces two literal operands with their result. Pool entries the
    /// operands added are dropped again; nothing else can refer to them.
    fn fold_binary(&mut self, op: ByteCode, left: Folded, right: Folded) -> Folded {
        if let (Some(a), Some(b), Some(apply)) = (&left, &right, op.binary_operator()) {
            let value = apply(&a.value, &b.value);
            for _ in 0..4 {
                self.writer.undo_last_write();
            }
            self.literals.truncate(a.mark);
            return Some(self.emit_literal(value));
        }
        self.writer.write(op);
        None
    }

    fn unary(&mut self, op: ByteCode, operand: Folded) -> Folded {
        if let (Some(c), Some(apply)) = (&operand, op.unary_operator()) {
            let value = apply(&c.value);
            self.writer.undo_last_write();
            self.writer.undo_last_write();
            self.literals.truncate(c.mark);
            return Some(self.emit_literal(value));
        }
        self.writer.write(op);
        None
    }

    fn emit_literal(&mut self, value: Variable) -> Constant {
        let mark = self.literals.len();
        let index = self.literal(value.clone());
        self.writer.write_with(ByteCode::EvalLiteral, index);
        Constant { value, mark }
    }

    // ── Operands ────────────────────────────────────────────────────

    fn operand(&mut self) -> Result<Folded> {
        let token = self.next();
        match token.kind {
            kind if kind.is_literal() => {
                let value = token.literal().unwrap_or_default();
                Ok(Some(self.emit_literal(value)))
            }
            TokenKind::LeftParen => {
                let inner = self.or_expr()?;
                self.expect(TokenKind::RightParen, ErrorCode::ExpectedRightParen)?;
                Ok(inner)
            }
            TokenKind::LeftBrace => {
                self.list_initializer()?;
                Ok(None)
            }
            TokenKind::Symbol => {
                self.symbol_operand(token)?;
                Ok(None)
            }
            _ => {
                let diagnostic = Diagnostic::error(ErrorCode::ExpectedOperand, token.line).with_token(&token.lexeme);
                self.unget(token);
                Err(diagnostic.into())
            }
        }
    }

    /// `{ e1, e2, ... }`
    fn list_initializer(&mut self) -> Result<()> {
        self.writer.write(ByteCode::EvalInitializeList);
        let count_addr = self.writer.write_word(0);
        let mut count = 0u32;
        if !self.accept(TokenKind::RightBrace) {
            loop {
                self.expression()?;
                count += 1;
                if self.accept(TokenKind::RightBrace) {
                    break;
                }
                self.expect(TokenKind::Comma, ErrorCode::ExpectedRightBrace)?;
            }
        }
        self.writer.write_word_at(count_addr, count);
        Ok(())
    }

    fn symbol_operand(&mut self, name: Token) -> Result<()> {
        match self.peek_kind() {
            TokenKind::LeftParen => {
                self.next();
                self.call(ByteCode::EvalFunction, &name, true)
            }
            TokenKind::LeftBracket => {
                let address = self.variable(&name)?;
                self.writer.write_with(ByteCode::EvalListVariableMulti, address.pack());
                self.list_indexes()
            }
            _ => {
                if self.lookup_variable(&name.lexeme).is_none() && self.function_exists(&name.lexeme) {
                    return self.call(ByteCode::EvalFunction, &name, false);
                }
                let address = self.variable(&name)?;
                self.emit_variable(address);
                Ok(())
            }
        }
    }

    pub(super) fn emit_variable(&mut self, address: VariableAddress) {
        self.writer.write_with(ByteCode::EvalVariable, address.pack());
    }

    /// `[i][j]...`: the index count, then one expression per index.
    pub(super) fn list_indexes(&mut self) -> Result<()> {
        let count_addr = self.writer.write_word(0);
        let mut count = 0u32;
        while self.accept(TokenKind::LeftBracket) {
            self.expression()?;
            self.expect(TokenKind::RightBracket, ErrorCode::ExpectedRightBracket)?;
            count += 1;
        }
        self.writer.write_word_at(count_addr, count);
        Ok(())
    }

    /// Emits a call. With `parenthesized`, the `(` has been consumed and
    /// arguments run to `)`; otherwise they run to the end of the
    /// statement.
    pub(super) fn call(&mut self, op: ByteCode, name: &Token, parenthesized: bool) -> Result<()> {
        let function = self.function_reference(&name.lexeme);
        self.writer.write_with(op, function as u32);
        let argc_addr = self.writer.write_word(0);
        let argc = if parenthesized {
            self.parenthesized_arguments()?
        } else if op == ByteCode::ExecFunction {
            self.bare_arguments()?
        } else {
            0
        };
        self.writer.write_word_at(argc_addr, argc as u32);
        self.check_call(function, name, argc)
    }

    fn parenthesized_arguments(&mut self) -> Result<usize> {
        if self.accept(TokenKind::RightParen) {
            return Ok(0);
        }
        let mut argc = 0;
        loop {
            self.expression()?;
            argc += 1;
            if self.accept(TokenKind::RightParen) {
                return Ok(argc);
            }
            self.expect(TokenKind::Comma, ErrorCode::ExpectedRightParen)?;
        }
    }

    fn bare_arguments(&mut self) -> Result<usize> {
        let mut argc = 0;
        if !starts_operand(self.peek_kind()) {
            return Ok(argc);
        }
        loop {
            self.expression()?;
            argc += 1;
            if !self.accept(TokenKind::Comma) {
                return Ok(argc);
            }
        }
    }
}

fn starts_operand(kind: TokenKind) -> bool {
    kind.is_literal()
        || matches!(
            kind,
            TokenKind::Symbol
                | TokenKind::LeftParen
                | TokenKind::LeftBrace
                | TokenKind::Minus
                | TokenKind::Not
        )
}
