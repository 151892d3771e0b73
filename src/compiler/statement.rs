use super::{Result, Session, Stop};
use crate::bytecode::{ByteCode, VariableAddress};
use crate::diagnostic::{Diagnostic, ErrorCode};
use crate::lexer::{Keyword, Token, TokenKind};
use crate::variable::Variable;

impl Session<'_> {
    /// `{ statement* }` with the opening brace already consumed.
    pub(super) fn block_body(&mut self) -> Result<()> {
        loop {
            self.flush_lexer_errors()?;
            let token = self.next_skipping_line_breaks();
            match token.kind {
                TokenKind::RightBrace => return Ok(()),
                TokenKind::EndOfFile => {
                    self.unget(token.clone());
                    if self.unterminated_block {
                        return Ok(());
                    }
                    self.unterminated_block = true;
                    return Err(Diagnostic::error(ErrorCode::ExpectedRightBrace, token.line)
                        .with_token(&token.lexeme)
                        .into());
                }
                _ => {
                    let outcome = self.statement(token);
                    self.recover(outcome)?;
                }
            }
        }
    }

    /// A braced block or a single statement.
    fn block(&mut self) -> Result<()> {
        let token = self.next_skipping_line_breaks();
        if token.is(TokenKind::LeftBrace) {
            return self.block_body();
        }
        let outcome = self.statement(token);
        self.recover(outcome)
    }

    fn statement(&mut self, token: Token) -> Result<()> {
        match token.kind {
            TokenKind::Keyword(keyword) => match keyword {
                Keyword::Var => self.var_statement(),
                Keyword::GoTo => self.goto_statement(),
                Keyword::Return => self.return_statement(),
                Keyword::If => self.if_statement(),
                Keyword::While => self.while_statement(),
                Keyword::For => self.for_statement(),
                Keyword::Break => self.loop_jump(&token, true),
                Keyword::Continue => self.loop_jump(&token, false),
                Keyword::Else | Keyword::To | Keyword::Step => {
                    Err(Diagnostic::error(ErrorCode::UnexpectedKeyword, token.line)
                        .with_token(&token.lexeme)
                        .into())
                }
            },
            TokenKind::Symbol => self.symbol_statement(token),
            TokenKind::LeftBrace => self.block_body(),
            _ => Err(Diagnostic::error(ErrorCode::UnexpectedToken, token.line)
                .with_token(&token.lexeme)
                .into()),
        }
    }

    fn symbol_statement(&mut self, name: Token) -> Result<()> {
        match self.peek_kind() {
            TokenKind::Colon => {
                self.next();
                self.label(&name)
            }
            TokenKind::Equal => {
                self.next();
                let address = self.assignable(&name)?;
                self.writer.write_with(ByteCode::Assign, address.pack());
                self.expression()
            }
            TokenKind::LeftBracket => {
                let address = self.assignable(&name)?;
                self.writer.write_with(ByteCode::AssignListVariableMulti, address.pack());
                self.list_indexes()?;
                self.expect(TokenKind::Equal, ErrorCode::ExpectedEquals)?;
                self.expression()
            }
            TokenKind::LeftParen => {
                self.next();
                self.call(ByteCode::ExecFunction, &name, true)
            }
            _ => self.call(ByteCode::ExecFunction, &name, false),
        }
    }

    /// `var a [= expr | [size]], ...` inside a function.
    fn var_statement(&mut self) -> Result<()> {
        loop {
            let name = self.declared_name()?;
            let function = self.current_mut()?;
            let address = match function.add_local(&name.lexeme) {
                Some(address) => address,
                None => {
                    let existing = function.resolve(&name.lexeme);
                    self.report(
                        Diagnostic::error(ErrorCode::VariableAlreadyDefined, name.line).with_token(&name.lexeme),
                    )?;
                    match existing {
                        Some(address) => address,
                        None => return Err(self.internal_error("declared variable has no slot")),
                    }
                }
            };
            if self.accept(TokenKind::Equal) {
                self.writer.write_with(ByteCode::Assign, address.pack());
                self.expression()?;
            } else if self.accept(TokenKind::LeftBracket) {
                self.writer.write_with(ByteCode::Assign, address.pack());
                self.counted(|s| {
                    s.writer.write(ByteCode::EvalCreateList);
                    s.expression()
                })?;
                self.expect(TokenKind::RightBracket, ErrorCode::ExpectedRightBracket)?;
            }
            if !self.accept(TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    fn label(&mut self, name: &Token) -> Result<()> {
        let ip = self.writer.ip();
        let fixups = self.current_mut()?.define_label(&name.lexeme, ip);
        match fixups {
            Some(fixups) => {
                for addr in fixups {
                    self.writer.write_word_at(addr, ip as u32);
                }
                Ok(())
            }
            None => Err(Diagnostic::error(ErrorCode::DuplicateLabel, name.line)
                .with_token(&name.lexeme)
                .into()),
        }
    }

    fn goto_statement(&mut self) -> Result<()> {
        let name = self.expect(TokenKind::Symbol, ErrorCode::ExpectedSymbol)?;
        self.writer.write(ByteCode::Jump);
        let operand = self.writer.write_word(0);
        let target = self.current_mut()?.label_target(&name.lexeme, operand, name.line);
        if let Some(ip) = target {
            self.writer.write_word_at(operand, ip as u32);
        }
        Ok(())
    }

    fn return_statement(&mut self) -> Result<()> {
        self.writer.write(ByteCode::Return);
        let kind = self.peek_kind();
        if kind == TokenKind::RightBrace || self.lexer.peek().is_end_of_statement() {
            self.writer.write_word(0);
            return Ok(());
        }
        self.expression()
    }

    // ── Control flow ────────────────────────────────────────────────

    fn if_statement(&mut self) -> Result<()> {
        self.writer.write(ByteCode::JumpIfFalse);
        let skip = self.writer.write_word(0);
        self.expression()?;
        self.block()?;

        let token = self.next_skipping_line_breaks();
        if !token.is_keyword(Keyword::Else) {
            self.unget(token);
            self.writer.write_word_at(skip, self.writer.ip() as u32);
            return Ok(());
        }
        self.writer.write(ByteCode::Jump);
        let end = self.writer.write_word(0);
        self.writer.write_word_at(skip, self.writer.ip() as u32);
        self.block()?;
        self.writer.write_word_at(end, self.writer.ip() as u32);
        Ok(())
    }

    fn while_statement(&mut self) -> Result<()> {
        let id = self.open_loop()?;
        let body = self.while_body();
        self.close_loop(id)?;
        body
    }

    fn while_body(&mut self) -> Result<()> {
        let start = self.loop_start()?;
        self.writer.write(ByteCode::JumpIfFalse);
        let exit = self.writer.write_word(0);
        self.add_loop_fixup(exit, true)?;
        self.expression()?;
        self.block()?;
        self.writer.write_with(ByteCode::Jump, start as u32);
        Ok(())
    }

    /// `for v = first to last [step n]`. The test is `v <= last`, or
    /// `v >= last` for a negative step.
    fn for_statement(&mut self) -> Result<()> {
        let name = self.expect(TokenKind::Symbol, ErrorCode::ExpectedSymbol)?;
        let counter = self.assignable(&name)?;
        self.expect(TokenKind::Equal, ErrorCode::ExpectedEquals)?;
        self.writer.write_with(ByteCode::Assign, counter.pack());
        self.expression()?;
        if !self.accept(TokenKind::Keyword(Keyword::To)) {
            let token = self.next();
            let diagnostic = Diagnostic::error(ErrorCode::ExpectedTo, token.line).with_token(&token.lexeme);
            self.unget(token);
            return Err(diagnostic.into());
        }

        let id = self.open_loop()?;
        let body = self.for_body(counter);
        self.close_loop(id)?;
        body
    }

    fn for_body(&mut self, counter: VariableAddress) -> Result<()> {
        let start = self.loop_start()?;
        self.writer.write(ByteCode::JumpIfFalse);
        let exit = self.writer.write_word(0);
        self.add_loop_fixup(exit, true)?;

        let mut compare = 0;
        self.counted(|s| {
            s.emit_variable(counter);
            s.or_expr()?;
            compare = s.writer.write(ByteCode::EvalIsLessThanOrEqual);
            Ok(())
        })?;

        let step = self.step_value()?;
        if step.compare(&Variable::Integer(0)).is_lt() {
            self.writer.write_at(compare, ByteCode::EvalIsGreaterThanOrEqual);
        }
        self.block()?;

        let step_ip = self.writer.ip();
        if let Some(ctx) = self.current.as_mut().and_then(|f| f.loops.innermost()) {
            ctx.set_continue_ip(step_ip);
        }
        let step_index = self.literal(step);
        self.writer.write_with(ByteCode::Assign, counter.pack());
        self.counted(|s| {
            s.emit_variable(counter);
            s.writer.write_with(ByteCode::EvalLiteral, step_index);
            s.writer.write(ByteCode::EvalAdd);
            Ok(())
        })?;
        self.writer.write_with(ByteCode::Jump, start as u32);
        Ok(())
    }

    /// The optional `step` literal; 1 when absent. Zero is rejected.
    fn step_value(&mut self) -> Result<Variable> {
        if !self.accept(TokenKind::Keyword(Keyword::Step)) {
            return Ok(Variable::Integer(1));
        }
        let negative = self.accept(TokenKind::Minus);
        let token = self.next();
        let value = match token.kind {
            TokenKind::Integer | TokenKind::Float => token.literal().unwrap_or_default(),
            _ => {
                let diagnostic = Diagnostic::error(ErrorCode::InvalidStepValue, token.line).with_token(&token.lexeme);
                self.unget(token);
                return Err(diagnostic.into());
            }
        };
        let value = if negative { value.negate() } else { value };
        if value.compare(&Variable::Integer(0)).is_eq() {
            return Err(Diagnostic::error(ErrorCode::InvalidStepValue, token.line)
                .with_token(&token.lexeme)
                .into());
        }
        Ok(value)
    }

    /// `break` (to the loop exit) or `continue` (to the loop's continue
    /// address) of the innermost loop.
    fn loop_jump(&mut self, token: &Token, is_break: bool) -> Result<()> {
        let in_loop = self.current.as_ref().is_some_and(|f| f.loops.depth() > 0);
        if !in_loop {
            let code = if is_break { ErrorCode::BreakWithoutLoop } else { ErrorCode::ContinueWithoutLoop };
            return Err(Diagnostic::error(code, token.line).into());
        }
        self.writer.write(ByteCode::Jump);
        let operand = self.writer.write_word(0);
        self.add_loop_fixup(operand, is_break)
    }

    fn add_loop_fixup(&mut self, operand: usize, is_break: bool) -> Result<()> {
        let Some(ctx) = self.current.as_mut().and_then(|f| f.loops.innermost()) else {
            return Err(self.internal_error("no loop to patch"));
        };
        if is_break {
            ctx.break_fixups.push(operand);
        } else {
            ctx.continue_fixups.push(operand);
        }
        Ok(())
    }

    fn loop_start(&mut self) -> Result<usize> {
        match self.current.as_mut().and_then(|f| f.loops.innermost()) {
            Some(ctx) => Ok(ctx.start_ip),
            None => Err(Stop::from(
                Diagnostic::fatal(ErrorCode::InternalError, self.lexer.line()).with_detail("no open loop"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::ByteCode;
    use crate::compiler::Compiler;
    use crate::diagnostic::ErrorCode;
    use crate::program::CompiledProgram;

    fn compile(source: &str) -> CompiledProgram {
        Compiler::default().compile(source).unwrap()
    }

    fn codes(source: &str) -> Vec<ErrorCode> {
        Compiler::default()
            .compile(source)
            .unwrap_err()
            .into_iter()
            .map(|d| d.code)
            .collect()
    }

    /// Every `op` in the stream with its first operand.
    fn find(program: &CompiledProgram, op: ByteCode) -> Vec<(usize, u32)> {
        program
            .instructions()
            .unwrap()
            .into_iter()
            .filter(|&(_, found)| found == op)
            .map(|(ip, _)| (ip, program.byte_codes[ip + 1]))
            .collect()
    }

    fn find_ops(program: &CompiledProgram, op: ByteCode) -> usize {
        program.instructions().unwrap().iter().filter(|&&(_, found)| found == op).count()
    }

    #[test]
    fn while_loop_exit_is_patched_past_the_back_jump() {
        let program = compile("Main(){ x = 0 while (x < 3) { x = x + 1 } return x }");
        let skips = find(&program, ByteCode::JumpIfFalse);
        assert_eq!(skips.len(), 1);
        let (skip_ip, target) = skips[0];
        let back = find(&program, ByteCode::Jump)
            .into_iter()
            .find(|&(ip, to)| ip > skip_ip && to as usize == skip_ip)
            .unwrap();
        assert_eq!(target as usize, back.0 + 2);
        assert_eq!(program.byte_codes[target as usize], ByteCode::Return.word());
    }

    #[test]
    fn control_flow_errors() {
        assert_eq!(codes("Main() { break }"), vec![ErrorCode::BreakWithoutLoop]);
        assert_eq!(codes("Main() { continue }"), vec![ErrorCode::ContinueWithoutLoop]);
        assert_eq!(codes("Main() { for i = 1 to 3 step 0\n}"), vec![ErrorCode::InvalidStepValue]);
        assert_eq!(codes("Main() { for i = 1 3\n}"), vec![ErrorCode::ExpectedTo]);
        assert_eq!(codes("Main() { goto nowhere }"), vec![ErrorCode::LabelNotDefined]);
        assert_eq!(codes("Main() { a:\n a:\n }"), vec![ErrorCode::DuplicateLabel]);
        assert_eq!(codes("Main() { else }"), vec![ErrorCode::UnexpectedKeyword]);
        assert_eq!(codes("Main() {\n x = 1"), vec![ErrorCode::ExpectedRightBrace]);
    }

    #[test]
    fn negative_step_tests_greater_or_equal() {
        let program = compile("Main() { for i = 10 to 1 step -2 { } }");
        assert_eq!(find_ops(&program, ByteCode::EvalIsGreaterThanOrEqual), 1);
        assert_eq!(find_ops(&program, ByteCode::EvalIsLessThanOrEqual), 0);
    }

    #[test]
    fn else_if_chains_compile() {
        let program = compile(
            "Main(x) {\n if x = 1 { return 10 }\n else if x = 2\n  return 20\n else { return 30 }\n}",
        );
        assert_eq!(find(&program, ByteCode::JumpIfFalse).len(), 2);
    }
}
