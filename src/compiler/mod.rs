//! Single-pass compiler. Each grammar rule validates its tokens and emits
//! bytecode as it goes; there is no syntax tree.

mod expr;
mod function;
mod loop_context;
mod statement;

use std::borrow::Cow;
use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, instrument, trace};

use crate::bytecode::{ByteCode, ByteCodeWriter, VarScope, VariableAddress};
use crate::config::CompilerOptions;
use crate::diagnostic::{Diagnostic, ErrorCode};
use crate::function::{self as func, Arity, Function, UserFunction};
use crate::host::HostRegistry;
use crate::lexer::{Keyword, Lexer, Token, TokenKind};
use crate::program::CompiledProgram;
use crate::variable::Variable;

use function::CompileFunction;
use loop_context::LoopId;

/// Why the current rule stopped.
enum Stop {
    /// Recoverable; compilation resumes at the next statement boundary.
    Error(Diagnostic),
    /// Compilation is over. The reason is already recorded.
    Abort,
}

impl From<Diagnostic> for Stop {
    fn from(diagnostic: Diagnostic) -> Self {
        Stop::Error(diagnostic)
    }
}

type Result<T> = std::result::Result<T, Stop>;

/// Entry address of a function that has been called but not yet defined.
const UNDEFINED_IP: u32 = u32::MAX;

#[derive(Debug)]
struct Global {
    value: Variable,
    read_only: bool,
}

/// A call to a user function, checked once every definition is known.
#[derive(Debug)]
struct CallSite {
    function: usize,
    name: String,
    argc: usize,
    line: u32,
}

/// Compiles Silk source against a host registry.
///
/// ```
/// use silk::compiler::Compiler;
/// use silk::config::CompilerOptions;
///
/// let program = Compiler::new(CompilerOptions::default())
///     .compile("Main() { return 6 * 7 }")
///     .unwrap();
/// assert!(!program.byte_codes.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompilerOptions,
    registry: HostRegistry,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Compiler { options, registry: HostRegistry::new() }
    }

    pub fn with_registry(options: CompilerOptions, registry: HostRegistry) -> Self {
        Compiler { options, registry }
    }

    /// The registry scripts are compiled against, built-ins included when
    /// enabled. Loading a saved program needs the same registry.
    pub fn registry(&self) -> HostRegistry {
        let mut registry = self.registry.clone();
        for (name, value) in &self.options.variables {
            if registry.variable(name).is_none() {
                registry.register_variable(name.clone(), value.clone());
            }
        }
        if self.options.internal_functions {
            registry.merge_internals();
        }
        registry
    }

    #[instrument(skip_all)]
    pub fn compile(&self, source: &str) -> std::result::Result<CompiledProgram, Vec<Diagnostic>> {
        let registry = self.registry();
        let mut session = Session::new(source, &registry, self.options.max_errors);
        match session.compile_source() {
            Ok(()) | Err(Stop::Abort) => {}
            Err(Stop::Error(diagnostic)) => session.errors.push(diagnostic),
        }
        if !session.errors.is_empty() {
            debug!(errors = session.errors.len(), "compilation failed");
            return Err(session.errors);
        }
        let program = session.into_program(self.options.line_numbers);
        debug!(
            words = program.byte_codes.len(),
            functions = program.functions.len(),
            literals = program.literals.len(),
            "compiled"
        );
        Ok(program)
    }
}

/// State of one compilation.
struct Session<'s> {
    lexer: Lexer<'s>,
    writer: ByteCodeWriter,
    functions: IndexMap<String, Function>,
    globals: IndexMap<String, Global>,
    literals: Vec<Variable>,
    /// `None` outside function bodies.
    current: Option<CompileFunction>,
    in_header: bool,
    main_operand: usize,
    calls: Vec<CallSite>,
    errors: Vec<Diagnostic>,
    max_errors: usize,
    unterminated_block: bool,
}

impl<'s> Session<'s> {
    fn new(source: &'s str, registry: &HostRegistry, max_errors: usize) -> Self {
        let functions = registry
            .functions()
            .map(|f| (f.name().to_string(), f.clone()))
            .collect();
        let globals = registry
            .variables()
            .map(|(name, value)| (name.to_string(), Global { value: value.clone(), read_only: true }))
            .collect();

        // Prelude: call Main, then stop.
        let mut writer = ByteCodeWriter::new();
        writer.write(ByteCode::ExecFunction);
        let main_operand = writer.write_word(0);
        writer.write_word(0);
        writer.write(ByteCode::Return);
        writer.write_word(0);

        Session {
            lexer: Lexer::new(source),
            writer,
            functions,
            globals,
            literals: Vec::new(),
            current: None,
            in_header: true,
            main_operand,
            calls: Vec::new(),
            errors: Vec::new(),
            max_errors,
            unterminated_block: false,
        }
    }

    fn compile_source(&mut self) -> Result<()> {
        self.top_level()?;
        self.resolve_calls()?;
        self.resolve_main()?;
        self.flush_lexer_errors()
    }

    fn into_program(self, line_numbers: bool) -> CompiledProgram {
        let (byte_codes, lines) = self.writer.into_parts();
        CompiledProgram {
            byte_codes,
            functions: self.functions.into_values().collect(),
            variables: self.globals.into_values().map(|g| g.value).collect(),
            literals: self.literals,
            line_numbers: line_numbers.then_some(lines),
        }
    }

    // ── Diagnostics ─────────────────────────────────────────────────

    /// Records a diagnostic. Fails once compilation must stop.
    fn report(&mut self, diagnostic: Diagnostic) -> Result<()> {
        self.flush_lexer_errors()?;
        self.record(diagnostic)
    }

    fn record(&mut self, diagnostic: Diagnostic) -> Result<()> {
        let fatal = diagnostic.is_fatal();
        self.errors.push(diagnostic);
        if fatal {
            return Err(Stop::Abort);
        }
        if self.errors.len() > self.max_errors {
            let line = self.lexer.line();
            self.errors.push(Diagnostic::fatal(ErrorCode::TooManyErrors, line));
            return Err(Stop::Abort);
        }
        Ok(())
    }

    fn flush_lexer_errors(&mut self) -> Result<()> {
        for diagnostic in self.lexer.take_errors() {
            self.record(diagnostic)?;
        }
        Ok(())
    }

    /// Turns a recoverable failure into a recorded diagnostic and skips
    /// the rest of the statement.
    fn recover(&mut self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => Ok(()),
            Err(Stop::Error(diagnostic)) => {
                self.report(diagnostic)?;
                self.synchronize();
                Ok(())
            }
            Err(Stop::Abort) => Err(Stop::Abort),
        }
    }

    /// Skips to the end of the line, or up to a brace. Inside a function an
    /// opening brace is kept so the block after a broken header still
    /// compiles as a nested block.
    fn synchronize(&mut self) {
        loop {
            match self.lexer.peek().kind {
                TokenKind::EndOfFile | TokenKind::RightBrace => return,
                TokenKind::LeftBrace if self.current.is_some() => return,
                TokenKind::EndOfLine => {
                    self.next();
                    return;
                }
                _ => {
                    self.next();
                }
            }
        }
    }

    fn internal_error(&self, detail: &str) -> Stop {
        Diagnostic::fatal(ErrorCode::InternalError, self.lexer.line())
            .with_detail(detail)
            .into()
    }

    // ── Tokens ──────────────────────────────────────────────────────

    fn next(&mut self) -> Token {
        let token = self.lexer.next_token();
        self.writer.set_line(token.line);
        token
    }

    fn next_skipping_line_breaks(&mut self) -> Token {
        let token = self.lexer.next_skipping_line_breaks();
        self.writer.set_line(token.line);
        token
    }

    fn unget(&mut self, token: Token) {
        self.lexer.unget(token);
    }

    fn peek_kind(&mut self) -> TokenKind {
        self.lexer.peek().kind
    }

    /// Consumes the next token if it has the given kind.
    fn accept(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.next();
            true
        } else {
            false
        }
    }

    /// Consumes a token of `kind` or fails with `code`, leaving the
    /// offending token unread.
    fn expect(&mut self, kind: TokenKind, code: ErrorCode) -> Result<Token> {
        let token = self.next();
        if token.is(kind) {
            return Ok(token);
        }
        let diagnostic = Diagnostic::error(code, token.line).with_token(&token.lexeme);
        self.unget(token);
        Err(diagnostic.into())
    }

    /// An identifier that may be declared: not a keyword and not `main`.
    fn declared_name(&mut self) -> Result<Token> {
        let token = self.expect(TokenKind::Symbol, ErrorCode::ExpectedSymbol)?;
        if func::is_main(&token.lexeme) {
            return Err(reserved(&token).into());
        }
        Ok(token)
    }

    // ── Top level ───────────────────────────────────────────────────

    fn top_level(&mut self) -> Result<()> {
        loop {
            self.flush_lexer_errors()?;
            let token = self.next_skipping_line_breaks();
            let outcome = match token.kind {
                TokenKind::EndOfFile => return Ok(()),
                TokenKind::Symbol if self.peek_kind() == TokenKind::LeftParen => {
                    self.function_definition(token)
                }
                TokenKind::Keyword(Keyword::Var) if self.in_header => self.header_var(),
                TokenKind::Keyword(Keyword::Var) => Err(Diagnostic::error(ErrorCode::IllegalVar, token.line)
                    .with_note("global variables must be declared before the first function")
                    .into()),
                _ => Err(Diagnostic::error(ErrorCode::CodeOutsideFunction, token.line)
                    .with_token(&token.lexeme)
                    .into()),
            };
            self.recover(outcome)?;
        }
    }

    /// `var a`, `var a = 1`, `var a = { 1, "x" }`, `var a[10]`, comma
    /// separated. Header initializers must be literals.
    fn header_var(&mut self) -> Result<()> {
        loop {
            let name = self.declared_name()?;
            let value = if self.accept(TokenKind::Equal) {
                self.literal_initializer()?
            } else if self.accept(TokenKind::LeftBracket) {
                let size = self.expect(TokenKind::Integer, ErrorCode::ExpectedLiteral)?;
                self.expect(TokenKind::RightBracket, ErrorCode::ExpectedRightBracket)?;
                let size = size.literal().map_or(0, |v| v.to_integer());
                Variable::list_of(usize::try_from(size).unwrap_or(0))
            } else {
                Variable::default()
            };
            if self.globals.contains_key(&name.lexeme) {
                self.report(
                    Diagnostic::error(ErrorCode::VariableAlreadyDefined, name.line).with_token(&name.lexeme),
                )?;
            } else {
                self.globals.insert(name.lexeme, Global { value, read_only: false });
            }
            if !self.accept(TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    fn literal_initializer(&mut self) -> Result<Variable> {
        if self.accept(TokenKind::LeftBrace) {
            let mut items = Vec::new();
            if self.accept(TokenKind::RightBrace) {
                return Ok(Variable::List(items));
            }
            loop {
                items.push(self.literal_value()?);
                if self.accept(TokenKind::RightBrace) {
                    return Ok(Variable::List(items));
                }
                self.expect(TokenKind::Comma, ErrorCode::ExpectedRightBrace)?;
            }
        }
        self.literal_value()
    }

    fn literal_value(&mut self) -> Result<Variable> {
        let negative = self.accept(TokenKind::Minus);
        let token = self.next();
        let value = match token.literal() {
            Some(value) if !negative => value,
            Some(value) if token.kind != TokenKind::String => value.negate(),
            _ => {
                let diagnostic = Diagnostic::error(ErrorCode::ExpectedLiteral, token.line).with_token(&token.lexeme);
                self.unget(token);
                return Err(diagnostic.into());
            }
        };
        Ok(value)
    }

    // ── Functions ───────────────────────────────────────────────────

    fn function_definition(&mut self, name: Token) -> Result<()> {
        self.in_header = false;
        let index = self.declare_function(&name.lexeme);
        if index.is_none() {
            self.report(
                Diagnostic::error(ErrorCode::DuplicateFunctionName, name.line).with_token(&name.lexeme),
            )?;
        }
        let mut function = CompileFunction::new(&name.lexeme, index, self.writer.ip());
        self.parameters(&mut function)?;

        self.current = Some(function);
        let body = self.function_body();
        let end = match self.current.take() {
            Some(function) => self.end_function(function),
            None => Err(self.internal_error("function record lost")),
        };
        body.and(end)
    }

    fn parameters(&mut self, function: &mut CompileFunction) -> Result<()> {
        self.expect(TokenKind::LeftParen, ErrorCode::ExpectedLeftParen)?;
        if self.accept(TokenKind::RightParen) {
            return Ok(());
        }
        loop {
            let name = self.declared_name()?;
            if function.add_parameter(&name.lexeme).is_none() {
                self.report(
                    Diagnostic::error(ErrorCode::VariableAlreadyDefined, name.line).with_token(&name.lexeme),
                )?;
            }
            if self.accept(TokenKind::RightParen) {
                return Ok(());
            }
            self.expect(TokenKind::Comma, ErrorCode::ExpectedRightParen)?;
        }
    }

    fn function_body(&mut self) -> Result<()> {
        let token = self.next_skipping_line_breaks();
        if !token.is(TokenKind::LeftBrace) {
            let diagnostic = Diagnostic::error(ErrorCode::ExpectedLeftBrace, token.line).with_token(&token.lexeme);
            self.unget(token);
            return Err(diagnostic.into());
        }
        self.block_body()
    }

    /// Closes a function: implicit return, label check, table update.
    fn end_function(&mut self, function: CompileFunction) -> Result<()> {
        self.writer.write(ByteCode::Return);
        self.writer.write_word(0);

        let missing: Vec<(String, u32)> = function
            .undefined_labels()
            .map(|(name, line)| (name.to_string(), line))
            .collect();
        for (name, line) in missing {
            self.report(Diagnostic::error(ErrorCode::LabelNotDefined, line).with_token(&name))?;
        }

        trace!(
            function = %function.name,
            ip = function.ip,
            params = function.num_parameters(),
            locals = function.num_locals(),
            "function compiled"
        );
        let Some(index) = function.index else {
            return Ok(());
        };
        if let Some((_, Function::User(user))) = self.functions.get_index_mut(index) {
            user.ip = function.ip as u32;
            user.num_locals = function.num_locals() as u32;
            user.num_parameters = function.num_parameters() as u32;
        }
        Ok(())
    }

    /// Claims a table slot for a definition. `None` when the name is
    /// already defined or belongs to the host.
    fn declare_function(&mut self, name: &str) -> Option<usize> {
        let key = function_key(name);
        match self.functions.get_full_mut(key.as_ref()) {
            Some((index, _, Function::User(user))) if user.ip == UNDEFINED_IP => {
                user.name = name.to_string();
                Some(index)
            }
            Some(_) => None,
            None => Some(self.insert_placeholder(key.into_owned(), name)),
        }
    }

    /// Table index for a call, adding a forward reference if needed.
    fn function_reference(&mut self, name: &str) -> usize {
        let key = function_key(name);
        match self.functions.get_index_of(key.as_ref()) {
            Some(index) => index,
            None => self.insert_placeholder(key.into_owned(), name),
        }
    }

    fn function_exists(&self, name: &str) -> bool {
        self.functions.contains_key(function_key(name).as_ref())
    }

    fn insert_placeholder(&mut self, key: String, name: &str) -> usize {
        let placeholder = Function::User(UserFunction {
            name: name.to_string(),
            ip: UNDEFINED_IP,
            num_locals: 0,
            num_parameters: 0,
        });
        self.functions.insert_full(key, placeholder).0
    }

    /// Host functions are checked now; user functions once all bodies
    /// are known.
    fn check_call(&mut self, function: usize, name: &Token, argc: usize) -> Result<()> {
        let arity = match self.functions.get_index(function) {
            Some((_, Function::User(_))) => {
                self.calls.push(CallSite {
                    function,
                    name: name.lexeme.clone(),
                    argc,
                    line: name.line,
                });
                return Ok(());
            }
            Some((_, f)) => f.arity().unwrap_or(Arity::ANY),
            None => return Err(self.internal_error("call to unknown function slot")),
        };
        arity.check(&name.lexeme, argc).map_err(|message| {
            Diagnostic::error(ErrorCode::WrongNumberOfArguments, name.line)
                .with_detail(message)
                .into()
        })
    }

    fn resolve_calls(&mut self) -> Result<()> {
        let calls = std::mem::take(&mut self.calls);
        let mut reported = HashSet::new();
        for call in calls {
            let Some((_, Function::User(user))) = self.functions.get_index(call.function) else {
                continue;
            };
            if user.ip == UNDEFINED_IP {
                if reported.insert(call.function) {
                    self.report(
                        Diagnostic::error(ErrorCode::FunctionNotDefined, call.line).with_token(&call.name),
                    )?;
                }
                continue;
            }
            if let Err(message) = Arity::exactly(user.num_parameters as usize).check(&user.name, call.argc) {
                self.report(Diagnostic::error(ErrorCode::WrongNumberOfArguments, call.line).with_detail(message))?;
            }
        }
        Ok(())
    }

    fn resolve_main(&mut self) -> Result<()> {
        let main = match self.functions.get_full(func::MAIN) {
            Some((index, _, Function::User(user))) if user.ip != UNDEFINED_IP => Some(index),
            _ => None,
        };
        match main {
            Some(index) => {
                self.writer.write_word_at(self.main_operand, index as u32);
                Ok(())
            }
            None => {
                let line = self.lexer.line();
                self.report(Diagnostic::error(ErrorCode::MainNotDefined, line))
            }
        }
    }

    // ── Variables ───────────────────────────────────────────────────

    fn current_mut(&mut self) -> Result<&mut CompileFunction> {
        if self.current.is_none() {
            return Err(self.internal_error("statement outside a function"));
        }
        self.current.as_mut().ok_or(Stop::Abort)
    }

    /// Resolves an existing variable: parameters, locals, then globals.
    fn lookup_variable(&self, name: &str) -> Option<VariableAddress> {
        if let Some(address) = self.current.as_ref().and_then(|f| f.resolve(name)) {
            return Some(address);
        }
        self.globals
            .get_index_of(name)
            .map(|index| VariableAddress::new(VarScope::Global, index as u32))
    }

    /// Resolves a variable read, declaring a new local on first use.
    fn variable(&mut self, name: &Token) -> Result<VariableAddress> {
        if let Some(address) = self.lookup_variable(&name.lexeme) {
            return Ok(address);
        }
        if func::is_main(&name.lexeme) {
            return Err(reserved(name).into());
        }
        let function = self.current_mut()?;
        match function.add_local(&name.lexeme) {
            Some(address) => Ok(address),
            None => Err(self.internal_error("local slot vanished")),
        }
    }

    /// Like [`Session::variable`], but host variables are rejected.
    fn assignable(&mut self, name: &Token) -> Result<VariableAddress> {
        let address = self.variable(name)?;
        if address.scope == VarScope::Global {
            let read_only = self
                .globals
                .get_index(address.index as usize)
                .is_some_and(|(_, g)| g.read_only);
            if read_only {
                return Err(Diagnostic::error(ErrorCode::AssignToReadOnlyVariable, name.line)
                    .with_token(&name.lexeme)
                    .into());
            }
        }
        Ok(address)
    }

    /// Pool index of a literal, reusing an equal entry.
    fn literal(&mut self, value: Variable) -> u32 {
        let index = match self.literals.iter().position(|v| *v == value) {
            Some(index) => index,
            None => {
                self.literals.push(value);
                self.literals.len() - 1
            }
        };
        index as u32
    }

    // ── Loops ───────────────────────────────────────────────────────

    fn open_loop(&mut self) -> Result<LoopId> {
        let ip = self.writer.ip();
        Ok(self.current_mut()?.loops.open(ip))
    }

    fn close_loop(&mut self, id: LoopId) -> Result<()> {
        let closed = match self.current.as_mut() {
            Some(function) => function.loops.close(id, &mut self.writer).is_ok(),
            None => false,
        };
        if closed {
            Ok(())
        } else {
            Err(self.internal_error("loop closed out of order"))
        }
    }
}

/// Table key of a function name; every spelling of `main` shares one.
fn function_key(name: &str) -> Cow<'_, str> {
    if func::is_main(name) {
        Cow::Borrowed(func::MAIN)
    } else {
        Cow::Borrowed(name)
    }
}

fn reserved(token: &Token) -> Diagnostic {
    Diagnostic::error(ErrorCode::ExpectedSymbol, token.line)
        .with_token(&token.lexeme)
        .with_note(format!("\"{}\" is reserved for the entry function", func::MAIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ByteCodeReader;

    fn compile(source: &str) -> CompiledProgram {
        match Compiler::new(CompilerOptions::default()).compile(source) {
            Ok(program) => program,
            Err(errors) => panic!("unexpected diagnostics: {errors:?}"),
        }
    }

    fn errors(source: &str) -> Vec<ErrorCode> {
        match Compiler::new(CompilerOptions::default()).compile(source) {
            Ok(_) => panic!("expected diagnostics"),
            Err(errors) => errors.into_iter().map(|d| d.code).collect(),
        }
    }

    fn user<'p>(program: &'p CompiledProgram, name: &str) -> &'p UserFunction {
        program
            .functions
            .iter()
            .filter_map(Function::as_user)
            .find(|f| f.name == name)
            .unwrap()
    }

    #[test]
    fn prelude_calls_main() {
        let program = compile("Helper() {}\nmain() { return 1 }");
        let main = program.functions.iter().position(|f| f.name() == "main").unwrap();
        assert_eq!(
            &program.byte_codes[..5],
            &[ByteCode::ExecFunction.word(), main as u32, 0, ByteCode::Return.word(), 0]
        );
    }

    #[test]
    fn frame_sizes() {
        let program = compile("Add(a, b) { var t = a + b\n u = t\n return u }\nMain() { return Add(1, 2) }");
        let add = user(&program, "Add");
        assert_eq!((add.num_parameters, add.num_locals), (2, 2));
    }

    #[test]
    fn header_globals() {
        let program = compile("var a = -3, b[2], c = { 1, \"x\" }\nMain() { return a }");
        let n = program.variables.len();
        assert_eq!(
            &program.variables[n - 3..],
            &[
                Variable::Integer(-3),
                Variable::list_of(2),
                Variable::List(vec![1.into(), "x".into()]),
            ]
        );
    }

    #[test]
    fn constant_folding() {
        let program = compile("Main() { return 2 + 3 * 4 }");
        assert!(program.literals.contains(&Variable::Integer(14)));
        let body = user(&program, "Main").ip as usize;
        let mut reader = ByteCodeReader::new(&program.byte_codes);
        reader.jump_to(body).unwrap();
        assert_eq!(reader.next_opcode().unwrap(), ByteCode::Return);
        assert_eq!(reader.next_word().unwrap(), 1);
        assert_eq!(reader.next_opcode().unwrap(), ByteCode::EvalLiteral);
    }

    #[test]
    fn forward_calls_are_checked_at_the_end() {
        assert_eq!(errors("Main() { Later(1) }\nLater(a, b) {}"), vec![ErrorCode::WrongNumberOfArguments]);
        assert_eq!(errors("Main() { Missing() }"), vec![ErrorCode::FunctionNotDefined]);
        assert!(Compiler::default().compile("Main() { Later(1, 2) }\nLater(a, b) {}").is_ok());
    }

    #[test]
    fn host_arity_is_checked_at_the_call() {
        assert_eq!(errors("Main() { return Left(\"abc\") }"), vec![ErrorCode::WrongNumberOfArguments]);
    }

    #[test]
    fn structural_errors() {
        assert_eq!(errors("Foo() {}"), vec![ErrorCode::MainNotDefined]);
        assert_eq!(errors("Main() {}\nMain() {}"), vec![ErrorCode::DuplicateFunctionName]);
        assert_eq!(errors("x = 1\nMain() {}"), vec![ErrorCode::CodeOutsideFunction]);
        assert_eq!(errors("Main() {}\nvar late"), vec![ErrorCode::IllegalVar]);
        assert_eq!(errors("var g = x\nMain() {}"), vec![ErrorCode::ExpectedLiteral]);
        assert_eq!(errors("Main() { True = 1 }"), vec![ErrorCode::AssignToReadOnlyVariable]);
        assert_eq!(errors("Main() { var main }"), vec![ErrorCode::ExpectedSymbol]);
        assert_eq!(errors("Main() { var a, a }"), vec![ErrorCode::VariableAlreadyDefined]);
    }

    #[test]
    fn recovery_reports_every_bad_statement() {
        let codes = errors("Main() {\n x = )\n y = ]\n z = 1\n}");
        assert_eq!(codes, vec![ErrorCode::ExpectedExpression, ErrorCode::ExpectedExpression]);
    }

    #[test]
    fn error_threshold_aborts() {
        let options = CompilerOptions { max_errors: 2, ..CompilerOptions::default() };
        let err = Compiler::new(options).compile("a\nb\nc\nd\nMain() {}").unwrap_err();
        let codes: Vec<ErrorCode> = err.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                ErrorCode::CodeOutsideFunction,
                ErrorCode::CodeOutsideFunction,
                ErrorCode::CodeOutsideFunction,
                ErrorCode::TooManyErrors,
            ]
        );
        assert!(err.last().unwrap().is_fatal());
    }

    #[test]
    fn line_map_is_optional() {
        let options = CompilerOptions { line_numbers: false, ..CompilerOptions::default() };
        let program = Compiler::new(options).compile("Main() {}").unwrap();
        assert!(program.line_numbers.is_none());
        let program = compile("Main()\n{\n return 1\n}");
        let lines = program.line_numbers.unwrap();
        assert_eq!(lines.len(), program.byte_codes.len());
        assert!(lines.contains(&3));
    }

    #[test]
    fn broken_loop_header_keeps_its_block() {
        let source = "Main() {\n while ) { x = 1 }\n y = 2\n return y\n}\nOther() { return 1 }";
        assert_eq!(errors(source), vec![ErrorCode::ExpectedExpression]);
        assert_eq!(errors("Main() {\n for i = 1 2 { }\n}"), vec![ErrorCode::ExpectedTo]);
    }
}
