//! Bytecode interpreter.
//!
//! A [`Runtime`] executes one statement-level instruction per
//! [`Runtime::step`]. Its whole state (instruction pointer, call frames,
//! globals) is observable between steps, so a host can run a bounded number
//! of steps per tick and resume later.
//!
//! Pending instructions and partially evaluated expressions live on a heap
//! work stack. A user call inside an expression pushes a frame and returns
//! to `step`; the matching `Return` hands its value to the suspended
//! expression. Native stack depth does not grow with script recursion.

use tracing::{debug, instrument, trace};

use crate::bytecode::{ByteCode, ByteCodeReader, DecodeError, VarScope, VariableAddress};
use crate::function::{Function, UserFunction};
use crate::program::CompiledProgram;
use crate::variable::Variable;

/// Nested calls allowed before execution fails.
pub const MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("function index {0} is out of range")]
    InvalidFunction(usize),
    #[error("literal index {0} is out of range")]
    InvalidLiteral(usize),
    #[error("variable {0:?} is out of range")]
    InvalidVariable(VariableAddress),
    #[error("no active call frame")]
    NoFrame,
    #[error("expression stack underflow at {ip}")]
    StackUnderflow { ip: usize },
    #[error("{op:?} cannot appear {position} (ip {ip})")]
    UnexpectedOpcode { op: ByteCode, ip: usize, position: &'static str },
    #[error("call depth exceeds {}", MAX_CALL_DEPTH)]
    CallDepthExceeded,
    #[error("host function {name} failed: {message}")]
    Host { name: String, message: String },
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Events a running program raises in its host.
pub trait Host {
    fn begin(&mut self) {}

    /// Executes an intrinsic function.
    fn function(&mut self, name: &str, args: &[Variable]) -> std::result::Result<Variable, String>;

    fn end(&mut self) {}
}

/// Host without intrinsics: every call yields Integer 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {
    fn function(&mut self, _name: &str, _args: &[Variable]) -> std::result::Result<Variable, String> {
        Ok(Variable::default())
    }
}

/// Storage of one active call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeFunction {
    pub parameters: Vec<Variable>,
    pub locals: Vec<Variable>,
    pub return_value: Variable,
    /// Work stack height when the call was entered.
    work_base: usize,
}

impl RuntimeFunction {
    /// A zeroed frame sized from `template`, with `args` copied into the
    /// parameter slots. Extra arguments are dropped.
    pub fn new(template: &UserFunction, args: Vec<Variable>) -> Self {
        let mut parameters = args;
        parameters.resize(template.num_parameters as usize, Variable::default());
        RuntimeFunction {
            parameters,
            locals: vec![Variable::default(); template.num_locals as usize],
            return_value: Variable::default(),
            work_base: 0,
        }
    }
}

/// Operand decoded ahead of an instruction's nested expressions.
#[derive(Debug, Clone, Copy)]
enum Operand {
    None,
    Address(usize),
    Function(usize),
    Variable(VariableAddress),
}

/// An instruction waiting for its operand expressions.
#[derive(Debug)]
struct Pending {
    op: ByteCode,
    ip: usize,
    operand: Operand,
    /// Expressions still to evaluate before `op` can complete.
    remaining: usize,
    values: Vec<Variable>,
}

/// A postfix expression with `remaining` tokens left to decode.
#[derive(Debug, Default)]
struct Expression {
    remaining: usize,
    stack: Vec<Variable>,
}

/// Evaluation work. Lives on the heap so that a user call inside an
/// expression suspends it instead of recursing.
#[derive(Debug)]
enum Work {
    Instruction(Pending),
    Expression(Expression),
}

fn is_statement(op: ByteCode) -> bool {
    matches!(
        op,
        ByteCode::Nop
            | ByteCode::ExecFunction
            | ByteCode::Return
            | ByteCode::Jump
            | ByteCode::JumpIfFalse
            | ByteCode::Assign
            | ByteCode::AssignListVariable
            | ByteCode::AssignListVariableMulti
    )
}

pub struct Runtime<'p> {
    program: &'p CompiledProgram,
    reader: ByteCodeReader<'p>,
    frames: Vec<RuntimeFunction>,
    globals: Vec<Variable>,
    work: Vec<Work>,
    /// Value of the most recent return to a call statement.
    returned: Variable,
    started: bool,
    halted: bool,
}

impl<'p> Runtime<'p> {
    pub fn new(program: &'p CompiledProgram) -> Self {
        Runtime {
            program,
            reader: ByteCodeReader::new(&program.byte_codes),
            frames: Vec::new(),
            globals: program.variables.clone(),
            work: Vec::new(),
            returned: Variable::default(),
            started: false,
            halted: false,
        }
    }

    pub fn ip(&self) -> usize {
        self.reader.ip()
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// The innermost call frame.
    pub fn frame(&self) -> Option<&RuntimeFunction> {
        self.frames.last()
    }

    pub fn globals(&self) -> &[Variable] {
        &self.globals
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Main's return value once halted.
    pub fn result(&self) -> &Variable {
        &self.returned
    }

    /// Raises the host's `begin` event. Called by the first `step` if the
    /// host has not called it.
    pub fn start(&mut self, host: &mut dyn Host) {
        if !self.started {
            self.started = true;
            host.begin();
        }
    }

    /// Executes one statement-level instruction, or resumes a statement a
    /// user call suspended. A step also ends when a call enters or returns,
    /// so its work is bounded by the size of one statement. Returns false
    /// once the program has halted.
    pub fn step(&mut self, host: &mut dyn Host) -> Result<bool> {
        if self.halted {
            return Ok(false);
        }
        self.start(host);
        if self.at_statement_boundary() {
            if self.reader.end_of_stream() {
                self.halt(host);
                return Ok(false);
            }
            self.begin_statement()?;
        }
        let depth = self.frames.len();
        while !self.halted && self.frames.len() == depth && !self.at_statement_boundary() {
            self.advance(host)?;
        }
        Ok(!self.halted)
    }

    /// Runs to completion and returns Main's return value.
    #[instrument(skip_all)]
    pub fn run(&mut self, host: &mut dyn Host) -> Result<Variable> {
        let mut steps = 0u64;
        while self.step(host)? {
            steps += 1;
        }
        debug!(steps, result = %self.returned, "program halted");
        Ok(self.returned.clone())
    }

    fn halt(&mut self, host: &mut dyn Host) {
        self.halted = true;
        host.end();
    }

    /// Work below this index belongs to callers suspended mid-expression.
    fn work_base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.work_base)
    }

    fn at_statement_boundary(&self) -> bool {
        self.work.len() <= self.work_base()
    }

    // ── Decoding ────────────────────────────────────────────────────

    fn begin_statement(&mut self) -> Result<()> {
        let ip = self.reader.ip();
        let op = self.reader.next_opcode()?;
        trace!(ip, ?op, depth = self.frames.len(), "execute");
        if !is_statement(op) {
            return Err(RuntimeError::UnexpectedOpcode { op, ip, position: "as a statement" });
        }
        let pending = self.decode(op, ip)?;
        self.work.push(Work::Instruction(pending));
        Ok(())
    }

    /// Reads the fixed operands of `op`; its nested expressions follow.
    fn decode(&mut self, op: ByteCode, ip: usize) -> Result<Pending> {
        let r = &mut self.reader;
        let (operand, remaining) = match op {
            ByteCode::Nop => (Operand::None, 0),
            ByteCode::ExecFunction | ByteCode::EvalFunction => {
                let function = r.next_usize()?;
                (Operand::Function(function), r.next_usize()?)
            }
            ByteCode::Return | ByteCode::EvalCreateList => (Operand::None, 1),
            ByteCode::Jump => (Operand::Address(r.next_usize()?), 0),
            ByteCode::JumpIfFalse => (Operand::Address(r.next_usize()?), 1),
            ByteCode::Assign | ByteCode::EvalListVariable => (Operand::Variable(r.next_variable()?), 1),
            ByteCode::AssignListVariable => (Operand::Variable(r.next_variable()?), 2),
            ByteCode::AssignListVariableMulti => {
                let var = r.next_variable()?;
                (Operand::Variable(var), r.next_usize()? + 1)
            }
            ByteCode::EvalInitializeList => (Operand::None, r.next_usize()?),
            ByteCode::EvalListVariableMulti => {
                let var = r.next_variable()?;
                (Operand::Variable(var), r.next_usize()?)
            }
            op => return Err(RuntimeError::UnexpectedOpcode { op, ip, position: "with operands" }),
        };
        Ok(Pending { op, ip, operand, remaining, values: Vec::new() })
    }

    /// Performs one unit of work: decodes an expression token, opens an
    /// operand expression, or completes an instruction.
    fn advance(&mut self, host: &mut dyn Host) -> Result<()> {
        match self.work.pop() {
            None => Ok(()),
            Some(Work::Expression(mut expr)) => {
                if expr.remaining == 0 {
                    self.deliver(expr.stack.pop().unwrap_or_default());
                    return Ok(());
                }
                expr.remaining -= 1;
                self.work.push(Work::Expression(expr));
                self.token()
            }
            Some(Work::Instruction(mut pending)) => {
                if pending.remaining == 0 {
                    return self.complete(pending, host);
                }
                pending.remaining -= 1;
                self.work.push(Work::Instruction(pending));
                let count = self.reader.next_usize()?;
                self.work.push(Work::Expression(Expression { remaining: count, stack: Vec::new() }));
                Ok(())
            }
        }
    }

    /// Hands a finished value to the innermost waiting instruction or
    /// expression.
    fn deliver(&mut self, value: Variable) {
        match self.work.last_mut() {
            Some(Work::Instruction(pending)) => pending.values.push(value),
            Some(Work::Expression(expr)) => expr.stack.push(value),
            None => {}
        }
    }

    fn operand_stack(&mut self, ip: usize) -> Result<&mut Vec<Variable>> {
        match self.work.last_mut() {
            Some(Work::Expression(expr)) => Ok(&mut expr.stack),
            _ => Err(RuntimeError::StackUnderflow { ip }),
        }
    }

    // ── Expressions ─────────────────────────────────────────────────

    fn token(&mut self) -> Result<()> {
        let ip = self.reader.ip();
        let op = self.reader.next_opcode()?;
        match op {
            ByteCode::EvalLiteral => {
                let index = self.reader.next_usize()?;
                let value =
                    self.program.literals.get(index).cloned().ok_or(RuntimeError::InvalidLiteral(index))?;
                self.operand_stack(ip)?.push(value);
            }
            ByteCode::EvalVariable => {
                let var = self.reader.next_variable()?;
                let value = self.slot(var)?.clone();
                self.operand_stack(ip)?.push(value);
            }
            op => {
                if let Some(apply) = op.binary_operator() {
                    let stack = self.operand_stack(ip)?;
                    let rhs = stack.pop().ok_or(RuntimeError::StackUnderflow { ip })?;
                    let lhs = stack.pop().ok_or(RuntimeError::StackUnderflow { ip })?;
                    stack.push(apply(&lhs, &rhs));
                } else if let Some(apply) = op.unary_operator() {
                    let stack = self.operand_stack(ip)?;
                    let operand = stack.pop().ok_or(RuntimeError::StackUnderflow { ip })?;
                    stack.push(apply(&operand));
                } else if is_statement(op) {
                    return Err(RuntimeError::UnexpectedOpcode { op, ip, position: "in an expression" });
                } else {
                    let pending = self.decode(op, ip)?;
                    self.work.push(Work::Instruction(pending));
                }
            }
        }
        Ok(())
    }

    // ── Completion ──────────────────────────────────────────────────

    fn complete(&mut self, pending: Pending, host: &mut dyn Host) -> Result<()> {
        let Pending { op, ip, operand, mut values, .. } = pending;
        match (op, operand) {
            (ByteCode::Nop, _) => {}
            (ByteCode::ExecFunction | ByteCode::EvalFunction, Operand::Function(index)) => {
                let program = self.program;
                let function = program.functions.get(index).ok_or(RuntimeError::InvalidFunction(index))?;
                match function {
                    Function::User(user) => self.enter(user, values)?,
                    Function::Intrinsic(f) => {
                        let value = host
                            .function(&f.name, &values)
                            .map_err(|message| RuntimeError::Host { name: f.name.clone(), message })?;
                        if op == ByteCode::EvalFunction {
                            self.deliver(value);
                        }
                    }
                    Function::Internal(f) => {
                        let value = f.call(&values);
                        if op == ByteCode::EvalFunction {
                            self.deliver(value);
                        }
                    }
                }
            }
            (ByteCode::Return, _) => {
                let value = values.pop().unwrap_or_default();
                let Some(mut frame) = self.frames.pop() else {
                    self.halt(host);
                    return Ok(());
                };
                frame.return_value = value;
                self.reader.restore()?;
                debug_assert_eq!(self.reader.saved_depth(), self.frames.len());
                if self.at_statement_boundary() {
                    self.returned = frame.return_value;
                } else {
                    self.deliver(frame.return_value);
                }
            }
            (ByteCode::Jump, Operand::Address(target)) => self.reader.jump_to(target)?,
            (ByteCode::JumpIfFalse, Operand::Address(target)) => {
                if values.pop().unwrap_or_default().is_false() {
                    self.reader.jump_to(target)?;
                }
            }
            (ByteCode::Assign, Operand::Variable(var)) => {
                let value = values.pop().unwrap_or_default();
                *self.slot_mut(var)? = value;
            }
            (ByteCode::AssignListVariable | ByteCode::AssignListVariableMulti, Operand::Variable(var)) => {
                let value = values.pop().unwrap_or_default();
                let path: Vec<i64> = values.iter().map(|v| v.to_integer() as i64).collect();
                let slot = self.slot_mut(var)?;
                *slot = std::mem::take(slot).with_element(&path, value);
            }
            (ByteCode::EvalCreateList, _) => {
                let size = values.pop().unwrap_or_default().to_integer();
                self.deliver(Variable::list_of(usize::try_from(size).unwrap_or(0)));
            }
            (ByteCode::EvalInitializeList, _) => self.deliver(Variable::List(values)),
            (ByteCode::EvalListVariable | ByteCode::EvalListVariableMulti, Operand::Variable(var)) => {
                let mut value = self.slot(var)?;
                for index in &values {
                    value = value.get_at(index.to_integer() as i64);
                }
                let value = value.clone();
                self.deliver(value);
            }
            (op, _) => return Err(RuntimeError::UnexpectedOpcode { op, ip, position: "here" }),
        }
        Ok(())
    }

    /// Pushes a frame for `user` and jumps to its entry, remembering where
    /// to resume.
    fn enter(&mut self, user: &UserFunction, args: Vec<Variable>) -> Result<()> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(RuntimeError::CallDepthExceeded);
        }
        let mut frame = RuntimeFunction::new(user, args);
        frame.work_base = self.work.len();
        self.frames.push(frame);
        self.reader.save();
        self.reader.jump_to(user.ip as usize)?;
        Ok(())
    }

    // ── Variables ───────────────────────────────────────────────────

    fn slot(&self, var: VariableAddress) -> Result<&Variable> {
        let index = var.index as usize;
        let slot = match var.scope {
            VarScope::Global => self.globals.get(index),
            VarScope::Local => self.frames.last().ok_or(RuntimeError::NoFrame)?.locals.get(index),
            VarScope::Parameter => self.frames.last().ok_or(RuntimeError::NoFrame)?.parameters.get(index),
        };
        slot.ok_or(RuntimeError::InvalidVariable(var))
    }

    fn slot_mut(&mut self, var: VariableAddress) -> Result<&mut Variable> {
        let index = var.index as usize;
        let slot = match var.scope {
            VarScope::Global => self.globals.get_mut(index),
            VarScope::Local => self.frames.last_mut().ok_or(RuntimeError::NoFrame)?.locals.get_mut(index),
            VarScope::Parameter => self
                .frames
                .last_mut()
                .ok_or(RuntimeError::NoFrame)?
                .parameters
                .get_mut(index),
        };
        slot.ok_or(RuntimeError::InvalidVariable(var))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::function::Arity;
    use crate::config::CompilerOptions;
    use crate::host::HostRegistry;

    fn run(source: &str) -> Variable {
        let program = Compiler::default().compile(source).unwrap();
        Runtime::new(&program).run(&mut NullHost).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        printed: Vec<String>,
        events: Vec<&'static str>,
    }

    impl Host for Recorder {
        fn begin(&mut self) {
            self.events.push("begin");
        }

        fn function(&mut self, name: &str, args: &[Variable]) -> std::result::Result<Variable, String> {
            match name {
                "Print" => {
                    self.printed.push(args.iter().map(Variable::to_string).collect::<Vec<_>>().join(""));
                    Ok(Variable::default())
                }
                _ => Err(format!("unknown intrinsic {name}")),
            }
        }

        fn end(&mut self) {
            self.events.push("end");
        }
    }

    #[test]
    fn loops_and_arithmetic() {
        assert_eq!(run("Main(){ x = 0 while (x < 3) { x = x + 1 } return x }"), Variable::Integer(3));
        assert_eq!(run("Main() { t = 0\n for i = 1 to 10 { t = t + i }\n return t }"), Variable::Integer(55));
        assert_eq!(run("Main() { t = \"\"\n for i = 3 to 1 step -1 { t = t & i }\n return t }"), Variable::from("321"));
        assert_eq!(run("Main() { return 7 / 0 }"), Variable::Integer(0));
    }

    #[test]
    fn break_and_continue() {
        let source = "Main() {
            total = 0
            for i = 1 to 10 {
                if i % 2 = 0 continue
                if i > 7 break
                total = total + i
            }
            return total
        }";
        assert_eq!(run(source), Variable::Integer(1 + 3 + 5 + 7));
    }

    #[test]
    fn recursion_through_expressions() {
        let source = "Fib(n) {\n if n < 2 return n\n return Fib(n - 1) + Fib(n - 2)\n}\nMain() { return Fib(15) }";
        assert_eq!(run(source), Variable::Integer(610));
    }

    #[test]
    fn lists() {
        let source = "Main() {
            var grid[2]
            grid[1][2] = 5
            data = { 10, 20, 30 }
            return grid[1][2] + data[2] + Len(data)
        }";
        assert_eq!(run(source), Variable::Integer(38));
    }

    #[test]
    fn goto_and_globals() {
        let source = "var count = 0\nBump() { count = count + 1 }\nMain() {\n again:\n Bump\n if count < 4 goto again\n return count }";
        let program = Compiler::default().compile(source).unwrap();
        let mut runtime = Runtime::new(&program);
        assert_eq!(runtime.run(&mut NullHost).unwrap(), Variable::Integer(4));
        assert_eq!(runtime.globals().last(), Some(&Variable::Integer(4)));
    }

    #[test]
    fn host_intrinsics_and_events() {
        let mut registry = HostRegistry::new();
        registry.register_intrinsic("Print", Arity::ANY).register_intrinsic("Fail", Arity::ANY);
        let compiler = Compiler::with_registry(CompilerOptions::default(), registry);
        let program = compiler.compile("Main() { Print \"a\", 1\n Print(UCase(\"b\")) }").unwrap();
        let mut host = Recorder::default();
        Runtime::new(&program).run(&mut host).unwrap();
        assert_eq!(host.printed, vec!["a1", "B"]);
        assert_eq!(host.events, vec!["begin", "end"]);

        let program = compiler.compile("Main() { Fail }").unwrap();
        let err = Runtime::new(&program).run(&mut Recorder::default()).unwrap_err();
        assert!(matches!(err, RuntimeError::Host { name, .. } if name == "Fail"));
    }

    #[test]
    fn frames_are_sized_and_callers_resume() {
        let source = "Add(a, b) { c = a + b\n return c }\nMain() {\n Add 1, 2\n x = 5\n return x }";
        let program = Compiler::default().compile(source).unwrap();
        let assign_x = program
            .instructions()
            .unwrap()
            .into_iter()
            .filter(|&(_, op)| op == ByteCode::Assign)
            .nth(1)
            .map(|(ip, _)| ip)
            .unwrap();

        let mut runtime = Runtime::new(&program);
        runtime.step(&mut NullHost).unwrap();
        assert_eq!(runtime.frame_depth(), 1);
        runtime.step(&mut NullHost).unwrap();
        assert_eq!(runtime.frame_depth(), 2);
        let frame = runtime.frame().unwrap();
        assert_eq!(frame.parameters, vec![Variable::Integer(1), Variable::Integer(2)]);
        assert_eq!(frame.locals.len(), 1);

        runtime.step(&mut NullHost).unwrap();
        runtime.step(&mut NullHost).unwrap();
        assert_eq!(runtime.frame_depth(), 1);
        assert_eq!(runtime.ip(), assign_x);
        assert_eq!(runtime.run(&mut NullHost).unwrap(), Variable::Integer(5));
        assert!(runtime.is_halted());
        assert!(!runtime.step(&mut NullHost).unwrap());
    }

    #[test]
    fn corrupt_streams_are_fatal() {
        let program = CompiledProgram { byte_codes: vec![ByteCode::Jump.word(), 99], ..Default::default() };
        let err = Runtime::new(&program).run(&mut NullHost).unwrap_err();
        assert!(matches!(err, RuntimeError::Decode(DecodeError::JumpOutOfRange { target: 99, .. })));

        let program = CompiledProgram { byte_codes: vec![ByteCode::EvalAdd.word()], ..Default::default() };
        let err = Runtime::new(&program).run(&mut NullHost).unwrap_err();
        assert!(matches!(err, RuntimeError::UnexpectedOpcode { op: ByteCode::EvalAdd, .. }));
    }

    #[test]
    fn runaway_recursion_is_stopped() {
        let program = Compiler::default().compile("Down(n) { return Down(n + 1) }\nMain() { return Down(0) }").unwrap();
        let err = Runtime::new(&program).run(&mut NullHost).unwrap_err();
        assert!(matches!(err, RuntimeError::CallDepthExceeded));
    }

    #[test]
    fn deep_recursion_inside_expressions() {
        let source = "Sum(n) {\n if n = 0 return 0\n return n + Sum(n - 1)\n}\nMain() { return Sum(250) }";
        assert_eq!(run(source), Variable::Integer(31375));
    }

    #[test]
    fn calls_suspend_the_calling_expression() {
        let source = "Two() { return 2 }\nMain() { x = 10 - Two() * 3\n return x }";
        let program = Compiler::default().compile(source).unwrap();
        let mut runtime = Runtime::new(&program);
        runtime.step(&mut NullHost).unwrap();
        runtime.step(&mut NullHost).unwrap();
        assert_eq!(runtime.frame_depth(), 2);
        assert_eq!(runtime.reader.saved_depth(), 2);
        runtime.step(&mut NullHost).unwrap();
        assert_eq!(runtime.frame_depth(), 1);
        assert_eq!(runtime.run(&mut NullHost).unwrap(), Variable::Integer(4));
    }

    #[test]
    fn steps_inside_a_called_loop_stay_bounded() {
        let source = "Forever() { while 1 { } }\nMain() { x = Forever() }";
        let program = Compiler::default().compile(source).unwrap();
        let mut runtime = Runtime::new(&program);
        for _ in 0..1000 {
            assert!(runtime.step(&mut NullHost).unwrap());
        }
        assert!(!runtime.is_halted());
        assert_eq!(runtime.frame_depth(), 2);
    }
}
