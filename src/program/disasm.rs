use std::fmt::Write;

use super::CompiledProgram;
use crate::bytecode::{ByteCode, ByteCodeReader, DecodeError, VarScope, VariableAddress};
use crate::function::Function;

struct Line {
    ip: usize,
    depth: usize,
    op: ByteCode,
    detail: String,
}

/// Recursive decoder over a whole program: statements at depth 0, their
/// expression tokens nested below.
struct Walker<'p> {
    program: &'p CompiledProgram,
    reader: ByteCodeReader<'p>,
    lines: Vec<Line>,
}

impl<'p> Walker<'p> {
    fn new(program: &'p CompiledProgram) -> Self {
        Walker { program, reader: ByteCodeReader::new(&program.byte_codes), lines: Vec::new() }
    }

    fn run(mut self) -> Result<Vec<Line>, DecodeError> {
        while !self.reader.end_of_stream() {
            self.statement()?;
        }
        Ok(self.lines)
    }

    fn push(&mut self, ip: usize, depth: usize, op: ByteCode, detail: String) {
        self.lines.push(Line { ip, depth, op, detail });
    }

    fn statement(&mut self) -> Result<(), DecodeError> {
        let ip = self.reader.ip();
        let op = self.reader.next_opcode()?;
        match op {
            ByteCode::Nop => self.push(ip, 0, op, String::new()),
            ByteCode::ExecFunction => self.call(ip, 0, op)?,
            ByteCode::Return => {
                self.push(ip, 0, op, String::new());
                self.expression(1)?;
            }
            ByteCode::Jump => {
                let target = self.reader.next_usize()?;
                self.push(ip, 0, op, format!("-> {target:05}"));
            }
            ByteCode::JumpIfFalse => {
                let target = self.reader.next_usize()?;
                self.push(ip, 0, op, format!("-> {target:05}"));
                self.expression(1)?;
            }
            ByteCode::Assign => {
                let var = self.reader.next_variable()?;
                self.push(ip, 0, op, variable(var));
                self.expression(1)?;
            }
            ByteCode::AssignListVariable => {
                let var = self.reader.next_variable()?;
                self.push(ip, 0, op, variable(var));
                self.expression(1)?;
                self.expression(1)?;
            }
            ByteCode::AssignListVariableMulti => {
                let var = self.reader.next_variable()?;
                let n = self.reader.next_usize()?;
                self.push(ip, 0, op, format!("{} [{n}]", variable(var)));
                for _ in 0..n {
                    self.expression(1)?;
                }
                self.expression(1)?;
            }
            _ => return Err(DecodeError::InvalidOpcode { word: op.word(), ip }),
        }
        Ok(())
    }

    fn expression(&mut self, depth: usize) -> Result<(), DecodeError> {
        let count = self.reader.next_usize()?;
        for _ in 0..count {
            self.token(depth)?;
        }
        Ok(())
    }

    fn token(&mut self, depth: usize) -> Result<(), DecodeError> {
        let ip = self.reader.ip();
        let op = self.reader.next_opcode()?;
        match op {
            ByteCode::EvalLiteral => {
                let index = self.reader.next_usize()?;
                let detail = match self.program.literals.get(index) {
                    Some(value) => format!("#{index} {value:?}"),
                    None => format!("#{index} <missing>"),
                };
                self.push(ip, depth, op, detail);
            }
            ByteCode::EvalVariable => {
                let var = self.reader.next_variable()?;
                self.push(ip, depth, op, variable(var));
            }
            ByteCode::EvalCreateList => {
                self.push(ip, depth, op, String::new());
                self.expression(depth + 1)?;
            }
            ByteCode::EvalInitializeList => {
                let n = self.reader.next_usize()?;
                self.push(ip, depth, op, format!("[{n}]"));
                for _ in 0..n {
                    self.expression(depth + 1)?;
                }
            }
            ByteCode::EvalListVariable => {
                let var = self.reader.next_variable()?;
                self.push(ip, depth, op, variable(var));
                self.expression(depth + 1)?;
            }
            ByteCode::EvalListVariableMulti => {
                let var = self.reader.next_variable()?;
                let n = self.reader.next_usize()?;
                self.push(ip, depth, op, format!("{} [{n}]", variable(var)));
                for _ in 0..n {
                    self.expression(depth + 1)?;
                }
            }
            ByteCode::EvalFunction => self.call(ip, depth, op)?,
            op if op.binary_operator().is_some() || op.unary_operator().is_some() => {
                self.push(ip, depth, op, String::new());
            }
            _ => return Err(DecodeError::InvalidOpcode { word: op.word(), ip }),
        }
        Ok(())
    }

    fn call(&mut self, ip: usize, depth: usize, op: ByteCode) -> Result<(), DecodeError> {
        let index = self.reader.next_usize()?;
        let argc = self.reader.next_usize()?;
        let name = self.program.functions.get(index).map_or("<missing>", Function::name);
        self.push(ip, depth, op, format!("{name} ({argc} args)"));
        for _ in 0..argc {
            self.expression(depth + 1)?;
        }
        Ok(())
    }
}

fn variable(var: VariableAddress) -> String {
    let prefix = match var.scope {
        VarScope::Global => 'G',
        VarScope::Local => 'L',
        VarScope::Parameter => 'P',
    };
    format!("{prefix}{}", var.index)
}

impl CompiledProgram {
    /// Address and opcode of every instruction, statements and
    /// expression tokens alike, in stream order.
    pub fn instructions(&self) -> Result<Vec<(usize, ByteCode)>, DecodeError> {
        let lines = Walker::new(self).run()?;
        Ok(lines.into_iter().map(|line| (line.ip, line.op)).collect())
    }

    /// Human-readable listing with function headers and source lines.
    pub fn disassemble(&self) -> Result<String, DecodeError> {
        let lines = Walker::new(self).run()?;
        let mut out = String::new();
        for line in lines {
            if line.depth == 0 {
                for f in self.functions.iter().filter_map(Function::as_user) {
                    if f.ip as usize == line.ip {
                        let _ = writeln!(out, "\n{}: ({} params, {} locals)", f.name, f.num_parameters, f.num_locals);
                    }
                }
            }
            let source = match self.line_number(line.ip) {
                Some(n) if line.depth == 0 => format!("{n:>4} "),
                Some(_) | None => "     ".to_string(),
            };
            let indent = "  ".repeat(line.depth);
            let _ = writeln!(out, "{:05} {source}{indent}{:?} {}", line.ip, line.op, line.detail);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;

    #[test]
    fn listing_names_functions_and_operands() {
        let program = Compiler::default()
            .compile("Twice(n) { return n * 2 }\nMain() { x = Twice(21)\n return x }")
            .unwrap();
        let text = program.disassemble().unwrap();
        assert!(text.contains("Twice: (1 params, 0 locals)"));
        assert!(text.contains("Main: (0 params, 1 locals)"));
        assert!(text.contains("EvalFunction Twice (1 args)"));
        assert!(text.contains("Assign L0"));
        assert!(text.contains("EvalVariable P0"));
    }

    #[test]
    fn instructions_start_with_the_prelude() {
        let program = Compiler::default().compile("Main() {}").unwrap();
        let ops: Vec<ByteCode> = program.instructions().unwrap().into_iter().map(|(_, op)| op).collect();
        assert_eq!(ops, vec![ByteCode::ExecFunction, ByteCode::Return, ByteCode::Return]);
    }

    #[test]
    fn expression_opcode_in_statement_position_is_rejected() {
        let program = CompiledProgram { byte_codes: vec![ByteCode::EvalAdd.word()], ..Default::default() };
        assert_eq!(
            program.instructions().unwrap_err(),
            DecodeError::InvalidOpcode { word: ByteCode::EvalAdd.word(), ip: 0 }
        );
    }
}
