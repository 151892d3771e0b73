//! The compiled-program artifact and its binary file format.
//!
//! Layout, little-endian throughout:
//!
//! ```text
//! magic u32 | version u32 | flags u32
//! word count u32, words
//! function count u32, per function: name, kind u32, [ip, locals, params]
//! variable count u32, values
//! literal count u32, values
//! [line count u32, lines]            when flags bit 0 is set
//! ```

mod disasm;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, instrument, warn};

use crate::function::{Arity, Function, InternalFunction, IntrinsicFunction, UserFunction};
use crate::host::HostRegistry;
use crate::variable::{VarType, Variable};

/// "SILK" read as a little-endian word.
pub const MAGIC: u32 = 0x4B4C_4953;
pub const FORMAT_VERSION: u32 = 0;

const FLAG_LINE_NUMBERS: u32 = 0x1;

const KIND_USER: u32 = 0;
const KIND_INTRINSIC: u32 = 1;
const KIND_INTERNAL: u32 = 2;

/// Deepest list nesting accepted when loading values.
pub const MAX_NESTING: usize = 64;
/// Most parameter plus local slots a loaded function may declare.
pub const MAX_SLOTS: u32 = 65_536;

#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("not a compiled Silk program (magic {0:#010x})")]
    BadMagic(u32),
    #[error("unsupported program format version {0}")]
    UnsupportedVersion(u32),
    #[error("unknown function kind {0}")]
    UnknownFunctionKind(u32),
    #[error("unknown value tag {0}")]
    UnknownTag(u32),
    #[error("program text is not valid UTF-8")]
    InvalidText(#[from] std::string::FromUtf8Error),
    #[error("line map has {lines} entries for {words} instruction words")]
    LineMapMismatch { lines: usize, words: usize },
    #[error("program has no instructions")]
    Empty,
    #[error("list values nest deeper than {}", MAX_NESTING)]
    NestingTooDeep,
    #[error("function {name} starts at {ip}, outside {words} instruction words")]
    EntryOutOfRange { name: String, ip: u32, words: usize },
    #[error("function {name} declares {slots} slots (limit {})", MAX_SLOTS)]
    TooManySlots { name: String, slots: u64 },
}

/// Everything the runtime needs to execute a script. Produced by the
/// compiler or loaded from disk and not modified afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledProgram {
    pub byte_codes: Vec<u32>,
    pub functions: Vec<Function>,
    /// Initial values of the globals: host variables first, then header
    /// declarations.
    pub variables: Vec<Variable>,
    pub literals: Vec<Variable>,
    /// Source line of every instruction word, when recorded.
    pub line_numbers: Option<Vec<u32>>,
}

impl CompiledProgram {
    pub fn line_number(&self, ip: usize) -> Option<u32> {
        self.line_numbers.as_ref()?.get(ip).copied()
    }

    /// True when `bytes` start with the program magic.
    pub fn is_program(bytes: &[u8]) -> bool {
        bytes.get(..4).is_some_and(|b| b == MAGIC.to_le_bytes())
    }

    // ── Writing ─────────────────────────────────────────────────────

    #[instrument(skip_all)]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProgramError> {
        let mut w = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut w)?;
        w.flush()?;
        debug!(path = %path.as_ref().display(), words = self.byte_codes.len(), "saved program");
        Ok(())
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ProgramError> {
        if self.byte_codes.is_empty() {
            return Err(ProgramError::Empty);
        }
        let mut flags = 0;
        if let Some(lines) = &self.line_numbers {
            if lines.len() != self.byte_codes.len() {
                return Err(ProgramError::LineMapMismatch { lines: lines.len(), words: self.byte_codes.len() });
            }
            flags |= FLAG_LINE_NUMBERS;
        }

        wr_u32(w, MAGIC)?;
        wr_u32(w, FORMAT_VERSION)?;
        wr_u32(w, flags)?;

        wr_len(w, self.byte_codes.len())?;
        for &word in &self.byte_codes {
            wr_u32(w, word)?;
        }

        wr_len(w, self.functions.len())?;
        for function in &self.functions {
            wr_text(w, function.name())?;
            match function {
                Function::User(f) => {
                    wr_u32(w, KIND_USER)?;
                    wr_u32(w, f.ip)?;
                    wr_u32(w, f.num_locals)?;
                    wr_u32(w, f.num_parameters)?;
                }
                Function::Intrinsic(_) => wr_u32(w, KIND_INTRINSIC)?,
                Function::Internal(_) => wr_u32(w, KIND_INTERNAL)?,
            }
        }

        wr_len(w, self.variables.len())?;
        for v in &self.variables {
            wr_variable(w, v)?;
        }
        wr_len(w, self.literals.len())?;
        for v in &self.literals {
            wr_variable(w, v)?;
        }

        if let Some(lines) = &self.line_numbers {
            wr_len(w, lines.len())?;
            for &line in lines {
                wr_u32(w, line)?;
            }
        }
        Ok(())
    }

    // ── Reading ─────────────────────────────────────────────────────

    /// Loads a saved program, re-binding host functions by name against
    /// `registry`.
    #[instrument(skip_all)]
    pub fn load(path: impl AsRef<Path>, registry: &HostRegistry) -> Result<Self, ProgramError> {
        let mut r = BufReader::new(File::open(path.as_ref())?);
        let program = Self::read_from(&mut r, registry)?;
        debug!(path = %path.as_ref().display(), words = program.byte_codes.len(), "loaded program");
        Ok(program)
    }

    pub fn read_from<R: Read>(r: &mut R, registry: &HostRegistry) -> Result<Self, ProgramError> {
        let magic = rd_u32(r)?;
        if magic != MAGIC {
            return Err(ProgramError::BadMagic(magic));
        }
        let version = rd_u32(r)?;
        if version != FORMAT_VERSION {
            return Err(ProgramError::UnsupportedVersion(version));
        }
        let flags = rd_u32(r)?;

        let count = rd_u32(r)?;
        let mut byte_codes = Vec::new();
        for _ in 0..count {
            byte_codes.push(rd_u32(r)?);
        }

        let count = rd_u32(r)?;
        let mut functions = Vec::new();
        for _ in 0..count {
            let name = rd_text(r)?;
            let kind = rd_u32(r)?;
            functions.push(match kind {
                KIND_USER => Function::User(rd_user(r, name, byte_codes.len())?),
                KIND_INTRINSIC => Function::Intrinsic(bind_intrinsic(name, registry)),
                KIND_INTERNAL => Function::Internal(bind_internal(name, registry)),
                other => return Err(ProgramError::UnknownFunctionKind(other)),
            });
        }

        let variables = rd_variables(r, 0)?;
        let literals = rd_variables(r, 0)?;

        let line_numbers = if flags & FLAG_LINE_NUMBERS != 0 {
            let count = rd_u32(r)? as usize;
            if count != byte_codes.len() {
                return Err(ProgramError::LineMapMismatch { lines: count, words: byte_codes.len() });
            }
            let mut lines = Vec::new();
            for _ in 0..count {
                lines.push(rd_u32(r)?);
            }
            Some(lines)
        } else {
            None
        };

        if byte_codes.is_empty() {
            return Err(ProgramError::Empty);
        }
        Ok(CompiledProgram { byte_codes, functions, variables, literals, line_numbers })
    }
}

/// Reads a user function record, rejecting entries the runtime could not
/// execute.
fn rd_user<R: Read>(r: &mut R, name: String, words: usize) -> Result<UserFunction, ProgramError> {
    let ip = rd_u32(r)?;
    let num_locals = rd_u32(r)?;
    let num_parameters = rd_u32(r)?;
    if ip as usize >= words {
        return Err(ProgramError::EntryOutOfRange { name, ip, words });
    }
    let slots = u64::from(num_locals) + u64::from(num_parameters);
    if slots > u64::from(MAX_SLOTS) {
        return Err(ProgramError::TooManySlots { name, slots });
    }
    Ok(UserFunction { name, ip, num_locals, num_parameters })
}

fn bind_intrinsic(name: String, registry: &HostRegistry) -> IntrinsicFunction {
    let arity = registry.function(&name).and_then(Function::arity).unwrap_or(Arity::ANY);
    IntrinsicFunction { name, arity }
}

fn bind_internal(name: String, registry: &HostRegistry) -> InternalFunction {
    match registry.function(&name) {
        Some(Function::Internal(f)) => f.clone(),
        _ => {
            warn!(function = %name, "internal function not registered; calls will return 0");
            InternalFunction::disabled(name)
        }
    }
}

// ── Primitives ──────────────────────────────────────────────────────

fn wr_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn wr_len<W: Write>(w: &mut W, len: usize) -> io::Result<()> {
    let len = u32::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "table too large"))?;
    wr_u32(w, len)
}

fn wr_text<W: Write>(w: &mut W, text: &str) -> io::Result<()> {
    wr_len(w, text.len())?;
    w.write_all(text.as_bytes())
}

fn wr_variable<W: Write>(w: &mut W, v: &Variable) -> io::Result<()> {
    wr_u32(w, v.var_type() as u32)?;
    match v {
        Variable::Integer(i) => w.write_all(&i.to_le_bytes()),
        Variable::Float(f) => w.write_all(&f.to_bits().to_le_bytes()),
        Variable::String(s) => wr_text(w, s),
        Variable::List(items) => {
            wr_len(w, items.len())?;
            items.iter().try_for_each(|item| wr_variable(w, item))
        }
    }
}

fn rd_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn rd_text<R: Read>(r: &mut R) -> Result<String, ProgramError> {
    let len = rd_u32(r)? as usize;
    let mut bytes = Vec::new();
    r.take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(String::from_utf8(bytes)?)
}

fn rd_variables<R: Read>(r: &mut R, depth: usize) -> Result<Vec<Variable>, ProgramError> {
    let count = rd_u32(r)?;
    let mut values = Vec::new();
    for _ in 0..count {
        values.push(rd_variable(r, depth)?);
    }
    Ok(values)
}

fn rd_variable<R: Read>(r: &mut R, depth: usize) -> Result<Variable, ProgramError> {
    let tag = rd_u32(r)?;
    match VarType::from_tag(tag) {
        Some(VarType::Integer) => Ok(Variable::Integer(rd_u32(r)? as i32)),
        Some(VarType::Float) => {
            let mut b = [0u8; 8];
            r.read_exact(&mut b)?;
            Ok(Variable::Float(f64::from_bits(u64::from_le_bytes(b))))
        }
        Some(VarType::String) => Ok(Variable::String(rd_text(r)?)),
        Some(VarType::List) if depth >= MAX_NESTING => Err(ProgramError::NestingTooDeep),
        Some(VarType::List) => Ok(Variable::List(rd_variables(r, depth + 1)?)),
        None => Err(ProgramError::UnknownTag(tag)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CompiledProgram {
        CompiledProgram {
            byte_codes: vec![1, 0, 0, 2, 0, 2, 1, 7, 0],
            functions: vec![Function::User(UserFunction {
                name: "Main".into(),
                ip: 5,
                num_locals: 2,
                num_parameters: 0,
            })],
            variables: vec![Variable::Integer(-1), Variable::List(vec![1.into(), "ü".into()])],
            literals: vec![Variable::Float(2.5), Variable::from("text")],
            line_numbers: Some(vec![0, 0, 0, 0, 0, 1, 1, 1, 1]),
        }
    }

    fn round_trip(program: &CompiledProgram, registry: &HostRegistry) -> CompiledProgram {
        let mut bytes = Vec::new();
        program.write_to(&mut bytes).unwrap();
        CompiledProgram::read_from(&mut bytes.as_slice(), registry).unwrap()
    }

    #[test]
    fn header_layout() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes).unwrap();
        assert_eq!(&bytes[..4], b"SILK");
        assert!(CompiledProgram::is_program(&bytes));
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[1, 0, 0, 0]);
    }

    #[test]
    fn tables_survive_a_round_trip() {
        let program = sample();
        assert_eq!(round_trip(&program, &HostRegistry::new()), program);
        let bare = CompiledProgram { line_numbers: None, ..sample() };
        assert_eq!(round_trip(&bare, &HostRegistry::new()), bare);
    }

    #[test]
    fn host_functions_are_rebound_by_name() {
        let mut program = sample();
        program.functions.push(Function::Internal(InternalFunction::disabled("UCase")));
        program.functions.push(Function::Internal(InternalFunction::disabled("Vanished")));
        program.functions.push(Function::Intrinsic(IntrinsicFunction { name: "Print".into(), arity: Arity::ANY }));

        let mut registry = HostRegistry::new();
        registry.register_intrinsic("Print", Arity::at_least(1)).merge_internals();
        let loaded = round_trip(&program, &registry);

        let Function::Internal(ucase) = &loaded.functions[1] else { panic!("expected internal") };
        assert_eq!(ucase.call(&["abc".into()]), Variable::from("ABC"));
        let Function::Internal(gone) = &loaded.functions[2] else { panic!("expected internal") };
        assert_eq!(gone.call(&["abc".into()]), Variable::Integer(0));
        assert_eq!(loaded.functions[3].arity(), Some(Arity::at_least(1)));
    }

    #[test]
    fn rejects_foreign_and_future_files() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes).unwrap();

        let mut wrong_magic = bytes.clone();
        wrong_magic[0] = b'X';
        let err = CompiledProgram::read_from(&mut wrong_magic.as_slice(), &HostRegistry::new()).unwrap_err();
        assert!(matches!(err, ProgramError::BadMagic(_)));

        let mut future = bytes.clone();
        future[4] = 1;
        let err = CompiledProgram::read_from(&mut future.as_slice(), &HostRegistry::new()).unwrap_err();
        assert!(matches!(err, ProgramError::UnsupportedVersion(1)));

        let truncated = &bytes[..bytes.len() - 3];
        let err = CompiledProgram::read_from(&mut &truncated[..], &HostRegistry::new()).unwrap_err();
        assert!(matches!(err, ProgramError::Io(_)));
    }

    #[test]
    fn refuses_to_save_inconsistent_programs() {
        assert!(matches!(CompiledProgram::default().write_to(&mut Vec::new()), Err(ProgramError::Empty)));
        let program = CompiledProgram { line_numbers: Some(vec![1]), ..sample() };
        assert!(matches!(
            program.write_to(&mut Vec::new()),
            Err(ProgramError::LineMapMismatch { lines: 1, words: 9 })
        ));
    }

    /// Header plus a one-word program, ready for a function table.
    fn preamble() -> Vec<u8> {
        [MAGIC, FORMAT_VERSION, 0, 1, 0].iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn words(bytes: &mut Vec<u8>, words: &[u32]) {
        bytes.extend(words.iter().flat_map(|w| w.to_le_bytes()));
    }

    #[test]
    fn deeply_nested_values_are_rejected() {
        let mut bytes = preamble();
        words(&mut bytes, &[0, 1]);
        for _ in 0..200_000 {
            words(&mut bytes, &[VarType::List as u32, 1]);
        }
        words(&mut bytes, &[VarType::Integer as u32, 0, 0]);
        let err = CompiledProgram::read_from(&mut bytes.as_slice(), &HostRegistry::new()).unwrap_err();
        assert!(matches!(err, ProgramError::NestingTooDeep));

        let nested = (0..MAX_NESTING).fold(Variable::Integer(7), |v, _| Variable::List(vec![v]));
        let program = CompiledProgram { variables: vec![nested], ..sample() };
        assert_eq!(round_trip(&program, &HostRegistry::new()), program);
    }

    #[test]
    fn function_records_are_validated() {
        let mut bytes = preamble();
        words(&mut bytes, &[1]);
        bytes.extend(4u32.to_le_bytes());
        bytes.extend(b"Main");
        words(&mut bytes, &[KIND_USER, 0, 0xFFFF_FFFF, 0, 0, 0]);
        let err = CompiledProgram::read_from(&mut bytes.as_slice(), &HostRegistry::new()).unwrap_err();
        assert!(matches!(err, ProgramError::TooManySlots { slots: 0xFFFF_FFFF, .. }));

        let mut bytes = preamble();
        words(&mut bytes, &[1]);
        bytes.extend(4u32.to_le_bytes());
        bytes.extend(b"Main");
        words(&mut bytes, &[KIND_USER, 1, 0, 0, 0, 0]);
        let err = CompiledProgram::read_from(&mut bytes.as_slice(), &HostRegistry::new()).unwrap_err();
        assert!(matches!(err, ProgramError::EntryOutOfRange { ip: 1, words: 1, .. }));
    }

    #[test]
    fn save_and_load_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.silkc");
        sample().save(&path).unwrap();
        assert_eq!(CompiledProgram::load(&path, &HostRegistry::new()).unwrap(), sample());
    }
}
