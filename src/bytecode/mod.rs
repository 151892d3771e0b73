use crate::variable::Variable;

mod reader;
mod writer;

pub use reader::ByteCodeReader;
pub use writer::{ByteCodeEntry, ByteCodeWriter};

/// Reader-side decode failures. All of them are fatal to the running
/// program: they mean the stream is corrupt or was built for another format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("read past end of byte code at {ip}")]
    EndOfStream { ip: usize },
    #[error("invalid opcode {word} at {ip}")]
    InvalidOpcode { word: u32, ip: usize },
    #[error("jump target {target} is outside the program ({len} words)")]
    JumpOutOfRange { target: usize, len: usize },
    #[error("return with an empty instruction pointer stack")]
    EmptyIpStack,
    #[error("invalid variable reference {word:#010x} at {ip}")]
    InvalidVariable { word: u32, ip: usize },
}

// ── Opcodes ─────────────────────────────────────────────────────────
//
// Compiled programs persist raw opcode numbers. New opcodes go at the end;
// existing ones are never renumbered or removed.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ByteCode {
    Nop = 0,
    ExecFunction = 1,
    Return = 2,
    Jump = 3,
    Assign = 4,
    AssignListVariable = 5,
    JumpIfFalse = 6,
    EvalLiteral = 7,
    EvalVariable = 8,
    EvalCreateList = 9,
    EvalInitializeList = 10,
    EvalListVariable = 11,
    EvalFunction = 12,
    EvalAdd = 13,
    EvalSubtract = 14,
    EvalMultiply = 15,
    EvalDivide = 16,
    EvalPower = 17,
    EvalModulus = 18,
    EvalConcat = 19,
    EvalNegate = 20,
    EvalAnd = 21,
    EvalOr = 22,
    EvalXor = 23,
    EvalNot = 24,
    EvalIsEqual = 25,
    EvalIsNotEqual = 26,
    EvalIsGreaterThan = 27,
    EvalIsGreaterThanOrEqual = 28,
    EvalIsLessThan = 29,
    EvalIsLessThanOrEqual = 30,
    AssignListVariableMulti = 31,
    EvalListVariableMulti = 32,
}

impl ByteCode {
    /// Every opcode, indexed by its numeric identity.
    pub const ALL: [ByteCode; 33] = [
        ByteCode::Nop,
        ByteCode::ExecFunction,
        ByteCode::Return,
        ByteCode::Jump,
        ByteCode::Assign,
        ByteCode::AssignListVariable,
        ByteCode::JumpIfFalse,
        ByteCode::EvalLiteral,
        ByteCode::EvalVariable,
        ByteCode::EvalCreateList,
        ByteCode::EvalInitializeList,
        ByteCode::EvalListVariable,
        ByteCode::EvalFunction,
        ByteCode::EvalAdd,
        ByteCode::EvalSubtract,
        ByteCode::EvalMultiply,
        ByteCode::EvalDivide,
        ByteCode::EvalPower,
        ByteCode::EvalModulus,
        ByteCode::EvalConcat,
        ByteCode::EvalNegate,
        ByteCode::EvalAnd,
        ByteCode::EvalOr,
        ByteCode::EvalXor,
        ByteCode::EvalNot,
        ByteCode::EvalIsEqual,
        ByteCode::EvalIsNotEqual,
        ByteCode::EvalIsGreaterThan,
        ByteCode::EvalIsGreaterThanOrEqual,
        ByteCode::EvalIsLessThan,
        ByteCode::EvalIsLessThanOrEqual,
        ByteCode::AssignListVariableMulti,
        ByteCode::EvalListVariableMulti,
    ];

    pub fn word(self) -> u32 {
        self as u32
    }

    /// Operator applied to the two topmost operands of an expression.
    pub fn binary_operator(self) -> Option<fn(&Variable, &Variable) -> Variable> {
        let op: fn(&Variable, &Variable) -> Variable = match self {
            ByteCode::EvalAdd => Variable::add,
            ByteCode::EvalSubtract => Variable::subtract,
            ByteCode::EvalMultiply => Variable::multiply,
            ByteCode::EvalDivide => Variable::divide,
            ByteCode::EvalPower => Variable::power,
            ByteCode::EvalModulus => Variable::modulus,
            ByteCode::EvalConcat => Variable::concat,
            ByteCode::EvalAnd => Variable::and,
            ByteCode::EvalOr => Variable::or,
            ByteCode::EvalXor => Variable::xor,
            ByteCode::EvalIsEqual => Variable::is_equal,
            ByteCode::EvalIsNotEqual => Variable::is_not_equal,
            ByteCode::EvalIsGreaterThan => Variable::is_greater_than,
            ByteCode::EvalIsGreaterThanOrEqual => Variable::is_greater_than_or_equal,
            ByteCode::EvalIsLessThan => Variable::is_less_than,
            ByteCode::EvalIsLessThanOrEqual => Variable::is_less_than_or_equal,
            _ => return None,
        };
        Some(op)
    }

    pub fn unary_operator(self) -> Option<fn(&Variable) -> Variable> {
        match self {
            ByteCode::EvalNegate => Some(Variable::negate),
            ByteCode::EvalNot => Some(Variable::not),
            _ => None,
        }
    }
}

impl TryFrom<u32> for ByteCode {
    /// The rejected word.
    type Error = u32;

    fn try_from(word: u32) -> Result<Self, Self::Error> {
        usize::try_from(word)
            .ok()
            .and_then(|i| ByteCode::ALL.get(i).copied())
            .ok_or(word)
    }
}

// ── Variable addressing ─────────────────────────────────────────────
//
// A variable operand is a single word: one scope tag bit in the high
// nibble, the slot index in the low 28 bits.

pub const GLOBAL_FLAG: u32 = 0x1000_0000;
pub const LOCAL_FLAG: u32 = 0x2000_0000;
pub const PARAMETER_FLAG: u32 = 0x4000_0000;
pub const SCOPE_MASK: u32 = GLOBAL_FLAG | LOCAL_FLAG | PARAMETER_FLAG;
pub const INDEX_MASK: u32 = !SCOPE_MASK;
/// Largest slot index a packed reference can carry.
pub const MAX_INDEX: u32 = 0x0FFF_FFFF;

const _: () = {
    assert!(GLOBAL_FLAG & LOCAL_FLAG == 0);
    assert!(GLOBAL_FLAG & PARAMETER_FLAG == 0);
    assert!(LOCAL_FLAG & PARAMETER_FLAG == 0);
    assert!(SCOPE_MASK & MAX_INDEX == 0);
    assert!(INDEX_MASK & MAX_INDEX == MAX_INDEX);
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarScope {
    Global,
    Local,
    Parameter,
}

impl VarScope {
    pub fn flag(self) -> u32 {
        match self {
            VarScope::Global => GLOBAL_FLAG,
            VarScope::Local => LOCAL_FLAG,
            VarScope::Parameter => PARAMETER_FLAG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableAddress {
    pub scope: VarScope,
    pub index: u32,
}

impl VariableAddress {
    pub fn new(scope: VarScope, index: u32) -> Self {
        debug_assert!(index <= MAX_INDEX, "variable index {index} out of range");
        VariableAddress { scope, index }
    }

    pub fn pack(self) -> u32 {
        self.scope.flag() | (self.index & INDEX_MASK)
    }

    /// Splits a packed word. Words without exactly one scope tag, or with
    /// stray bits above the tags, are rejected.
    pub fn unpack(word: u32) -> Option<Self> {
        let scope = match word & !MAX_INDEX {
            GLOBAL_FLAG => VarScope::Global,
            LOCAL_FLAG => VarScope::Local,
            PARAMETER_FLAG => VarScope::Parameter,
            _ => return None,
        };
        Some(VariableAddress { scope, index: word & MAX_INDEX })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_numbers_are_stable() {
        assert_eq!(ByteCode::Nop as u32, 0);
        assert_eq!(ByteCode::Return as u32, 2);
        assert_eq!(ByteCode::JumpIfFalse as u32, 6);
        assert_eq!(ByteCode::EvalFunction as u32, 12);
        assert_eq!(ByteCode::EvalConcat as u32, 19);
        assert_eq!(ByteCode::EvalIsLessThanOrEqual as u32, 30);
        assert_eq!(ByteCode::EvalListVariableMulti as u32, 32);
    }

    #[test]
    fn all_table_matches_discriminants() {
        for (i, op) in ByteCode::ALL.iter().enumerate() {
            assert_eq!(op.word() as usize, i);
            assert_eq!(ByteCode::try_from(i as u32), Ok(*op));
        }
    }

    #[test]
    fn decode_rejects_unknown_words() {
        assert_eq!(ByteCode::try_from(33), Err(33));
        assert_eq!(ByteCode::try_from(u32::MAX), Err(u32::MAX));
    }

    #[test]
    fn pack_unpack_bijection() {
        for scope in [VarScope::Global, VarScope::Local, VarScope::Parameter] {
            for index in [0, 1, 7, 1000, MAX_INDEX] {
                let addr = VariableAddress::new(scope, index);
                assert_eq!(VariableAddress::unpack(addr.pack()), Some(addr));
            }
        }
    }

    #[test]
    fn packed_layout() {
        assert_eq!(VariableAddress::new(VarScope::Local, 3).pack(), 0x2000_0003);
        assert_eq!(VariableAddress::new(VarScope::Global, 0).pack(), 0x1000_0000);
    }

    #[test]
    fn unpack_rejects_ambiguous_words() {
        assert_eq!(VariableAddress::unpack(5), None);
        assert_eq!(VariableAddress::unpack(GLOBAL_FLAG | LOCAL_FLAG), None);
        assert_eq!(VariableAddress::unpack(0x8000_0000 | GLOBAL_FLAG), None);
    }

    #[test]
    fn operator_tables() {
        assert!(ByteCode::EvalAdd.binary_operator().is_some());
        assert!(ByteCode::EvalNegate.binary_operator().is_none());
        assert!(ByteCode::EvalNot.unary_operator().is_some());
        let add = ByteCode::EvalAdd.binary_operator().unwrap();
        assert_eq!(add(&2.into(), &3.into()), Variable::Integer(5));
    }
}
