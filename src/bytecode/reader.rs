use super::{ByteCode, DecodeError, VariableAddress};

/// Sequential decoder over a compiled instruction stream.
///
/// Calls push the return address with [`save`](Self::save) before jumping to
/// the callee; returns pop it again with [`restore`](Self::restore).
#[derive(Debug, Clone)]
pub struct ByteCodeReader<'a> {
    words: &'a [u32],
    ip: usize,
    ip_stack: Vec<usize>,
}

impl<'a> ByteCodeReader<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        ByteCodeReader { words, ip: 0, ip_stack: Vec::new() }
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    fn len(&self) -> usize {
        self.words.len()
    }

    pub fn end_of_stream(&self) -> bool {
        self.ip >= self.len()
    }

    pub fn next_opcode(&mut self) -> Result<ByteCode, DecodeError> {
        let ip = self.ip;
        let word = self.next_word()?;
        ByteCode::try_from(word).map_err(|word| DecodeError::InvalidOpcode { word, ip })
    }

    pub fn next_word(&mut self) -> Result<u32, DecodeError> {
        let word = *self
            .words
            .get(self.ip)
            .ok_or(DecodeError::EndOfStream { ip: self.ip })?;
        self.ip += 1;
        Ok(word)
    }

    /// Reads a word and interprets it as an operand count or index.
    pub fn next_usize(&mut self) -> Result<usize, DecodeError> {
        self.next_word().map(|w| w as usize)
    }

    pub fn next_variable(&mut self) -> Result<VariableAddress, DecodeError> {
        let ip = self.ip;
        let word = self.next_word()?;
        VariableAddress::unpack(word).ok_or(DecodeError::InvalidVariable { word, ip })
    }

    /// Moves the instruction pointer. The address one past the last word is
    /// accepted and reads as end of stream.
    pub fn jump_to(&mut self, target: usize) -> Result<(), DecodeError> {
        if target > self.len() {
            return Err(DecodeError::JumpOutOfRange { target, len: self.len() });
        }
        self.ip = target;
        Ok(())
    }

    /// Pushes the current instruction pointer.
    pub fn save(&mut self) {
        self.ip_stack.push(self.ip);
    }

    /// Pops the most recently saved instruction pointer and resumes there.
    pub fn restore(&mut self) -> Result<(), DecodeError> {
        let ip = self.ip_stack.pop().ok_or(DecodeError::EmptyIpStack)?;
        self.ip = ip;
        Ok(())
    }

    pub fn saved_depth(&self) -> usize {
        self.ip_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{VarScope, VariableAddress};

    #[test]
    fn decodes_opcodes_and_words() {
        let words = [ByteCode::Jump as u32, 2, ByteCode::Nop as u32];
        let mut r = ByteCodeReader::new(&words);
        assert_eq!(r.next_opcode(), Ok(ByteCode::Jump));
        assert_eq!(r.next_word(), Ok(2));
        assert_eq!(r.next_opcode(), Ok(ByteCode::Nop));
        assert!(r.end_of_stream());
        assert_eq!(r.next_word(), Err(DecodeError::EndOfStream { ip: 3 }));
    }

    #[test]
    fn invalid_opcode_is_fatal() {
        let words = [99];
        let mut r = ByteCodeReader::new(&words);
        assert_eq!(r.next_opcode(), Err(DecodeError::InvalidOpcode { word: 99, ip: 0 }));
    }

    #[test]
    fn jump_bounds() {
        let words = [0, 0, 0];
        let mut r = ByteCodeReader::new(&words);
        assert!(r.jump_to(3).is_ok());
        assert!(r.end_of_stream());
        assert_eq!(r.jump_to(4), Err(DecodeError::JumpOutOfRange { target: 4, len: 3 }));
    }

    #[test]
    fn save_and_restore() {
        let words = [0; 10];
        let mut r = ByteCodeReader::new(&words);
        r.jump_to(4).unwrap();
        r.save();
        r.jump_to(8).unwrap();
        r.restore().unwrap();
        assert_eq!(r.ip(), 4);
        assert_eq!(r.restore(), Err(DecodeError::EmptyIpStack));
    }

    #[test]
    fn variable_operands() {
        let local = VariableAddress::new(VarScope::Local, 2);
        let words = [local.pack(), 17];
        let mut r = ByteCodeReader::new(&words);
        assert_eq!(r.next_variable(), Ok(local));
        assert_eq!(r.next_variable(), Err(DecodeError::InvalidVariable { word: 17, ip: 1 }));
    }
}
