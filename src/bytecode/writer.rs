use super::ByteCode;

/// One slot of the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteCodeEntry {
    pub word: u32,
    pub is_opcode: bool,
    pub line: u32,
}

/// Append-only, patchable instruction buffer.
///
/// Every write returns the address of the first word written. Addresses
/// handed out stay valid until `undo_last_write` removes that entry, so
/// they can be recorded as fixups and patched with `write_at` /
/// `write_word_at` once the target is known.
///
/// The writer also keeps a stack of opcode counters. A construct that has
/// to record how many opcodes it emitted pushes a scope, emits, and pops
/// the scope to read the count; enclosing scopes are unaffected.
#[derive(Debug)]
pub struct ByteCodeWriter {
    entries: Vec<ByteCodeEntry>,
    counters: Vec<usize>,
    line: u32,
}

impl Default for ByteCodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteCodeWriter {
    pub fn new() -> Self {
        ByteCodeWriter { entries: Vec::new(), counters: vec![0], line: 1 }
    }

    /// Source line attached to subsequent writes.
    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    /// Address the next write will occupy.
    pub fn ip(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write(&mut self, op: ByteCode) -> usize {
        self.push(op.word(), true)
    }

    pub fn write_word(&mut self, word: u32) -> usize {
        self.push(word, false)
    }

    pub fn write_with(&mut self, op: ByteCode, word: u32) -> usize {
        let addr = self.write(op);
        self.write_word(word);
        addr
    }

    /// Replaces the opcode at `addr`.
    pub fn write_at(&mut self, addr: usize, op: ByteCode) {
        self.patch(addr, op.word(), true);
    }

    /// Replaces the operand word at `addr`.
    pub fn write_word_at(&mut self, addr: usize, word: u32) {
        self.patch(addr, word, false);
    }

    /// Removes the most recent entry and returns it.
    pub fn undo_last_write(&mut self) -> Option<ByteCodeEntry> {
        let entry = self.entries.pop()?;
        if entry.is_opcode {
            if let Some(count) = self.counters.last_mut() {
                *count = count.saturating_sub(1);
            }
        }
        Some(entry)
    }

    pub fn push_scope(&mut self) {
        self.counters.push(0);
    }

    /// Closes the innermost counting scope and returns its opcode count.
    /// The outermost scope is never removed.
    pub fn pop_scope(&mut self) -> usize {
        if self.counters.len() > 1 {
            self.counters.pop().unwrap_or(0)
        } else {
            self.current_count()
        }
    }

    pub fn current_count(&self) -> usize {
        self.counters.last().copied().unwrap_or(0)
    }

    pub fn reset_count(&mut self) {
        if let Some(count) = self.counters.last_mut() {
            *count = 0;
        }
    }

    pub fn entries(&self) -> &[ByteCodeEntry] {
        &self.entries
    }

    /// Raw words and their source lines.
    pub fn into_parts(self) -> (Vec<u32>, Vec<u32>) {
        self.entries.into_iter().map(|e| (e.word, e.line)).unzip()
    }

    fn push(&mut self, word: u32, is_opcode: bool) -> usize {
        let addr = self.entries.len();
        self.entries.push(ByteCodeEntry { word, is_opcode, line: self.line });
        if is_opcode {
            if let Some(count) = self.counters.last_mut() {
                *count += 1;
            }
        }
        addr
    }

    fn patch(&mut self, addr: usize, word: u32, is_opcode: bool) {
        match self.entries.get_mut(addr) {
            Some(entry) => {
                debug_assert_eq!(
                    entry.is_opcode, is_opcode,
                    "fixup at {addr} changes the kind of the entry"
                );
                entry.word = word;
            }
            None => debug_assert!(false, "fixup address {addr} out of range"),
        }
    }
}
