use crate::bytecode::ByteCodeWriter;

/// Jump bookkeeping for one loop under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopContext {
    pub start_ip: usize,
    pub continue_ip: usize,
    pub break_fixups: Vec<usize>,
    pub continue_fixups: Vec<usize>,
}

impl LoopContext {
    fn new(start_ip: usize) -> Self {
        LoopContext {
            start_ip,
            continue_ip: start_ip,
            break_fixups: Vec::new(),
            continue_fixups: Vec::new(),
        }
    }

    /// Points `continue` at `ip` instead of the loop start.
    pub fn set_continue_ip(&mut self, ip: usize) {
        self.continue_ip = ip;
    }

    fn patch(self, writer: &mut ByteCodeWriter, end_ip: usize) {
        for addr in self.break_fixups {
            writer.write_word_at(addr, end_ip as u32);
        }
        for addr in self.continue_fixups {
            writer.write_word_at(addr, self.continue_ip as u32);
        }
    }
}

/// Handle returned by [`LoopStack::open`]; only the matching handle can
/// close a loop.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an opened loop must be closed"]
pub struct LoopId(usize);

/// Active loops of one function, innermost last.
#[derive(Debug, Default)]
pub struct LoopStack {
    loops: Vec<LoopContext>,
}

impl LoopStack {
    pub fn open(&mut self, start_ip: usize) -> LoopId {
        self.loops.push(LoopContext::new(start_ip));
        LoopId(self.loops.len() - 1)
    }

    pub fn innermost(&mut self) -> Option<&mut LoopContext> {
        self.loops.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.loops.len()
    }

    /// Pops the loop `id` and patches its jumps: breaks to the current end
    /// of the stream, continues to the loop's continue address. Fails when
    /// `id` is not the innermost loop.
    pub fn close(&mut self, id: LoopId, writer: &mut ByteCodeWriter) -> Result<(), LoopId> {
        if id.0 + 1 != self.loops.len() {
            return Err(id);
        }
        let Some(ctx) = self.loops.pop() else {
            return Err(id);
        };
        ctx.patch(writer, writer.ip());
        Ok(())
    }
}
