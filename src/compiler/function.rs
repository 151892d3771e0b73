use indexmap::{IndexMap, IndexSet};

use super::loop_context::LoopStack;
use crate::bytecode::{VarScope, VariableAddress};

/// A `goto` target. `ip` stays `None` until the label statement is seen.
#[derive(Debug, Default)]
struct Label {
    ip: Option<usize>,
    fixups: Vec<usize>,
    first_use: u32,
}

/// Compile-time record of the function whose body is being compiled.
///
/// Parameter and local slots are numbered in order of first appearance.
#[derive(Debug)]
pub struct CompileFunction {
    pub name: String,
    /// Slot in the function table; `None` for a rejected duplicate whose
    /// body is compiled only for its diagnostics.
    pub index: Option<usize>,
    pub ip: usize,
    parameters: IndexSet<String>,
    locals: IndexSet<String>,
    labels: IndexMap<String, Label>,
    pub loops: LoopStack,
}

impl CompileFunction {
    pub fn new(name: impl Into<String>, index: Option<usize>, ip: usize) -> Self {
        CompileFunction {
            name: name.into(),
            index,
            ip,
            parameters: IndexSet::new(),
            locals: IndexSet::new(),
            labels: IndexMap::new(),
            loops: LoopStack::default(),
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    /// True when `name` is already a parameter or local of this function.
    pub fn declares(&self, name: &str) -> bool {
        self.parameters.contains(name) || self.locals.contains(name)
    }

    /// Adds a parameter; `None` when the name is already taken.
    pub fn add_parameter(&mut self, name: &str) -> Option<VariableAddress> {
        if self.declares(name) {
            return None;
        }
        let (index, _) = self.parameters.insert_full(name.to_string());
        Some(VariableAddress::new(VarScope::Parameter, index as u32))
    }

    /// Adds a local; `None` when the name is already taken.
    pub fn add_local(&mut self, name: &str) -> Option<VariableAddress> {
        if self.declares(name) {
            return None;
        }
        let (index, _) = self.locals.insert_full(name.to_string());
        Some(VariableAddress::new(VarScope::Local, index as u32))
    }

    pub fn resolve(&self, name: &str) -> Option<VariableAddress> {
        if let Some(index) = self.parameters.get_index_of(name) {
            return Some(VariableAddress::new(VarScope::Parameter, index as u32));
        }
        self.locals
            .get_index_of(name)
            .map(|index| VariableAddress::new(VarScope::Local, index as u32))
    }

    // ── Labels ──────────────────────────────────────────────────────

    /// Binds `name` to `ip`. Returns the jump operands waiting for it, or
    /// `None` if the label was already defined.
    pub fn define_label(&mut self, name: &str, ip: usize) -> Option<Vec<usize>> {
        let label = self.labels.entry(name.to_string()).or_default();
        if label.ip.is_some() {
            return None;
        }
        label.ip = Some(ip);
        Some(std::mem::take(&mut label.fixups))
    }

    /// Target of a `goto`. An unbound label records `operand` for patching
    /// and yields `None`.
    pub fn label_target(&mut self, name: &str, operand: usize, line: u32) -> Option<usize> {
        let label = self
            .labels
            .entry(name.to_string())
            .or_insert_with(|| Label { first_use: line, ..Label::default() });
        if label.ip.is_none() {
            label.fixups.push(operand);
        }
        label.ip
    }

    /// Labels referenced by `goto` but never defined, with the line of
    /// their first use.
    pub fn undefined_labels(&self) -> impl Iterator<Item = (&str, u32)> {
        self.labels
            .iter()
            .filter(|(_, label)| label.ip.is_none())
            .map(|(name, label)| (name.as_str(), label.first_use))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_shadow_locals() {
        let mut f = CompileFunction::new("Add", Some(0), 5);
        assert_eq!(f.add_parameter("a").unwrap().index, 0);
        assert_eq!(f.add_parameter("b").unwrap().index, 1);
        assert!(f.add_parameter("a").is_none());
        assert!(f.add_local("b").is_none());
        let total = f.add_local("total").unwrap();
        assert_eq!(total, VariableAddress::new(VarScope::Local, 0));
        assert_eq!(f.resolve("b"), Some(VariableAddress::new(VarScope::Parameter, 1)));
        assert_eq!(f.resolve("missing"), None);
        assert_eq!((f.num_parameters(), f.num_locals()), (2, 1));
    }

    #[test]
    fn forward_goto_is_patched_on_definition() {
        let mut f = CompileFunction::new("Main", None, 0);
        assert_eq!(f.label_target("done", 11, 3), None);
        assert_eq!(f.label_target("done", 17, 4), None);
        assert_eq!(f.undefined_labels().collect::<Vec<_>>(), vec![("done", 3)]);
        assert_eq!(f.define_label("done", 40), Some(vec![11, 17]));
        assert_eq!(f.label_target("done", 50, 9), Some(40));
        assert_eq!(f.undefined_labels().count(), 0);
        assert_eq!(f.define_label("done", 60), None);
    }
}
