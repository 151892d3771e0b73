//! Silk: an embeddable scripting language.
//!
//! Source text is compiled in a single pass to a flat stream of 32-bit
//! words ([`program::CompiledProgram`]), which can be saved, reloaded
//! against a [`host::HostRegistry`], and executed step by step by
//! [`runtime::Runtime`].

pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod diagnostic;
pub mod function;
pub mod host;
pub mod lexer;
pub mod program;
pub mod runtime;
pub mod variable;

use diagnostic::Diagnostic;
use program::CompiledProgram;

/// Compiles `source` with default options and the built-in catalogue.
///
/// ```
/// use silk::runtime::{NullHost, Runtime};
/// use silk::variable::Variable;
///
/// let program = silk::compile("Main() { return Len(\"silk\") * 10 }").unwrap();
/// let result = Runtime::new(&program).run(&mut NullHost).unwrap();
/// assert_eq!(result, Variable::Integer(40));
/// ```
pub fn compile(source: &str) -> Result<CompiledProgram, Vec<Diagnostic>> {
    compiler::Compiler::default().compile(source)
}
