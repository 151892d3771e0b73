//! Function descriptors shared by the compiler, the program format and the
//! runtime.

use std::fmt;
use std::sync::Arc;

use crate::variable::Variable;

/// Name of the entry function. Matched without regard to case.
pub const MAIN: &str = "Main";

pub fn is_main(name: &str) -> bool {
    name.eq_ignore_ascii_case(MAIN)
}

/// Host callback behind an internal function.
pub type NativeFn = Arc<dyn Fn(&[Variable]) -> Variable + Send + Sync>;

/// Accepted argument counts of a host function. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Arity {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl Arity {
    pub const ANY: Arity = Arity { min: None, max: None };

    pub const fn exactly(n: usize) -> Self {
        Arity { min: Some(n), max: Some(n) }
    }

    pub const fn at_least(n: usize) -> Self {
        Arity { min: Some(n), max: None }
    }

    pub const fn between(min: usize, max: usize) -> Self {
        Arity { min: Some(min), max: Some(max) }
    }

    /// Checks an argument count, describing the violated limit on failure.
    pub fn check(&self, name: &str, count: usize) -> Result<(), String> {
        if self.min.is_some() && self.min == self.max {
            let n = self.min.unwrap_or(0);
            if count != n {
                return Err(format!("Function \"{name}\" requires {n} argument(s)"));
            }
            return Ok(());
        }
        if let Some(min) = self.min {
            if count < min {
                return Err(format!("Function \"{name}\" requires at least {min} argument(s)"));
            }
        }
        if let Some(max) = self.max {
            if count > max {
                return Err(format!(
                    "Function \"{name}\" doesn't allow more than {max} argument(s)"
                ));
            }
        }
        Ok(())
    }
}

/// A compiled user function: where it starts and how big its frame is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFunction {
    pub name: String,
    pub ip: u32,
    pub num_locals: u32,
    pub num_parameters: u32,
}

/// Function implemented by the host and dispatched through
/// [`Host::function`](crate::runtime::Host::function).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrinsicFunction {
    pub name: String,
    pub arity: Arity,
}

/// Function implemented by a native callback registered ahead of time.
#[derive(Clone)]
pub struct InternalFunction {
    pub name: String,
    pub arity: Arity,
    pub action: NativeFn,
}

impl InternalFunction {
    /// An internal function whose callback does nothing and yields Integer 0.
    pub fn disabled(name: impl Into<String>) -> Self {
        InternalFunction {
            name: name.into(),
            arity: Arity::ANY,
            action: Arc::new(|_| Variable::default()),
        }
    }

    pub fn call(&self, args: &[Variable]) -> Variable {
        (self.action)(args)
    }
}

impl fmt::Debug for InternalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl PartialEq for InternalFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.arity == other.arity
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    User(UserFunction),
    Intrinsic(IntrinsicFunction),
    Internal(InternalFunction),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::User(f) => &f.name,
            Function::Intrinsic(f) => &f.name,
            Function::Internal(f) => &f.name,
        }
    }

    pub fn as_user(&self) -> Option<&UserFunction> {
        match self {
            Function::User(f) => Some(f),
            _ => None,
        }
    }

    /// Argument limits of host functions; user functions answer `None`.
    pub fn arity(&self) -> Option<Arity> {
        match self {
            Function::User(_) => None,
            Function::Intrinsic(f) => Some(f.arity),
            Function::Internal(f) => Some(f.arity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_arity_message() {
        let err = Arity::exactly(2).check("Left", 1).unwrap_err();
        assert_eq!(err, "Function \"Left\" requires 2 argument(s)");
        assert!(Arity::exactly(2).check("Left", 2).is_ok());
    }

    #[test]
    fn ranged_arity_messages() {
        let arity = Arity::between(1, 3);
        assert_eq!(
            arity.check("Mid", 0).unwrap_err(),
            "Function \"Mid\" requires at least 1 argument(s)"
        );
        assert_eq!(
            arity.check("Mid", 4).unwrap_err(),
            "Function \"Mid\" doesn't allow more than 3 argument(s)"
        );
        assert!(Arity::at_least(1).check("Print", 40).is_ok());
        assert!(Arity::ANY.check("Any", 0).is_ok());
    }

    #[test]
    fn main_matches_any_case() {
        assert!(is_main("main"));
        assert!(is_main("MAIN"));
        assert!(!is_main("mainly"));
    }

    #[test]
    fn disabled_internal_returns_zero() {
        let f = InternalFunction::disabled("Gone");
        assert_eq!(f.call(&[Variable::from(4)]), Variable::Integer(0));
    }
}
