use std::fmt;

use serde::{Deserialize, Serialize};

mod ops;

/// Integer value of a true condition.
pub const TRUE: i32 = -1;
/// Integer value of a false condition.
pub const FALSE: i32 = 0;

static ZERO: Variable = Variable::Integer(0);

/// A dynamically typed Silk value.
///
/// Every variable slot, literal and intermediate result holds exactly one
/// payload. Values are never mutated in place: assignment rebinds the slot
/// to a new `Variable`, so the same value may sit in several slots safely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variable {
    Integer(i32),
    Float(f64),
    String(String),
    List(Vec<Variable>),
}

/// Type tag of a [`Variable`], as persisted in compiled programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum VarType {
    Integer = 0,
    Float = 1,
    String = 2,
    List = 3,
}

impl VarType {
    pub fn from_tag(tag: u32) -> Option<VarType> {
        match tag {
            0 => Some(VarType::Integer),
            1 => Some(VarType::Float),
            2 => Some(VarType::String),
            3 => Some(VarType::List),
            _ => None,
        }
    }
}

impl Default for Variable {
    fn default() -> Self {
        Variable::Integer(0)
    }
}

impl Variable {
    pub fn from_bool(value: bool) -> Variable {
        Variable::Integer(if value { TRUE } else { FALSE })
    }

    /// A list of `size` default values.
    pub fn list_of(size: usize) -> Variable {
        Variable::List(vec![Variable::default(); size])
    }

    pub fn var_type(&self) -> VarType {
        match self {
            Variable::Integer(_) => VarType::Integer,
            Variable::Float(_) => VarType::Float,
            Variable::String(_) => VarType::String,
            Variable::List(_) => VarType::List,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Variable::List(_))
    }

    /// Number of elements; scalars count as a one-element list.
    pub fn list_count(&self) -> usize {
        match self {
            Variable::List(items) => items.len(),
            _ => 1,
        }
    }

    /// The value binary operators and truthiness see: element 0 for lists,
    /// the value itself otherwise.
    pub fn scalar(&self) -> &Variable {
        match self {
            Variable::List(_) => self.get_at(0),
            _ => self,
        }
    }

    /// Element `index` of the list view. Out-of-range reads yield Integer 0;
    /// a scalar answers index 0 with itself.
    pub fn get_at(&self, index: i64) -> &Variable {
        match self {
            Variable::List(items) => usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .unwrap_or(&ZERO),
            _ if index == 0 => self,
            _ => &ZERO,
        }
    }

    /// Returns a copy of `self` with the element at `path` replaced.
    ///
    /// A scalar target becomes a list whose first element is the old value.
    /// Lists grow with default values to reach the index. A negative index
    /// leaves the value unchanged.
    pub fn with_element(self, path: &[i64], value: Variable) -> Variable {
        let Some((&index, rest)) = path.split_first() else {
            return value;
        };
        let Ok(index) = usize::try_from(index) else {
            return self;
        };
        let mut items = match self {
            Variable::List(items) => items,
            scalar => vec![scalar],
        };
        if items.len() <= index {
            items.resize(index + 1, Variable::default());
        }
        let current = std::mem::take(&mut items[index]);
        items[index] = current.with_element(rest, value);
        Variable::List(items)
    }

    pub fn to_integer(&self) -> i32 {
        match self {
            Variable::Integer(v) => *v,
            Variable::Float(v) => round_to_int(*v),
            Variable::String(s) => parse_integer(s),
            Variable::List(_) => self.scalar().to_integer(),
        }
    }

    pub fn to_float(&self) -> f64 {
        match self {
            Variable::Integer(v) => *v as f64,
            Variable::Float(v) => *v,
            Variable::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            Variable::List(_) => self.scalar().to_float(),
        }
    }

    /// True when arithmetic with this value is carried out in floating point.
    pub fn is_float(&self) -> bool {
        match self {
            Variable::Integer(_) => false,
            Variable::Float(_) => true,
            Variable::String(s) => is_float_text(s),
            Variable::List(_) => self.scalar().is_float(),
        }
    }

    pub fn is_true(&self) -> bool {
        match self {
            Variable::Integer(v) => *v != FALSE,
            Variable::Float(v) => round_to_int(*v) != FALSE,
            Variable::String(s) => {
                let s = s.trim();
                s.parse::<i32>().is_ok_and(|v| v != FALSE)
                    || s.eq_ignore_ascii_case("true")
                    || s.eq_ignore_ascii_case("yes")
            }
            Variable::List(_) => self.scalar().is_true(),
        }
    }

    pub fn is_false(&self) -> bool {
        !self.is_true()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Integer(v) => write!(f, "{v}"),
            Variable::Float(v) => f.write_str(&format_float(*v)),
            Variable::String(s) => f.write_str(s),
            Variable::List(items) => {
                write!(f, "{{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

impl From<i32> for Variable {
    fn from(v: i32) -> Self {
        Variable::Integer(v)
    }
}

impl From<f64> for Variable {
    fn from(v: f64) -> Self {
        Variable::Float(v)
    }
}

impl From<bool> for Variable {
    fn from(v: bool) -> Self {
        Variable::from_bool(v)
    }
}

impl From<&str> for Variable {
    fn from(v: &str) -> Self {
        Variable::String(v.to_string())
    }
}

impl From<String> for Variable {
    fn from(v: String) -> Self {
        Variable::String(v)
    }
}

impl From<Vec<Variable>> for Variable {
    fn from(v: Vec<Variable>) -> Self {
        Variable::List(v)
    }
}

/// Round half up, saturating at the i32 range (NaN becomes 0).
fn round_to_int(v: f64) -> i32 {
    (v + 0.5).floor() as i32
}

fn parse_integer(s: &str) -> i32 {
    let s = s.trim();
    match s.parse::<i32>() {
        Ok(v) => v,
        Err(_) => s.parse::<f64>().map(round_to_int).unwrap_or(0),
    }
}

/// Whole floats keep a trailing `.0` so they stay distinguishable from
/// integers once converted to text.
pub(crate) fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Optional sign followed by digits and dots, with at least one digit.
pub(crate) fn is_numeric_text(s: &str) -> bool {
    let s = s.trim();
    let body = s.strip_prefix(['-', '+']).unwrap_or(s);
    body.chars().any(|c| c.is_ascii_digit()) && body.chars().all(|c| c.is_ascii_digit() || c == '.')
}

pub(crate) fn is_float_text(s: &str) -> bool {
    is_numeric_text(s) && s.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_integer_zero() {
        assert_eq!(Variable::default(), Variable::Integer(0));
        assert!(Variable::default().is_false());
    }

    #[test]
    fn list_scalar_view_is_first_element() {
        let list = Variable::List(vec![1.into(), 2.into(), 3.into()]);
        assert_eq!(list.to_integer(), 1);
        assert_eq!(list.list_count(), 3);
        assert!(list.is_true());
        assert_eq!(Variable::List(vec![]).to_integer(), 0);
    }

    #[test]
    fn get_at_out_of_range() {
        let list = Variable::List(vec![7.into()]);
        assert_eq!(list.get_at(0), &Variable::Integer(7));
        assert_eq!(list.get_at(5), &Variable::Integer(0));
        assert_eq!(list.get_at(-1), &Variable::Integer(0));
        let scalar = Variable::from("x");
        assert_eq!(scalar.get_at(0), &scalar);
        assert_eq!(scalar.get_at(1), &Variable::Integer(0));
    }

    #[test]
    fn with_element_grows_and_nests() {
        let v = Variable::default().with_element(&[2], Variable::from("z"));
        assert_eq!(
            v,
            Variable::List(vec![0.into(), 0.into(), "z".into()])
        );
        let nested = Variable::list_of(2).with_element(&[1, 1], 9.into());
        assert_eq!(nested.get_at(1).get_at(1), &Variable::Integer(9));
        assert_eq!(nested.get_at(1).get_at(0), &Variable::Integer(0));
    }

    #[test]
    fn with_element_negative_index_is_ignored() {
        let v = Variable::from(5);
        assert_eq!(v.clone().with_element(&[-1], 3.into()), v);
    }

    #[test]
    fn string_conversions() {
        assert_eq!(Variable::from("42").to_integer(), 42);
        assert_eq!(Variable::from("2.5").to_float(), 2.5);
        assert_eq!(Variable::from("abc").to_integer(), 0);
        assert!(Variable::from("2.5").is_float());
        assert!(!Variable::from("25").is_float());
        assert!(!Variable::from("a.b").is_float());
    }

    #[test]
    fn float_rounds_half_up() {
        assert_eq!(Variable::Float(2.5).to_integer(), 3);
        assert_eq!(Variable::Float(-2.5).to_integer(), -2);
        assert_eq!(Variable::Float(0.4).to_integer(), 0);
    }

    #[test]
    fn string_truthiness() {
        assert!(Variable::from("True").is_true());
        assert!(Variable::from("yes").is_true());
        assert!(Variable::from("-1").is_true());
        assert!(Variable::from("0").is_false());
        assert!(Variable::from("no").is_false());
    }

    #[test]
    fn display_formats() {
        assert_eq!(Variable::Float(3.0).to_string(), "3.0");
        assert_eq!(Variable::Float(3.25).to_string(), "3.25");
        assert_eq!(Variable::from(-4).to_string(), "-4");
        let list = Variable::List(vec![1.into(), "a".into()]);
        assert_eq!(list.to_string(), "{ 1, a }");
    }

    #[test]
    fn serde_untagged_round_trip() {
        let v: Variable = serde_json::from_str(r#"[1, 2.5, "x"]"#).unwrap();
        assert_eq!(
            v,
            Variable::List(vec![1.into(), 2.5.into(), "x".into()])
        );
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"[1,2.5,"x"]"#);
    }
}
