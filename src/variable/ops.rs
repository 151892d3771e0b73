//! Arithmetic, comparison and logical operators over [`Variable`].
//!
//! Lists take part through their first element. The left operand decides
//! the result type: integers stay integral unless the right side is
//! floating, floats stay floating, and numeric strings behave like the
//! number they spell.

use std::cmp::Ordering;

use super::{Variable, format_float, is_numeric_text};

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

impl Arith {
    fn int(self, a: i32, b: i32) -> i32 {
        match self {
            Arith::Add => a.wrapping_add(b),
            Arith::Subtract => a.wrapping_sub(b),
            Arith::Multiply => a.wrapping_mul(b),
            Arith::Divide if b == 0 => 0,
            Arith::Divide => a.wrapping_div(b),
            Arith::Modulus if b == 0 => 0,
            Arith::Modulus => a.wrapping_rem(b),
        }
    }

    fn float(self, a: f64, b: f64) -> f64 {
        match self {
            Arith::Add => a + b,
            Arith::Subtract => a - b,
            Arith::Multiply => a * b,
            Arith::Divide if b == 0.0 => 0.0,
            Arith::Divide => a / b,
            Arith::Modulus if b == 0.0 => 0.0,
            Arith::Modulus => a % b,
        }
    }
}

impl Variable {
    fn arith(&self, rhs: &Variable, op: Arith) -> Variable {
        match self {
            Variable::List(_) => self.scalar().arith(rhs, op),
            Variable::Integer(a) => {
                if rhs.is_float() {
                    Variable::Float(op.float(*a as f64, rhs.to_float()))
                } else {
                    Variable::Integer(op.int(*a, rhs.to_integer()))
                }
            }
            Variable::Float(a) => Variable::Float(op.float(*a, rhs.to_float())),
            Variable::String(_) => {
                if self.is_float() || rhs.is_float() {
                    Variable::Float(op.float(self.to_float(), rhs.to_float()))
                } else {
                    Variable::Integer(op.int(self.to_integer(), rhs.to_integer()))
                }
            }
        }
    }

    pub fn add(&self, rhs: &Variable) -> Variable {
        self.arith(rhs, Arith::Add)
    }

    pub fn subtract(&self, rhs: &Variable) -> Variable {
        self.arith(rhs, Arith::Subtract)
    }

    pub fn multiply(&self, rhs: &Variable) -> Variable {
        self.arith(rhs, Arith::Multiply)
    }

    /// Division by zero yields zero of the result type.
    pub fn divide(&self, rhs: &Variable) -> Variable {
        self.arith(rhs, Arith::Divide)
    }

    pub fn modulus(&self, rhs: &Variable) -> Variable {
        self.arith(rhs, Arith::Modulus)
    }

    pub fn power(&self, rhs: &Variable) -> Variable {
        Variable::Float(self.to_float().powf(rhs.to_float()))
    }

    pub fn concat(&self, rhs: &Variable) -> Variable {
        Variable::String(format!("{}{}", self.scalar(), rhs))
    }

    pub fn negate(&self) -> Variable {
        match self {
            Variable::Integer(v) => Variable::Integer(v.wrapping_neg()),
            Variable::Float(v) => Variable::Float(-v),
            Variable::String(_) if self.is_float() => Variable::Float(-self.to_float()),
            Variable::String(_) => Variable::Integer(self.to_integer().wrapping_neg()),
            Variable::List(_) => self.scalar().negate(),
        }
    }

    pub fn and(&self, rhs: &Variable) -> Variable {
        Variable::from_bool(self.is_true() && rhs.is_true())
    }

    pub fn or(&self, rhs: &Variable) -> Variable {
        Variable::from_bool(self.is_true() || rhs.is_true())
    }

    pub fn xor(&self, rhs: &Variable) -> Variable {
        Variable::from_bool(self.is_true() != rhs.is_true())
    }

    pub fn not(&self) -> Variable {
        Variable::from_bool(self.is_false())
    }

    /// Orders two values. Numbers compare numerically; a number against a
    /// numeric string compares numerically too, otherwise as text.
    pub fn compare(&self, rhs: &Variable) -> Ordering {
        match (self, rhs) {
            (Variable::List(_), _) => self.scalar().compare(rhs),
            (_, Variable::List(_)) => self.compare(rhs.scalar()),
            (Variable::Integer(a), Variable::Integer(b)) => a.cmp(b),
            (Variable::String(a), Variable::String(b)) => a.cmp(b),
            (Variable::String(s), number) => match numeric_value(s) {
                Some(n) => cmp_f64(n, number.to_float()),
                None => s.as_str().cmp(number_text(number).as_str()),
            },
            (number, Variable::String(s)) => match numeric_value(s) {
                Some(n) => cmp_f64(number.to_float(), n),
                None => number_text(number).as_str().cmp(s.as_str()),
            },
            (a, b) => cmp_f64(a.to_float(), b.to_float()),
        }
    }

    pub fn is_equal(&self, rhs: &Variable) -> Variable {
        Variable::from_bool(self.compare(rhs) == Ordering::Equal)
    }

    pub fn is_not_equal(&self, rhs: &Variable) -> Variable {
        Variable::from_bool(self.compare(rhs) != Ordering::Equal)
    }

    pub fn is_greater_than(&self, rhs: &Variable) -> Variable {
        Variable::from_bool(self.compare(rhs) == Ordering::Greater)
    }

    pub fn is_greater_than_or_equal(&self, rhs: &Variable) -> Variable {
        Variable::from_bool(self.compare(rhs) != Ordering::Less)
    }

    pub fn is_less_than(&self, rhs: &Variable) -> Variable {
        Variable::from_bool(self.compare(rhs) == Ordering::Less)
    }

    pub fn is_less_than_or_equal(&self, rhs: &Variable) -> Variable {
        Variable::from_bool(self.compare(rhs) != Ordering::Greater)
    }
}

fn numeric_value(s: &str) -> Option<f64> {
    if is_numeric_text(s) {
        s.trim().parse::<f64>().ok()
    } else {
        None
    }
}

fn number_text(v: &Variable) -> String {
    match v {
        Variable::Float(f) => format_float(*f),
        other => other.to_string(),
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[i32]) -> Variable {
        Variable::List(items.iter().map(|&v| v.into()).collect())
    }

    #[test]
    fn integer_concat_is_text() {
        assert_eq!(
            Variable::from(3).concat(&Variable::from(4)),
            Variable::from("34")
        );
    }

    #[test]
    fn float_string_promotes_integer() {
        assert_eq!(
            Variable::from("2.5").add(&Variable::from(1)),
            Variable::Float(3.5)
        );
        assert_eq!(
            Variable::from(1).add(&Variable::from("2.5")),
            Variable::Float(3.5)
        );
    }

    #[test]
    fn integer_string_stays_integral() {
        assert_eq!(
            Variable::from("7").subtract(&Variable::from(2)),
            Variable::Integer(5)
        );
    }

    #[test]
    fn divide_by_zero_is_zero() {
        assert_eq!(
            Variable::from(5).divide(&Variable::from(0)),
            Variable::Integer(0)
        );
        assert_eq!(
            Variable::from(5).modulus(&Variable::from(0)),
            Variable::Integer(0)
        );
        assert_eq!(
            Variable::Float(5.0).divide(&Variable::from(0)),
            Variable::Float(0.0)
        );
    }

    #[test]
    fn integer_overflow_wraps() {
        assert_eq!(
            Variable::from(i32::MAX).add(&Variable::from(1)),
            Variable::Integer(i32::MIN)
        );
        assert_eq!(
            Variable::from(i32::MIN).divide(&Variable::from(-1)),
            Variable::Integer(i32::MIN)
        );
    }

    #[test]
    fn power_is_always_float() {
        assert_eq!(
            Variable::from(2).power(&Variable::from(10)),
            Variable::Float(1024.0)
        );
    }

    #[test]
    fn list_operand_uses_first_element() {
        assert_eq!(list(&[4, 9]).add(&Variable::from(1)), Variable::Integer(5));
        assert_eq!(
            Variable::from(1).add(&list(&[4, 9])),
            Variable::Integer(5)
        );
        assert_eq!(list(&[4, 9]).negate(), Variable::Integer(-4));
    }

    #[test]
    fn concat_renders_right_list() {
        assert_eq!(
            Variable::from("x").concat(&list(&[1, 2])),
            Variable::from("x{ 1, 2 }")
        );
    }

    #[test]
    fn comparisons_yield_true_or_false() {
        let (a, b) = (Variable::from(2), Variable::from(3));
        assert_eq!(a.is_less_than(&b), Variable::Integer(-1));
        assert_eq!(a.is_greater_than(&b), Variable::Integer(0));
        assert_eq!(a.is_less_than_or_equal(&a), Variable::Integer(-1));
        assert_eq!(a.is_not_equal(&b), Variable::Integer(-1));
    }

    #[test]
    fn mixed_comparisons() {
        assert_eq!(
            Variable::from(10).compare(&Variable::from("9")),
            Ordering::Greater
        );
        assert_eq!(
            Variable::from(2).compare(&Variable::Float(2.0)),
            Ordering::Equal
        );
        assert_eq!(
            Variable::from("abc").compare(&Variable::from("abd")),
            Ordering::Less
        );
        // "10" < "x" as text
        assert_eq!(
            Variable::from(10).compare(&Variable::from("x")),
            Ordering::Less
        );
    }

    #[test]
    fn logical_operators() {
        let t = Variable::from(-1);
        let f = Variable::from(0);
        assert_eq!(t.and(&f), f);
        assert_eq!(t.or(&f), t);
        assert_eq!(t.xor(&t), f);
        assert_eq!(f.not(), t);
        assert_eq!(Variable::from("yes").and(&Variable::from(5)), t);
    }
}
