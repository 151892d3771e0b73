//! Built-in catalogue merged into a [`HostRegistry`](super::HostRegistry).

use crate::function::Arity;
use crate::variable::{FALSE, TRUE, Variable};

type Builtin = fn(&[Variable]) -> Variable;

pub(super) fn variables() -> Vec<(&'static str, Variable)> {
    vec![("True", Variable::Integer(TRUE)), ("False", Variable::Integer(FALSE))]
}

const FUNCTIONS: &[(&str, Arity, Builtin)] = &[
    ("Abs", Arity::exactly(1), abs),
    ("Asc", Arity::exactly(1), asc),
    ("Chr", Arity::exactly(1), chr),
    ("Float", Arity::exactly(1), float),
    ("InStr", Arity::exactly(2), in_str),
    ("Int", Arity::exactly(1), int),
    ("IsList", Arity::exactly(1), is_list),
    ("LCase", Arity::exactly(1), lcase),
    ("Left", Arity::exactly(2), left),
    ("Len", Arity::exactly(1), len),
    ("Max", Arity::at_least(1), max),
    ("Mid", Arity::between(2, 3), mid),
    ("Min", Arity::at_least(1), min),
    ("Right", Arity::exactly(2), right),
    ("Sqrt", Arity::exactly(1), sqrt),
    ("Str", Arity::exactly(1), to_str),
    ("Trim", Arity::exactly(1), trim),
    ("UCase", Arity::exactly(1), ucase),
];

pub(super) fn functions() -> impl Iterator<Item = (&'static str, Arity, Builtin)> {
    FUNCTIONS.iter().copied()
}

fn arg(args: &[Variable], i: usize) -> Variable {
    args.get(i).cloned().unwrap_or_default()
}

fn text(args: &[Variable], i: usize) -> String {
    arg(args, i).to_string()
}

/// Clamps a script-supplied count or position to a usable size.
fn count(v: &Variable) -> usize {
    usize::try_from(v.to_integer()).unwrap_or(0)
}

fn abs(args: &[Variable]) -> Variable {
    match arg(args, 0) {
        Variable::Float(f) => Variable::Float(f.abs()),
        v if v.is_float() => Variable::Float(v.to_float().abs()),
        v => Variable::Integer(v.to_integer().wrapping_abs()),
    }
}

fn asc(args: &[Variable]) -> Variable {
    Variable::Integer(text(args, 0).chars().next().map(|c| c as i32).unwrap_or(0))
}

fn chr(args: &[Variable]) -> Variable {
    let c = u32::try_from(arg(args, 0).to_integer())
        .ok()
        .and_then(char::from_u32)
        .map(String::from)
        .unwrap_or_default();
    Variable::String(c)
}

fn float(args: &[Variable]) -> Variable {
    Variable::Float(arg(args, 0).to_float())
}

fn int(args: &[Variable]) -> Variable {
    Variable::Integer(arg(args, 0).to_integer())
}

fn to_str(args: &[Variable]) -> Variable {
    Variable::String(text(args, 0))
}

fn is_list(args: &[Variable]) -> Variable {
    Variable::from_bool(arg(args, 0).is_list())
}

/// Element count of a list, character count of anything else.
fn len(args: &[Variable]) -> Variable {
    let v = arg(args, 0);
    let n = match &v {
        Variable::List(_) => v.list_count(),
        other => other.to_string().chars().count(),
    };
    Variable::Integer(i32::try_from(n).unwrap_or(i32::MAX))
}

fn lcase(args: &[Variable]) -> Variable {
    Variable::String(text(args, 0).to_lowercase())
}

fn ucase(args: &[Variable]) -> Variable {
    Variable::String(text(args, 0).to_uppercase())
}

fn trim(args: &[Variable]) -> Variable {
    Variable::String(text(args, 0).trim().to_string())
}

fn left(args: &[Variable]) -> Variable {
    let n = count(&arg(args, 1));
    Variable::String(text(args, 0).chars().take(n).collect())
}

fn right(args: &[Variable]) -> Variable {
    let s = text(args, 0);
    let n = count(&arg(args, 1));
    let skip = s.chars().count().saturating_sub(n);
    Variable::String(s.chars().skip(skip).collect())
}

/// `Mid(text, start[, length])` with a 1-based start.
fn mid(args: &[Variable]) -> Variable {
    let start = count(&arg(args, 1)).saturating_sub(1);
    let s = text(args, 0);
    let chars = s.chars().skip(start);
    let s = match args.get(2) {
        Some(n) => chars.take(count(n)).collect(),
        None => chars.collect(),
    };
    Variable::String(s)
}

/// 1-based character position of the second argument in the first, or 0.
fn in_str(args: &[Variable]) -> Variable {
    let haystack = text(args, 0);
    let needle = text(args, 1);
    let pos = haystack
        .find(&needle)
        .map(|byte| haystack[..byte].chars().count() + 1)
        .unwrap_or(0);
    Variable::Integer(i32::try_from(pos).unwrap_or(0))
}

fn min(args: &[Variable]) -> Variable {
    args.iter()
        .cloned()
        .reduce(|a, b| if b.compare(&a).is_lt() { b } else { a })
        .unwrap_or_default()
}

fn max(args: &[Variable]) -> Variable {
    args.iter()
        .cloned()
        .reduce(|a, b| if b.compare(&a).is_gt() { b } else { a })
        .unwrap_or_default()
}

fn sqrt(args: &[Variable]) -> Variable {
    Variable::Float(arg(args, 0).to_float().sqrt())
}
