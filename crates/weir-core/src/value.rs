//! Runtime values.
//!
//! Tuples, records, lists and bags all flatten to an ordered vector: record
//! fields are stored in canonical label order, so structural equality on the
//! flat form is exactly value equality on the typed form. The type travels
//! separately (the pretty printer receives it; the evaluator does not need
//! it).
//!
//! `Value` carries a total order so `order`, `distinct` and group keys work
//! uniformly: reals compare by IEEE total order, closures by identity. The
//! order on closures is arbitrary but stable within a run; well-typed
//! programs never ask for it.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::builtin::BuiltIn;
use crate::error::RuntimeError;

/// A function value whose concrete representation lives in the evaluator
/// crate: a compiled match list plus its captured environment.
pub trait ApplyClosure: fmt::Debug {
    fn apply(&self, arg: Value) -> Result<Value, RuntimeError>;

    /// Short human-readable description, used by printers.
    fn describe(&self) -> &str {
        "fn"
    }
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Char(char),
    Int(i64),
    Real(f64),
    String(Rc<str>),
    /// Lists, bags, tuples and records (fields in label order).
    List(Rc<Vec<Value>>),
    /// A datatype constructor instance; `arg` is `None` for nullary
    /// constructors, and also when the constructor is used as a function
    /// value awaiting its argument.
    Con(Rc<str>, Option<Rc<Value>>),
    Builtin(BuiltIn),
    Closure(Rc<dyn ApplyClosure>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn con(name: impl Into<Rc<str>>, arg: Option<Value>) -> Value {
        Value::Con(name.into(), arg.map(Rc::new))
    }

    pub fn is_fn(&self) -> bool {
        matches!(self, Value::Builtin(_) | Value::Closure(_))
    }

    /// Rank used to order values of different shapes; within a well-typed
    /// program only equal ranks ever meet.
    fn rank(&self) -> u8 {
        match self {
            Value::Unit => 0,
            Value::Bool(_) => 1,
            Value::Char(_) => 2,
            Value::Int(_) => 3,
            Value::Real(_) => 4,
            Value::String(_) => 5,
            Value::List(_) => 6,
            Value::Con(..) => 7,
            Value::Builtin(_) => 8,
            Value::Closure(_) => 9,
        }
    }
}

// Invariant accessors: the type checker guarantees the shape, so a mismatch
// here is a compiler bug, not a user error.
impl Value {
    pub fn ensure_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            other => panic!("expected bool, got {other:?} (type checker must reject this)"),
        }
    }

    pub fn ensure_int(&self) -> i64 {
        match self {
            Value::Int(n) => *n,
            other => panic!("expected int, got {other:?} (type checker must reject this)"),
        }
    }

    pub fn ensure_list(&self) -> &Rc<Vec<Value>> {
        match self {
            Value::List(items) => items,
            other => panic!("expected collection, got {other:?} (type checker must reject this)"),
        }
    }

    /// Destructure a pair argument of a binary built-in.
    pub fn ensure_pair(&self) -> (&Value, &Value) {
        match self {
            Value::List(items) if items.len() == 2 => (&items[0], &items[1]),
            other => panic!("expected pair, got {other:?} (type checker must reject this)"),
        }
    }
}

fn closure_addr(c: &Rc<dyn ApplyClosure>) -> usize {
    Rc::as_ptr(c) as *const () as usize
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Unit, Unit) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Char(a), Char(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Real(a), Real(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (List(a), List(b)) => a.iter().cmp(b.iter()),
            (Con(na, aa), Con(nb, ab)) => na
                .cmp(nb)
                .then_with(|| match (aa, ab) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(x), Some(y)) => x.cmp(y),
                }),
            (Builtin(a), Builtin(b)) => a.cmp(b),
            (Closure(a), Closure(b)) => closure_addr(a).cmp(&closure_addr(b)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Unit => {}
            Value::Bool(b) => b.hash(state),
            Value::Char(c) => c.hash(state),
            Value::Int(n) => n.hash(state),
            Value::Real(r) => r.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::List(items) => {
                for item in items.iter() {
                    item.hash(state);
                }
            }
            Value::Con(name, arg) => {
                name.hash(state);
                if let Some(arg) = arg {
                    arg.hash(state);
                }
            }
            Value::Builtin(b) => b.hash(state),
            Value::Closure(c) => closure_addr(c).hash(state),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Unit => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Char(c) => serializer.serialize_char(*c),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Con(name, None) => serializer.serialize_str(name),
            Value::Con(name, Some(arg)) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(name.as_ref(), arg.as_ref())?;
                map.end()
            }
            Value::Builtin(b) => serializer.serialize_str(b.name()),
            Value::Closure(c) => serializer.serialize_str(c.describe()),
        }
    }
}

/// Untyped rendering, for debugging and tests. The typed, width-aware
/// rendering lives with the evaluator's pretty printer.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "#\"{c}\""),
            Value::Int(n) if *n < 0 => write!(f, "~{}", n.unsigned_abs()),
            Value::Int(n) => write!(f, "{n}"),
            Value::Real(r) => f.write_str(&format_real(*r)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Con(name, None) => f.write_str(name),
            Value::Con(name, Some(arg)) => write!(f, "{name} {arg}"),
            Value::Builtin(b) => write!(f, "{b}"),
            Value::Closure(c) => f.write_str(c.describe()),
        }
    }
}

/// Render a real in source form: always with a decimal point, negatives with
/// the `~` sign.
pub fn format_real(r: f64) -> String {
    let body = if r == r.trunc() && r.is_finite() {
        format!("{:.1}", r.abs())
    } else {
        format!("{}", r.abs())
    };
    if r.is_sign_negative() && r != 0.0 {
        format!("~{body}")
    } else {
        body
    }
}
