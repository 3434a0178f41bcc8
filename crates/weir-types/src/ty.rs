//! The type language.
//!
//! Types are immutable and shared via `Rc`; equality is structural. Records
//! are canonicalized on construction: fields sort into the label order of
//! `weir_core::label`, and a record whose labels spell `"1".."n"` *is* the
//! tuple of arity `n`. Every type renders to a canonical display string (its
//! moniker) used by diagnostics and tests.
//!
//! Datatypes are identified by name; their constructor tables live in the
//! session-scoped [`TypeSystem`] rather than in the type node itself, so
//! recursive datatypes (`datatype t = LEAF | NODE of t * t`) need no cyclic
//! type values. Constructor argument types use `Type::Var(0..arity)` for the
//! datatype's parameters.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use weir_core::label;

/// The primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Bool,
    Char,
    Int,
    Real,
    String,
    Unit,
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::Int => "int",
            Primitive::Real => "real",
            Primitive::String => "string",
            Primitive::Unit => "unit",
        }
    }

    pub fn by_name(name: &str) -> Option<Primitive> {
        Some(match name {
            "bool" => Primitive::Bool,
            "char" => Primitive::Char,
            "int" => Primitive::Int,
            "real" => Primitive::Real,
            "string" => Primitive::String,
            "unit" => Primitive::Unit,
            _ => return None,
        })
    }

    /// Primitives with a total order usable in `order` steps and interval
    /// extents.
    pub fn is_ordered(&self) -> bool {
        !matches!(self, Primitive::Unit)
    }
}

/// A type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(Primitive),
    /// A type variable, by ordinal. Inside a `Forall` body the ordinals
    /// `0..arity` are the bound parameters.
    Var(u32),
    Fn(Rc<Type>, Rc<Type>),
    Tuple(Vec<Rc<Type>>),
    /// Fields in canonical label order. Never has tuple labels (those
    /// canonicalize to `Tuple`) and never is empty (that is `unit`).
    Record(Vec<(String, Rc<Type>)>),
    List(Rc<Type>),
    Bag(Rc<Type>),
    /// A datatype instance; the constructor table is interned in the
    /// [`TypeSystem`] under `name`.
    Data { name: Rc<str>, args: Vec<Rc<Type>> },
    /// A named abbreviation for `target`. Structurally transparent: the
    /// checker expands aliases before unification.
    Alias { name: Rc<str>, target: Rc<Type> },
    /// Universal quantification over `arity` parameters `Var(0..arity)`.
    Forall { arity: usize, body: Rc<Type> },
    /// An overload bundle: a nonempty set of candidate function types.
    Multi(Vec<Rc<Type>>),
}

impl Type {
    pub fn bool() -> Rc<Type> {
        Rc::new(Type::Primitive(Primitive::Bool))
    }

    pub fn char() -> Rc<Type> {
        Rc::new(Type::Primitive(Primitive::Char))
    }

    pub fn int() -> Rc<Type> {
        Rc::new(Type::Primitive(Primitive::Int))
    }

    pub fn real() -> Rc<Type> {
        Rc::new(Type::Primitive(Primitive::Real))
    }

    pub fn string() -> Rc<Type> {
        Rc::new(Type::Primitive(Primitive::String))
    }

    pub fn unit() -> Rc<Type> {
        Rc::new(Type::Primitive(Primitive::Unit))
    }

    pub fn var(ordinal: u32) -> Rc<Type> {
        Rc::new(Type::Var(ordinal))
    }

    pub fn func(param: Rc<Type>, result: Rc<Type>) -> Rc<Type> {
        Rc::new(Type::Fn(param, result))
    }

    pub fn list(element: Rc<Type>) -> Rc<Type> {
        Rc::new(Type::List(element))
    }

    pub fn bag(element: Rc<Type>) -> Rc<Type> {
        Rc::new(Type::Bag(element))
    }

    pub fn forall(arity: usize, body: Rc<Type>) -> Rc<Type> {
        if arity == 0 {
            body
        } else {
            Rc::new(Type::Forall { arity, body })
        }
    }

    pub fn multi(candidates: Vec<Rc<Type>>) -> Rc<Type> {
        debug_assert!(!candidates.is_empty(), "empty overload bundle");
        Rc::new(Type::Multi(candidates))
    }

    /// The element type, if this is a list or bag.
    pub fn element(&self) -> Option<&Rc<Type>> {
        match self {
            Type::List(t) | Type::Bag(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Type::List(_) | Type::Bag(_))
    }

    /// Field types in label order, viewing a tuple as the record
    /// `{1: t1, ..., n: tn}`.
    pub fn field_types(&self) -> Option<Vec<Rc<Type>>> {
        match self {
            Type::Tuple(args) => Some(args.clone()),
            Type::Record(fields) => Some(fields.iter().map(|(_, t)| t.clone()).collect()),
            _ => None,
        }
    }

    /// Field labels in canonical order, viewing a tuple as `"1".."n"`.
    pub fn field_labels(&self) -> Option<Vec<String>> {
        match self {
            Type::Tuple(args) => Some((1..=args.len()).map(|i| i.to_string()).collect()),
            Type::Record(fields) => Some(fields.iter().map(|(l, _)| l.clone()).collect()),
            _ => None,
        }
    }

    /// The canonical display string.
    pub fn moniker(&self) -> String {
        self.to_string()
    }
}

/// Display a type variable ordinal as `'a`, `'b`, ... then `'v26`, ...
pub fn var_name(ordinal: u32) -> String {
    if ordinal < 26 {
        let c = (b'a' + ordinal as u8) as char;
        format!("'{c}")
    } else {
        format!("'v{ordinal}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => f.write_str(p.name()),
            Type::Var(n) => f.write_str(&var_name(*n)),
            Type::Fn(param, result) => {
                if matches!(param.as_ref(), Type::Fn(..)) {
                    write!(f, "({param}) -> {result}")
                } else {
                    write!(f, "{param} -> {result}")
                }
            }
            Type::Tuple(args) => {
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" * ")?;
                    }
                    if matches!(arg.as_ref(), Type::Fn(..) | Type::Tuple(_)) {
                        write!(f, "({arg})")?;
                    } else {
                        write!(f, "{arg}")?;
                    }
                }
                Ok(())
            }
            Type::Record(fields) => {
                f.write_str("{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}:{ty}")?;
                }
                f.write_str("}")
            }
            Type::List(t) => write_applied(f, t, "list"),
            Type::Bag(t) => write_applied(f, t, "bag"),
            Type::Data { name, args } => match args.len() {
                0 => f.write_str(name),
                1 => write_applied(f, &args[0], name),
                _ => {
                    f.write_str("(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ") {name}")
                }
            },
            Type::Alias { name, .. } => f.write_str(name),
            Type::Forall { arity, body } => {
                f.write_str("forall")?;
                for i in 0..*arity {
                    write!(f, " {}", var_name(i as u32))?;
                }
                write!(f, ". {body}")
            }
            Type::Multi(candidates) => {
                for (i, c) in candidates.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    write!(f, "{c}")?;
                }
                Ok(())
            }
        }
    }
}

fn write_applied(f: &mut fmt::Formatter<'_>, arg: &Type, con: &str) -> fmt::Result {
    if matches!(arg, Type::Fn(..) | Type::Tuple(_)) {
        write!(f, "({arg}) {con}")
    } else {
        write!(f, "{arg} {con}")
    }
}

/// An interned datatype definition. `Type::Var(0..arity)` inside constructor
/// argument types stand for the datatype's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTypeDef {
    pub name: Rc<str>,
    pub arity: usize,
    /// Constructor name to optional argument type, in declaration order.
    pub constructors: Vec<(String, Option<Rc<Type>>)>,
}

impl DataTypeDef {
    pub fn constructor(&self, name: &str) -> Option<&Option<Rc<Type>>> {
        self.constructors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }
}

/// Session-scoped type factory and memo table.
///
/// The only significant shared mutable object during compilation: it issues
/// fresh name ordinals and interns datatype definitions. A single
/// compilation owns it exclusively.
#[derive(Debug, Default)]
pub struct TypeSystem {
    datatypes: IndexMap<Rc<str>, Rc<DataTypeDef>>,
    aliases: IndexMap<Rc<str>, (usize, Rc<Type>)>,
    name_ordinals: HashMap<String, u32>,
}

impl TypeSystem {
    /// A type system pre-loaded with the standard datatypes `option` and
    /// `order`.
    pub fn new() -> Self {
        let mut ts = Self::default();
        ts.register_datatype(DataTypeDef {
            name: "option".into(),
            arity: 1,
            constructors: vec![
                ("NONE".to_owned(), None),
                ("SOME".to_owned(), Some(Type::var(0))),
            ],
        });
        ts.register_datatype(DataTypeDef {
            name: "order".into(),
            arity: 0,
            constructors: vec![
                ("LESS".to_owned(), None),
                ("EQUAL".to_owned(), None),
                ("GREATER".to_owned(), None),
            ],
        });
        ts
    }

    /// Canonicalize and build a record type: fields sort into label order,
    /// tuple-labelled records collapse to tuples, the empty record is
    /// `unit`.
    pub fn record(&self, mut fields: Vec<(String, Rc<Type>)>) -> Rc<Type> {
        fields.sort_by(|(a, _), (b, _)| label::compare_labels(a, b));
        if fields.is_empty() {
            return Type::unit();
        }
        if label::are_tuple_labels(fields.iter().map(|(l, _)| l.as_str())) {
            return Rc::new(Type::Tuple(fields.into_iter().map(|(_, t)| t).collect()));
        }
        Rc::new(Type::Record(fields))
    }

    pub fn tuple(&self, args: Vec<Rc<Type>>) -> Rc<Type> {
        match args.len() {
            0 => Type::unit(),
            1 => args.into_iter().next().expect("len checked"),
            _ => Rc::new(Type::Tuple(args)),
        }
    }

    /// Intern a datatype definition and return the type applied to its own
    /// parameters.
    pub fn register_datatype(&mut self, def: DataTypeDef) -> Rc<Type> {
        let name = def.name.clone();
        let arity = def.arity;
        self.datatypes.insert(name.clone(), Rc::new(def));
        Rc::new(Type::Data {
            name,
            args: (0..arity).map(|i| Type::var(i as u32)).collect(),
        })
    }

    pub fn datatype(&self, name: &str) -> Option<&Rc<DataTypeDef>> {
        self.datatypes.get(name)
    }

    /// Find the datatype declaring `con_name`, with the constructor's
    /// argument type (still in terms of the datatype's parameters).
    pub fn constructor(&self, con_name: &str) -> Option<(Rc<DataTypeDef>, Option<Rc<Type>>)> {
        // Later declarations shadow earlier ones.
        self.datatypes.values().rev().find_map(|def| {
            def.constructor(con_name)
                .map(|arg| (def.clone(), arg.clone()))
        })
    }

    pub fn register_alias(&mut self, name: impl Into<Rc<str>>, arity: usize, target: Rc<Type>) {
        self.aliases.insert(name.into(), (arity, target));
    }

    pub fn alias(&self, name: &str) -> Option<&(usize, Rc<Type>)> {
        self.aliases.get(name)
    }

    /// Strip alias wrappers from the head of a type.
    pub fn expand(&self, ty: &Rc<Type>) -> Rc<Type> {
        let mut t = ty.clone();
        while let Type::Alias { target, .. } = t.as_ref() {
            t = target.clone();
        }
        t
    }

    /// Fresh ordinal for a binding of `name`; (name, ordinal) pairs are
    /// unique within a session.
    pub fn ordinal(&mut self, name: &str) -> u32 {
        let counter = self.name_ordinals.entry(name.to_owned()).or_insert(0);
        let ordinal = *counter;
        *counter += 1;
        ordinal
    }

    /// Substitute `Var(i)` for `args[i]` throughout `body`. Variables past
    /// `args.len()` are left alone.
    pub fn instantiate(&self, body: &Rc<Type>, args: &[Rc<Type>]) -> Rc<Type> {
        substitute(body, args)
    }
}

pub(crate) fn substitute(ty: &Rc<Type>, args: &[Rc<Type>]) -> Rc<Type> {
    match ty.as_ref() {
        Type::Var(i) => match args.get(*i as usize) {
            Some(arg) => arg.clone(),
            None => ty.clone(),
        },
        Type::Primitive(_) => ty.clone(),
        Type::Fn(p, r) => Type::func(substitute(p, args), substitute(r, args)),
        Type::Tuple(items) => Rc::new(Type::Tuple(
            items.iter().map(|t| substitute(t, args)).collect(),
        )),
        Type::Record(fields) => Rc::new(Type::Record(
            fields
                .iter()
                .map(|(l, t)| (l.clone(), substitute(t, args)))
                .collect(),
        )),
        Type::List(t) => Type::list(substitute(t, args)),
        Type::Bag(t) => Type::bag(substitute(t, args)),
        Type::Data { name, args: targs } => Rc::new(Type::Data {
            name: name.clone(),
            args: targs.iter().map(|t| substitute(t, args)).collect(),
        }),
        Type::Alias { name, target } => Rc::new(Type::Alias {
            name: name.clone(),
            target: substitute(target, args),
        }),
        // A forall body's parameters are its own 0..arity; substituting an
        // instantiation into one would capture. The checker never nests
        // these.
        Type::Forall { .. } => ty.clone(),
        Type::Multi(cands) => Rc::new(Type::Multi(
            cands.iter().map(|t| substitute(t, args)).collect(),
        )),
    }
}
