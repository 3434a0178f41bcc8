//! The structural embedding between types and terms.
//!
//! Going in, a type becomes a term over the operator vocabulary of
//! [`crate::term`]; `forall` parameters and free type variables instantiate
//! to fresh unification variables (consistently within one call, so `'a ->
//! 'a` keeps both ends tied together). Going out, a resolved term becomes a
//! type; variables still unbound after unification turn into type variables
//! numbered in first-appearance order, ready for generalization.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::term::{
    ATOM_BAG, ATOM_LIST, DATA_PREFIX, OP_COLL, OP_FN, OP_TUPLE, RECORD_PREFIX, Term, TermVar,
    VarSupply,
};
use crate::ty::{Primitive, Type};

/// Translate a type to a term, instantiating type variables to fresh
/// unification variables via `inst` (shared across one embedding so repeated
/// variables stay equal).
pub fn type_to_term(
    ty: &Type,
    supply: &mut VarSupply,
    inst: &mut IndexMap<u32, TermVar>,
) -> Term {
    match ty {
        Type::Primitive(p) => Term::atom(p.name()),
        Type::Var(i) => {
            let var = *inst.entry(*i).or_insert_with(|| supply.fresh());
            Term::Var(var)
        }
        Type::Fn(param, result) => Term::app(
            OP_FN,
            vec![
                type_to_term(param, supply, inst),
                type_to_term(result, supply, inst),
            ],
        ),
        Type::Tuple(args) => Term::app(
            OP_TUPLE,
            args.iter()
                .map(|t| type_to_term(t, supply, inst))
                .collect(),
        ),
        Type::Record(fields) => {
            let labels: Vec<String> = fields.iter().map(|(l, _)| l.clone()).collect();
            Term::App(
                Term::record_op(&labels),
                fields
                    .iter()
                    .map(|(_, t)| type_to_term(t, supply, inst))
                    .collect(),
            )
        }
        Type::List(t) => collection(ATOM_LIST, type_to_term(t, supply, inst)),
        Type::Bag(t) => collection(ATOM_BAG, type_to_term(t, supply, inst)),
        Type::Data { name, args } => Term::App(
            Term::data_op(name),
            args.iter().map(|t| type_to_term(t, supply, inst)).collect(),
        ),
        Type::Alias { target, .. } => type_to_term(target, supply, inst),
        // Instantiate: the body's parameters 0..arity go through `inst`
        // like any other variables, each use site getting fresh ones.
        Type::Forall { body, .. } => type_to_term(body, supply, inst),
        Type::Multi(_) => {
            panic!("overload bundle reached the unifier; candidates must be split first")
        }
    }
}

/// Translate a type whose parameters `Var(0..n)` are given terms; used to
/// expand aliases at annotation sites. Variables past the argument list
/// get fresh unification variables.
pub fn type_to_term_with_args(
    ty: &Type,
    args: &[Term],
    supply: &mut VarSupply,
    inst: &mut IndexMap<u32, TermVar>,
) -> Term {
    match ty {
        Type::Var(i) => match args.get(*i as usize) {
            Some(term) => term.clone(),
            None => {
                let var = *inst.entry(*i).or_insert_with(|| supply.fresh());
                Term::Var(var)
            }
        },
        Type::Primitive(p) => Term::atom(p.name()),
        Type::Fn(param, result) => Term::app(
            OP_FN,
            vec![
                type_to_term_with_args(param, args, supply, inst),
                type_to_term_with_args(result, args, supply, inst),
            ],
        ),
        Type::Tuple(items) => Term::app(
            OP_TUPLE,
            items
                .iter()
                .map(|t| type_to_term_with_args(t, args, supply, inst))
                .collect(),
        ),
        Type::Record(fields) => {
            let labels: Vec<String> = fields.iter().map(|(l, _)| l.clone()).collect();
            Term::App(
                Term::record_op(&labels),
                fields
                    .iter()
                    .map(|(_, t)| type_to_term_with_args(t, args, supply, inst))
                    .collect(),
            )
        }
        Type::List(t) => collection(ATOM_LIST, type_to_term_with_args(t, args, supply, inst)),
        Type::Bag(t) => collection(ATOM_BAG, type_to_term_with_args(t, args, supply, inst)),
        Type::Data { name, args: targs } => Term::App(
            Term::data_op(name),
            targs
                .iter()
                .map(|t| type_to_term_with_args(t, args, supply, inst))
                .collect(),
        ),
        Type::Alias { target, .. } => type_to_term_with_args(target, args, supply, inst),
        Type::Forall { body, .. } => type_to_term_with_args(body, args, supply, inst),
        Type::Multi(_) => {
            panic!("overload bundle reached the unifier; candidates must be split first")
        }
    }
}

/// A collection term with a known kind atom.
pub fn collection(kind: &'static str, element: Term) -> Term {
    Term::app(OP_COLL, vec![Term::atom(kind), element])
}

/// A collection term whose kind is still an open variable.
pub fn open_collection(kind: TermVar, element: Term) -> Term {
    Term::app(OP_COLL, vec![Term::Var(kind), element])
}

/// Translate a resolved term back to a type. Unbound variables become type
/// variables numbered by first appearance through `vars`.
pub fn term_to_type(term: &Term, vars: &mut IndexMap<u32, u32>) -> Rc<Type> {
    match term {
        Term::Var(v) => {
            let next = vars.len() as u32;
            let ordinal = *vars.entry(v.0).or_insert(next);
            Type::var(ordinal)
        }
        Term::Atom(name) => match Primitive::by_name(name) {
            Some(p) => Rc::new(Type::Primitive(p)),
            None => panic!("unknown atom {name} in resolved term"),
        },
        Term::App(op, args) => match op.as_ref() {
            OP_FN => Type::func(
                term_to_type(&args[0], vars),
                term_to_type(&args[1], vars),
            ),
            OP_TUPLE => Rc::new(Type::Tuple(
                args.iter().map(|t| term_to_type(t, vars)).collect(),
            )),
            OP_COLL => {
                let element = term_to_type(&args[1], vars);
                match &args[0] {
                    Term::Atom(kind) if kind.as_ref() == ATOM_BAG => Type::bag(element),
                    // An undecided collection kind defaults to list.
                    _ => Type::list(element),
                }
            }
            op if op.starts_with(RECORD_PREFIX) => {
                let labels = op[RECORD_PREFIX.len()..].split(':');
                Rc::new(Type::Record(
                    labels
                        .zip(args)
                        .map(|(l, t)| (l.to_owned(), term_to_type(t, vars)))
                        .collect(),
                ))
            }
            op if op.starts_with(DATA_PREFIX) => {
                let name = &op[DATA_PREFIX.len()..];
                Rc::new(Type::Data {
                    name: name.into(),
                    args: args.iter().map(|t| term_to_type(t, vars)).collect(),
                })
            }
            other => panic!("unknown operator {other} in resolved term"),
        },
    }
}
