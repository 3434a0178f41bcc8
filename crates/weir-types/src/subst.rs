//! Substitutions: the result of successful unification.

use std::collections::HashMap;

use crate::term::{Term, TermVar};

/// A mapping from unification variables to terms.
///
/// Bindings may mention variables bound elsewhere in the map; [`resolve`]
/// chases them to a fixed point. The occurs check in the unifier guarantees
/// the chase terminates, and makes resolution idempotent:
/// `resolve(resolve(t)) == resolve(t)`.
///
/// [`resolve`]: Substitution::resolve
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    map: HashMap<u32, Term>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, var: TermVar, term: Term) {
        debug_assert!(
            !self.map.contains_key(&var.0),
            "variable {var} bound twice"
        );
        self.map.insert(var.0, term);
    }

    pub fn get(&self, var: TermVar) -> Option<&Term> {
        self.map.get(&var.0)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Follow variable bindings at the head only: the result is either a
    /// non-variable term or an unbound variable.
    pub fn walk<'a>(&'a self, term: &'a Term) -> &'a Term {
        let mut t = term;
        while let Term::Var(v) = t {
            match self.get(*v) {
                Some(next) => t = next,
                None => break,
            }
        }
        t
    }

    /// Substitute throughout, producing a term whose variables are all
    /// unbound.
    pub fn resolve(&self, term: &Term) -> Term {
        match self.walk(term) {
            Term::Var(v) => Term::Var(*v),
            Term::Atom(name) => Term::Atom(name.clone()),
            Term::App(op, args) => {
                Term::App(op.clone(), args.iter().map(|a| self.resolve(a)).collect())
            }
        }
    }
}
