//! Pattern coverage: exhaustiveness and redundancy via propositional
//! satisfiability.
//!
//! Every path inside the matched value (root, tuple component, record
//! field, constructor argument, list head/tail) gets propositional slots:
//! datatype slots get one tag variable per constructor with exactly-one
//! axioms; booleans are the two-constructor datatype true/false; literals
//! get mutually exclusive atoms (with no at-least-one — primitive domains
//! are open); lists get CONS/NIL tags, with list patterns desugared to
//! nested cons. A pattern encodes to the conjunction of its slots, and:
//!
//! - arm `i` is *redundant* iff `enc(pᵢ) ∧ ¬enc(p₀) ∧ … ∧ ¬enc(pᵢ₋₁)` is
//!   unsatisfiable under the axioms;
//! - the list is *exhaustive* iff `¬enc(p₀) ∧ … ∧ ¬enc(pₙ)` is
//!   unsatisfiable under the axioms. A satisfying assignment, read back
//!   through the type, is a witness value no pattern matches.

mod sat;

#[cfg(test)]
mod coverage_tests;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;

use weir_core::ast::{Literal, Pat, PatKind};
use weir_types::{Primitive, Type, TypeSystem};

use sat::{Formula, VarId, satisfiable};

const TAG_CONS: &str = "::";
const TAG_NIL: &str = "[]";

/// Outcome of an exhaustiveness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exhaustiveness {
    Exhaustive,
    /// A value no pattern matches, rendered in source form.
    Missing(String),
}

pub struct Coverage<'a> {
    ts: &'a TypeSystem,
    vars: IndexMap<String, VarId>,
    /// Exactly-one / at-most-one axioms per slot, added once.
    axioms: Vec<Formula>,
    axiom_slots: IndexMap<String, ()>,
}

impl<'a> Coverage<'a> {
    pub fn new(ts: &'a TypeSystem) -> Self {
        Self {
            ts,
            vars: IndexMap::new(),
            axioms: Vec::new(),
            axiom_slots: IndexMap::new(),
        }
    }

    /// Is the pattern list exhaustive for values of `ty`?
    pub fn exhaustive(&mut self, pats: &[&Pat], ty: &Rc<Type>) -> Exhaustiveness {
        let mut clauses: Vec<Formula> = pats
            .iter()
            .map(|p| Formula::not(self.encode(p, &mut String::from("v"), ty)))
            .collect();
        clauses.extend(self.axioms.clone());
        let formula = Formula::and(clauses);
        match satisfiable(&formula) {
            None => Exhaustiveness::Exhaustive,
            Some(assignment) => {
                let mut path = String::from("v");
                Exhaustiveness::Missing(self.witness(&mut path, ty, &assignment))
            }
        }
    }

    /// Indices of arms covered entirely by the arms before them.
    pub fn redundant_arms(&mut self, pats: &[&Pat], ty: &Rc<Type>) -> Vec<usize> {
        let mut out = Vec::new();
        for i in 1..pats.len() {
            let mut clauses = vec![self.encode(pats[i], &mut String::from("v"), ty)];
            for prior in &pats[..i] {
                clauses.push(Formula::not(self.encode(prior, &mut String::from("v"), ty)));
            }
            clauses.extend(self.axioms.clone());
            if satisfiable(&Formula::and(clauses)).is_none() {
                out.push(i);
            }
        }
        out
    }

    fn var(&mut self, path: &str, tag: &str) -> VarId {
        let key = format!("{path}#{tag}");
        let next = self.vars.len() as VarId;
        *self.vars.entry(key).or_insert(next)
    }

    /// Ensure the slot's structural axioms are present.
    fn slot_axioms(&mut self, path: &str, ty: &Rc<Type>) {
        if self.axiom_slots.contains_key(path) {
            return;
        }
        self.axiom_slots.insert(path.to_owned(), ());
        let tags: Vec<String> = match self.ts.expand(ty).as_ref() {
            Type::Primitive(Primitive::Bool) => vec!["true".into(), "false".into()],
            Type::List(_) => vec![TAG_CONS.into(), TAG_NIL.into()],
            Type::Data { name, .. } => match self.ts.datatype(name) {
                Some(def) => def.constructors.iter().map(|(n, _)| n.clone()).collect(),
                None => return,
            },
            _ => return,
        };
        let vars: Vec<VarId> = tags.iter().map(|t| self.var(path, t)).collect();
        // At least one tag holds...
        self.axioms
            .push(Formula::or(vars.iter().map(|v| Formula::Var(*v)).collect()));
        // ...and no two hold together.
        for (i, a) in vars.iter().enumerate() {
            for b in &vars[i + 1..] {
                self.axioms.push(Formula::not(Formula::and(vec![
                    Formula::Var(*a),
                    Formula::Var(*b),
                ])));
            }
        }
    }

    /// Mutual exclusion between literal atoms at a slot, without an
    /// at-least-one clause: primitive domains always hold other values.
    fn literal_axioms(&mut self, path: &str) {
        let prefix = format!("{path}#lit:");
        let atoms: Vec<VarId> = self
            .vars
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, v)| *v)
            .collect();
        for (i, a) in atoms.iter().enumerate() {
            for b in &atoms[i + 1..] {
                let clause = Formula::not(Formula::and(vec![Formula::Var(*a), Formula::Var(*b)]));
                if !self.axioms.contains(&clause) {
                    self.axioms.push(clause);
                }
            }
        }
    }

    fn encode(&mut self, pat: &Pat, path: &mut String, ty: &Rc<Type>) -> Formula {
        let ty = self.ts.expand(ty);
        match &pat.kind {
            PatKind::Wildcard => Formula::True,
            PatKind::Id(name) => {
                // An identifier naming a nullary constructor is a
                // constructor pattern; anything else matches everything.
                if let Some((def, None)) = self.ts.constructor(name) {
                    if def.constructor(name).is_some() {
                        return self.encode_con(name, None, path, &ty);
                    }
                }
                Formula::True
            }
            PatKind::Literal(Literal::Bool(b)) => {
                self.slot_axioms(path, &ty);
                let tag = if *b { "true" } else { "false" };
                Formula::Var(self.var(path, tag))
            }
            PatKind::Literal(lit) => {
                let tag = format!("lit:{lit}");
                let v = self.var(path, &tag);
                self.literal_axioms(path);
                Formula::Var(v)
            }
            PatKind::Tuple(items) => {
                let components = match ty.as_ref() {
                    Type::Tuple(args) => args.clone(),
                    _ => return Formula::True,
                };
                let mut clauses = Vec::with_capacity(items.len());
                for (i, (item, item_ty)) in items.iter().zip(&components).enumerate() {
                    let mark = path.len();
                    let _ = write!(path, ".{i}");
                    clauses.push(self.encode(item, path, item_ty));
                    path.truncate(mark);
                }
                Formula::and(clauses)
            }
            PatKind::Record { fields, .. } => {
                let field_types: Vec<(String, Rc<Type>)> = match ty.as_ref() {
                    Type::Record(fs) => fs.clone(),
                    Type::Tuple(args) => args
                        .iter()
                        .enumerate()
                        .map(|(i, t)| ((i + 1).to_string(), t.clone()))
                        .collect(),
                    _ => return Formula::True,
                };
                let mut clauses = Vec::new();
                for (label, field_pat) in fields {
                    let Some((_, field_ty)) = field_types.iter().find(|(l, _)| l == label) else {
                        continue;
                    };
                    let mark = path.len();
                    let _ = write!(path, ".{label}");
                    clauses.push(self.encode(field_pat, path, field_ty));
                    path.truncate(mark);
                }
                Formula::and(clauses)
            }
            PatKind::List(items) => self.encode_list(items, path, &ty),
            PatKind::Cons(head, tail) => {
                self.slot_axioms(path, &ty);
                let cons = Formula::Var(self.var(path, TAG_CONS));
                let elem = match ty.as_ref() {
                    Type::List(e) => e.clone(),
                    _ => return cons,
                };
                let mark = path.len();
                path.push_str(".hd");
                let head_f = self.encode(head, path, &elem);
                path.truncate(mark);
                path.push_str(".tl");
                let tail_f = self.encode(tail, path, &ty);
                path.truncate(mark);
                Formula::and(vec![cons, head_f, tail_f])
            }
            PatKind::Con { name, arg } => {
                self.encode_con(name, arg.as_deref(), path, &ty)
            }
            PatKind::As { pat, .. } => self.encode(pat, path, &ty),
            PatKind::Annotated { pat, .. } => self.encode(pat, path, &ty),
        }
    }

    fn encode_list(&mut self, items: &[Pat], path: &mut String, ty: &Rc<Type>) -> Formula {
        // [p, q] is p :: q :: [].
        self.slot_axioms(path, ty);
        let Type::List(elem) = self.ts.expand(ty).as_ref().clone() else {
            return Formula::True;
        };
        match items.split_first() {
            None => Formula::Var(self.var(path, TAG_NIL)),
            Some((head, rest)) => {
                let cons = Formula::Var(self.var(path, TAG_CONS));
                let mark = path.len();
                path.push_str(".hd");
                let head_f = self.encode(head, path, &elem);
                path.truncate(mark);
                path.push_str(".tl");
                let tail_f = self.encode_list(rest, path, ty);
                path.truncate(mark);
                Formula::and(vec![cons, head_f, tail_f])
            }
        }
    }

    fn encode_con(
        &mut self,
        name: &str,
        arg: Option<&Pat>,
        path: &mut String,
        ty: &Rc<Type>,
    ) -> Formula {
        self.slot_axioms(path, ty);
        let tag = Formula::Var(self.var(path, name));
        let Some(arg_pat) = arg else {
            return tag;
        };
        let arg_ty = match self.ts.expand(ty).as_ref() {
            Type::Data { name: data_name, args } => self
                .ts
                .datatype(data_name)
                .and_then(|def| def.constructor(name).cloned().flatten())
                .map(|t| self.ts.instantiate(&t, args)),
            _ => None,
        };
        let Some(arg_ty) = arg_ty else {
            return tag;
        };
        let mark = path.len();
        let _ = write!(path, ".{name}");
        let arg_f = self.encode(arg_pat, path, &arg_ty);
        path.truncate(mark);
        Formula::and(vec![tag, arg_f])
    }

    /// Read a counterexample back out of a satisfying assignment.
    fn witness(
        &mut self,
        path: &mut String,
        ty: &Rc<Type>,
        assignment: &HashMap<VarId, bool>,
    ) -> String {
        let ty = self.ts.expand(ty);
        match ty.as_ref() {
            Type::Primitive(Primitive::Bool) => {
                if self.tag_is_true(path, "true", assignment) {
                    "true".to_owned()
                } else {
                    "false".to_owned()
                }
            }
            Type::Primitive(Primitive::Int) => self.fresh_literal(path, assignment),
            Type::Primitive(_) => self.fresh_literal(path, assignment),
            Type::List(elem) => {
                if self.tag_is_true(path, TAG_CONS, assignment) {
                    let mark = path.len();
                    path.push_str(".hd");
                    let head = self.witness(path, elem, assignment);
                    path.truncate(mark);
                    path.push_str(".tl");
                    let tail = self.witness(path, &ty, assignment);
                    path.truncate(mark);
                    format!("{head} :: {tail}")
                } else {
                    "[]".to_owned()
                }
            }
            Type::Tuple(args) => {
                let mut parts = Vec::with_capacity(args.len());
                for (i, arg_ty) in args.iter().enumerate() {
                    let mark = path.len();
                    let _ = write!(path, ".{i}");
                    parts.push(self.witness(path, arg_ty, assignment));
                    path.truncate(mark);
                }
                format!("({})", parts.join(", "))
            }
            Type::Record(fields) => {
                let mut parts = Vec::with_capacity(fields.len());
                for (label, field_ty) in fields {
                    let mark = path.len();
                    let _ = write!(path, ".{label}");
                    parts.push(format!(
                        "{label} = {}",
                        self.witness(path, field_ty, assignment)
                    ));
                    path.truncate(mark);
                }
                format!("{{{}}}", parts.join(", "))
            }
            Type::Data { name, args } => {
                let Some(def) = self.ts.datatype(name).cloned() else {
                    return "_".to_owned();
                };
                // The tag forced true by the assignment, or any tag the
                // formula never mentioned (those are unconstrained).
                let chosen = def
                    .constructors
                    .iter()
                    .find(|(tag, _)| self.tag_is_true(path, tag, assignment))
                    .or_else(|| {
                        def.constructors
                            .iter()
                            .find(|(tag, _)| !self.tag_mentioned(path, tag, assignment))
                    })
                    .or(def.constructors.first());
                match chosen {
                    None => "_".to_owned(),
                    Some((tag, None)) => tag.clone(),
                    Some((tag, Some(arg_ty))) => {
                        let instantiated = self.ts.instantiate(arg_ty, args);
                        let mark = path.len();
                        let _ = write!(path, ".{tag}");
                        let arg = self.witness(path, &instantiated, assignment);
                        path.truncate(mark);
                        format!("{tag} {arg}")
                    }
                }
            }
            _ => "_".to_owned(),
        }
    }

    fn tag_is_true(&mut self, path: &str, tag: &str, assignment: &HashMap<VarId, bool>) -> bool {
        let key = format!("{path}#{tag}");
        match self.vars.get(&key) {
            Some(v) => assignment.get(v).copied().unwrap_or(false),
            None => false,
        }
    }

    fn tag_mentioned(&mut self, path: &str, tag: &str, assignment: &HashMap<VarId, bool>) -> bool {
        let key = format!("{path}#{tag}");
        match self.vars.get(&key) {
            Some(v) => assignment.contains_key(v),
            None => false,
        }
    }

    /// A literal value at this slot different from every literal the
    /// patterns mention as true.
    fn fresh_literal(&mut self, path: &str, assignment: &HashMap<VarId, bool>) -> String {
        let prefix = format!("{path}#lit:");
        let mentioned: Vec<(String, bool)> = self
            .vars
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, v)| {
                (
                    key[prefix.len()..].to_owned(),
                    assignment.get(v).copied().unwrap_or(false),
                )
            })
            .collect();
        if let Some((value, _)) = mentioned.iter().find(|(_, set)| *set) {
            return value.clone();
        }
        // No literal forced: pick an integer outside the mentioned set, or
        // a wildcard for other primitives.
        let mut candidate: i64 = 0;
        loop {
            let rendered = candidate.to_string();
            if !mentioned.iter().any(|(v, _)| *v == rendered) {
                if mentioned.is_empty() {
                    return "_".to_owned();
                }
                return rendered;
            }
            candidate += 1;
        }
    }
}
