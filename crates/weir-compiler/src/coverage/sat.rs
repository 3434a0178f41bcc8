//! A small propositional satisfiability procedure.
//!
//! The pattern coverage checker compiles match questions into formulas over
//! a few dozen variables; a plain DPLL search with unit-free simplification
//! is more than enough.

use std::collections::{BTreeSet, HashMap};

pub type VarId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    True,
    False,
    Var(VarId),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    pub fn not(f: Formula) -> Formula {
        match f {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Not(inner) => *inner,
            other => Formula::Not(Box::new(other)),
        }
    }

    pub fn and(fs: Vec<Formula>) -> Formula {
        let mut flat = Vec::new();
        for f in fs {
            match f {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Formula::True,
            1 => flat.pop().expect("len checked"),
            _ => Formula::And(flat),
        }
    }

    pub fn or(fs: Vec<Formula>) -> Formula {
        let mut flat = Vec::new();
        for f in fs {
            match f {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Formula::False,
            1 => flat.pop().expect("len checked"),
            _ => Formula::Or(flat),
        }
    }

    fn vars(&self, out: &mut BTreeSet<VarId>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Var(v) => {
                out.insert(*v);
            }
            Formula::Not(f) => f.vars(out),
            Formula::And(fs) | Formula::Or(fs) => {
                for f in fs {
                    f.vars(out);
                }
            }
        }
    }

    /// Three-valued evaluation under a partial assignment.
    fn eval(&self, assignment: &HashMap<VarId, bool>) -> Option<bool> {
        match self {
            Formula::True => Some(true),
            Formula::False => Some(false),
            Formula::Var(v) => assignment.get(v).copied(),
            Formula::Not(f) => f.eval(assignment).map(|b| !b),
            Formula::And(fs) => {
                let mut unknown = false;
                for f in fs {
                    match f.eval(assignment) {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => unknown = true,
                    }
                }
                if unknown { None } else { Some(true) }
            }
            Formula::Or(fs) => {
                let mut unknown = false;
                for f in fs {
                    match f.eval(assignment) {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => unknown = true,
                    }
                }
                if unknown { None } else { Some(false) }
            }
        }
    }
}

/// Find a satisfying assignment, if one exists. Every variable occurring in
/// the formula gets a value in the returned assignment.
pub fn satisfiable(formula: &Formula) -> Option<HashMap<VarId, bool>> {
    let mut vars = BTreeSet::new();
    formula.vars(&mut vars);
    let order: Vec<VarId> = vars.into_iter().collect();
    let mut assignment = HashMap::new();
    if search(formula, &order, 0, &mut assignment) {
        Some(assignment)
    } else {
        None
    }
}

fn search(
    formula: &Formula,
    order: &[VarId],
    depth: usize,
    assignment: &mut HashMap<VarId, bool>,
) -> bool {
    match formula.eval(assignment) {
        Some(result) => return result,
        None => {}
    }
    let var = order[depth];
    for value in [true, false] {
        assignment.insert(var, value);
        if search(formula, order, depth + 1, assignment) {
            return true;
        }
        assignment.remove(&var);
    }
    false
}
