//! Martelli–Montanari first-order unification.
//!
//! Beyond the textbook algorithm there are two extension points:
//!
//! - **Actions**: callbacks registered against a variable, fired once when
//!   that variable is bound to a non-variable term. An action may extend the
//!   equation list. The inferencer uses these for record-selector expansion
//!   and flex-record patterns. If a variable is bound to another variable,
//!   its actions transfer to the representative.
//! - **Constraints**: disjunctive restrictions over tuples of variables,
//!   used for overload resolution. A constraint is rechecked whenever one of
//!   its subject variables is bound; once exactly one disjunct remains
//!   consistent with the substitution, the constraint commits to it and its
//!   bindings join the equation queue. Zero surviving disjuncts is a
//!   failure. Constraints still uncommitted when the queue quiesces yield
//!   [`Unified::Retry`]: the caller may refine its equations and rerun.
//!
//! Equation ordering is stable: pairs are processed in the order added, and
//! actions run before further equations are popped. The occurs check is
//! mandatory; a cyclic binding is a failure, which also makes substitutions
//! idempotent.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use weir_core::Span;

use crate::subst::Substitution;
use crate::term::{Term, TermVar};

/// One equation between two terms, tagged with the source span it arose
/// from.
#[derive(Debug, Clone)]
pub struct TermPair {
    pub left: Term,
    pub right: Term,
    pub span: Span,
}

impl TermPair {
    pub fn new(left: Term, right: Term, span: Span) -> Self {
        Self { left, right, span }
    }
}

/// Why unification failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct UnifyFailure {
    pub reason: String,
    /// The offending terms, when the failure is a clash between two.
    pub terms: Option<(Term, Term)>,
    pub span: Span,
}

impl UnifyFailure {
    pub fn new(reason: impl Into<String>, span: Span) -> Self {
        Self {
            reason: reason.into(),
            terms: None,
            span,
        }
    }
}

/// Outcome of a unification run.
#[derive(Debug)]
pub enum Unified {
    Ok(Substitution),
    Failure(UnifyFailure),
    /// The equations were consistent but some constraint could not commit.
    /// Carries the substitution so far; the caller should extend the
    /// equations (overload preferences, refined candidates) and rerun.
    Retry(Substitution),
}

/// Observer for unification progress. The default implementation ignores
/// everything; [`LogTracer`] forwards to `tracing`.
pub trait Tracer {
    fn on_bind(&mut self, _var: TermVar, _term: &Term) {}
    fn on_conflict(&mut self, _left: &Term, _right: &Term) {}
    fn on_commit(&mut self, _constraint: &str, _disjunct: usize) {}
}

/// The do-nothing tracer.
#[derive(Debug, Default)]
pub struct NullTracer;

impl Tracer for NullTracer {}

/// Tracer that emits `tracing` events at trace level.
#[derive(Debug, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn on_bind(&mut self, var: TermVar, term: &Term) {
        tracing::trace!(%var, %term, "bind");
    }

    fn on_conflict(&mut self, left: &Term, right: &Term) {
        tracing::trace!(%left, %right, "conflict");
    }

    fn on_commit(&mut self, constraint: &str, disjunct: usize) {
        tracing::trace!(constraint, disjunct, "constraint committed");
    }
}

/// Callback fired when a variable is bound: receives the bound term, the
/// substitution so far, and a list to extend with new equations.
pub type Action =
    Box<dyn FnMut(&Term, &Substitution, &mut Vec<TermPair>) -> Result<(), UnifyFailure>>;

/// Registry of per-variable actions.
#[derive(Default)]
pub struct Actions {
    map: HashMap<u32, Vec<Action>>,
}

impl Actions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, var: TermVar, action: Action) {
        self.map.entry(var.0).or_default().push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Variables whose actions never fired (still unresolved).
    pub fn pending_vars(&self) -> impl Iterator<Item = TermVar> + '_ {
        self.map.keys().map(|v| TermVar(*v))
    }

    fn take(&mut self, var: TermVar) -> Vec<Action> {
        self.map.remove(&var.0).unwrap_or_default()
    }

    fn transfer(&mut self, from: TermVar, to: TermVar) {
        let moved = self.take(from);
        if !moved.is_empty() {
            self.map.entry(to.0).or_default().extend(moved);
        }
    }
}

impl fmt::Debug for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actions")
            .field("vars", &self.map.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A disjunctive restriction over unifier variables. Each disjunct is a
/// conjunction of variable↦term bindings; the constraint is satisfied by
/// committing to whichever disjunct remains consistent.
#[derive(Debug)]
pub struct Constraint {
    pub description: String,
    pub span: Span,
    subjects: Vec<TermVar>,
    disjuncts: Vec<Vec<(TermVar, Term)>>,
    committed: Option<usize>,
}

impl Constraint {
    pub fn new(
        description: impl Into<String>,
        span: Span,
        disjuncts: Vec<Vec<(TermVar, Term)>>,
    ) -> Self {
        let mut subjects = Vec::new();
        for disjunct in &disjuncts {
            for (var, _) in disjunct {
                if !subjects.contains(var) {
                    subjects.push(*var);
                }
            }
        }
        Self {
            description: description.into(),
            span,
            subjects,
            disjuncts,
            committed: None,
        }
    }

    pub fn committed(&self) -> Option<usize> {
        self.committed
    }

    pub fn disjunct(&self, index: usize) -> &[(TermVar, Term)] {
        &self.disjuncts[index]
    }

    /// Indices of disjuncts still consistent with the substitution.
    pub fn surviving(&self, subst: &Substitution) -> Vec<usize> {
        self.disjuncts
            .iter()
            .enumerate()
            .filter(|(_, pairs)| trial(subst, pairs))
            .map(|(i, _)| i)
            .collect()
    }

    fn involves(&self, var: TermVar) -> bool {
        self.subjects.contains(&var)
    }
}

/// Would binding every `(var, term)` pair succeed against `subst`? Runs a
/// throwaway unification with no actions or constraints.
fn trial(subst: &Substitution, pairs: &[(TermVar, Term)]) -> bool {
    let mut s = subst.clone();
    let mut queue: VecDeque<(Term, Term)> = pairs
        .iter()
        .map(|(v, t)| (Term::Var(*v), t.clone()))
        .collect();
    while let Some((left, right)) = queue.pop_front() {
        let left = s.walk(&left).clone();
        let right = s.walk(&right).clone();
        match (left, right) {
            (Term::Var(a), Term::Var(b)) if a == b => {}
            (Term::Var(a), t) | (t, Term::Var(a)) => {
                let t = s.resolve(&t);
                if t.contains(a) {
                    return false;
                }
                s.bind(a, t);
            }
            (Term::Atom(x), Term::Atom(y)) => {
                if x != y {
                    return false;
                }
            }
            (Term::App(op1, args1), Term::App(op2, args2)) => {
                if op1 != op2 || args1.len() != args2.len() {
                    return false;
                }
                queue.extend(args1.into_iter().zip(args2));
            }
            _ => return false,
        }
    }
    true
}

/// Unify the equations, firing actions and committing constraints along the
/// way.
pub fn unify(
    pairs: Vec<TermPair>,
    actions: &mut Actions,
    constraints: &mut [Constraint],
    tracer: &mut dyn Tracer,
) -> Unified {
    let mut subst = Substitution::new();
    let mut queue: VecDeque<TermPair> = pairs.into();

    loop {
        while let Some(pair) = queue.pop_front() {
            if let Err(failure) = step(pair, &mut subst, actions, constraints, &mut queue, tracer)
            {
                return Unified::Failure(failure);
            }
        }

        // Quiescent: sweep constraints for commits the last bindings enabled.
        let mut progress = false;
        for c in constraints.iter_mut() {
            match try_commit(c, &subst, &mut queue, tracer) {
                Ok(committed) => progress |= committed,
                Err(failure) => return Unified::Failure(failure),
            }
        }
        if !progress {
            break;
        }
    }

    if constraints.iter().any(|c| c.committed.is_none()) {
        return Unified::Retry(subst);
    }
    Unified::Ok(subst)
}

fn step(
    pair: TermPair,
    subst: &mut Substitution,
    actions: &mut Actions,
    constraints: &mut [Constraint],
    queue: &mut VecDeque<TermPair>,
    tracer: &mut dyn Tracer,
) -> Result<(), UnifyFailure> {
    let span = pair.span;
    let left = subst.walk(&pair.left).clone();
    let right = subst.walk(&pair.right).clone();
    match (left, right) {
        (Term::Var(a), Term::Var(b)) if a == b => Ok(()),
        (Term::Var(a), t) | (t, Term::Var(a)) => {
            bind(a, t, span, subst, actions, constraints, queue, tracer)
        }
        (Term::Atom(x), Term::Atom(y)) => {
            if x == y {
                Ok(())
            } else {
                conflict(Term::Atom(x), Term::Atom(y), span, tracer)
            }
        }
        (Term::App(op1, args1), Term::App(op2, args2)) => {
            if op1 == op2 && args1.len() == args2.len() {
                for (l, r) in args1.into_iter().zip(args2) {
                    queue.push_back(TermPair::new(l, r, span));
                }
                Ok(())
            } else {
                conflict(Term::App(op1, args1), Term::App(op2, args2), span, tracer)
            }
        }
        (l, r) => conflict(l, r, span, tracer),
    }
}

#[allow(clippy::too_many_arguments)]
fn bind(
    var: TermVar,
    term: Term,
    span: Span,
    subst: &mut Substitution,
    actions: &mut Actions,
    constraints: &mut [Constraint],
    queue: &mut VecDeque<TermPair>,
    tracer: &mut dyn Tracer,
) -> Result<(), UnifyFailure> {
    let resolved = subst.resolve(&term);
    if resolved.contains(var) {
        return Err(UnifyFailure {
            reason: format!("cyclic type: {var} occurs in {resolved}"),
            terms: None,
            span,
        });
    }
    subst.bind(var, resolved.clone());
    tracer.on_bind(var, &resolved);

    match &resolved {
        Term::Var(b) => actions.transfer(var, *b),
        _ => {
            let mut fired = actions.take(var);
            let mut extra = Vec::new();
            for action in &mut fired {
                action(&resolved, subst, &mut extra)?;
            }
            for pair in extra {
                queue.push_back(pair);
            }
        }
    }

    for c in constraints.iter_mut() {
        if c.involves(var) {
            try_commit(c, subst, queue, tracer)?;
        }
    }
    Ok(())
}

/// Commit `c` if exactly one disjunct survives; fail if none does. Returns
/// whether a commit happened.
fn try_commit(
    c: &mut Constraint,
    subst: &Substitution,
    queue: &mut VecDeque<TermPair>,
    tracer: &mut dyn Tracer,
) -> Result<bool, UnifyFailure> {
    if c.committed.is_some() {
        return Ok(false);
    }
    let surviving = c.surviving(subst);
    match surviving.len() {
        0 => Err(UnifyFailure {
            reason: format!("no candidate matches {}", c.description),
            terms: None,
            span: c.span,
        }),
        1 => {
            let index = surviving[0];
            c.committed = Some(index);
            tracer.on_commit(&c.description, index);
            for (v, t) in &c.disjuncts[index] {
                queue.push_back(TermPair::new(Term::Var(*v), t.clone(), c.span));
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn conflict(
    left: Term,
    right: Term,
    span: Span,
    tracer: &mut dyn Tracer,
) -> Result<(), UnifyFailure> {
    tracer.on_conflict(&left, &right);
    Err(UnifyFailure {
        reason: format!("cannot unify {left} with {right}"),
        terms: Some((left, right)),
        span,
    })
}
