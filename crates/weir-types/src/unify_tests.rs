use weir_core::Span;

use super::term::{Term, TermVar, VarSupply};
use super::unify::{Actions, Constraint, NullTracer, TermPair, Unified, unify};

fn pair(left: Term, right: Term) -> TermPair {
    TermPair::new(left, right, Span::default())
}

fn run(pairs: Vec<TermPair>) -> Unified {
    let mut actions = Actions::new();
    unify(pairs, &mut actions, &mut [], &mut NullTracer)
}

#[test]
fn atoms_unify_with_themselves() {
    match run(vec![pair(Term::atom("int"), Term::atom("int"))]) {
        Unified::Ok(subst) => assert!(subst.is_empty()),
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn atom_clash_fails() {
    match run(vec![pair(Term::atom("int"), Term::atom("bool"))]) {
        Unified::Failure(f) => assert!(f.reason.contains("int"), "reason: {}", f.reason),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn variable_binds_through_application() {
    let mut supply = VarSupply::new();
    let a = supply.fresh();
    let b = supply.fresh();
    // fn(a, bool) = fn(int, b)  ==>  a = int, b = bool
    let left = Term::app("fn", vec![Term::Var(a), Term::atom("bool")]);
    let right = Term::app("fn", vec![Term::atom("int"), Term::Var(b)]);
    match run(vec![pair(left, right)]) {
        Unified::Ok(subst) => {
            assert_eq!(subst.resolve(&Term::Var(a)), Term::atom("int"));
            assert_eq!(subst.resolve(&Term::Var(b)), Term::atom("bool"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn occurs_check_rejects_cyclic_binding() {
    let mut supply = VarSupply::new();
    let a = supply.fresh();
    let cyclic = Term::app("list", vec![Term::Var(a)]);
    match run(vec![pair(Term::Var(a), cyclic)]) {
        Unified::Failure(f) => assert!(f.reason.contains("cyclic"), "reason: {}", f.reason),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn chained_variables_resolve() {
    let mut supply = VarSupply::new();
    let a = supply.fresh();
    let b = supply.fresh();
    let pairs = vec![
        pair(Term::Var(a), Term::Var(b)),
        pair(Term::Var(b), Term::atom("int")),
    ];
    match run(pairs) {
        Unified::Ok(subst) => {
            assert_eq!(subst.resolve(&Term::Var(a)), Term::atom("int"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn resolution_is_idempotent() {
    let mut supply = VarSupply::new();
    let a = supply.fresh();
    let b = supply.fresh();
    let c = supply.fresh();
    let pairs = vec![
        pair(Term::Var(a), Term::app("fn", vec![Term::Var(b), Term::Var(c)])),
        pair(Term::Var(b), Term::atom("int")),
        pair(Term::Var(c), Term::app("coll", vec![Term::atom("list"), Term::Var(b)])),
    ];
    match run(pairs) {
        Unified::Ok(subst) => {
            let once = subst.resolve(&Term::Var(a));
            let twice = subst.resolve(&once);
            assert_eq!(once, twice);
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn actions_fire_when_variable_is_bound() {
    let mut supply = VarSupply::new();
    let a = supply.fresh();
    let b = supply.fresh();
    let mut actions = Actions::new();
    // When `a` resolves, force `b` to the same term.
    actions.register(
        a,
        Box::new(move |term, _subst, extra| {
            extra.push(TermPair::new(Term::Var(b), term.clone(), Span::default()));
            Ok(())
        }),
    );
    let pairs = vec![pair(Term::Var(a), Term::atom("int"))];
    match unify(pairs, &mut actions, &mut [], &mut NullTracer) {
        Unified::Ok(subst) => {
            assert_eq!(subst.resolve(&Term::Var(b)), Term::atom("int"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn actions_transfer_across_variable_aliases() {
    let mut supply = VarSupply::new();
    let a = supply.fresh();
    let b = supply.fresh();
    let c = supply.fresh();
    let mut actions = Actions::new();
    actions.register(
        a,
        Box::new(move |term, _subst, extra| {
            extra.push(TermPair::new(Term::Var(c), term.clone(), Span::default()));
            Ok(())
        }),
    );
    // a = b first (alias), then b = int; the action must still fire.
    let pairs = vec![
        pair(Term::Var(a), Term::Var(b)),
        pair(Term::Var(b), Term::atom("int")),
    ];
    match unify(pairs, &mut actions, &mut [], &mut NullTracer) {
        Unified::Ok(subst) => {
            assert_eq!(subst.resolve(&Term::Var(c)), Term::atom("int"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

fn overload_constraint(f: TermVar) -> Constraint {
    // f is either int -> int or real -> real.
    Constraint::new(
        "overloaded f",
        Span::default(),
        vec![
            vec![(
                f,
                Term::app("fn", vec![Term::atom("int"), Term::atom("int")]),
            )],
            vec![(
                f,
                Term::app("fn", vec![Term::atom("real"), Term::atom("real")]),
            )],
        ],
    )
}

#[test]
fn constraint_commits_to_single_survivor() {
    let mut supply = VarSupply::new();
    let f = supply.fresh();
    let r = supply.fresh();
    let mut constraints = vec![overload_constraint(f)];
    // Applying f to an int argument rules out the real candidate.
    let pairs = vec![pair(
        Term::Var(f),
        Term::app("fn", vec![Term::atom("int"), Term::Var(r)]),
    )];
    let mut actions = Actions::new();
    match unify(pairs, &mut actions, &mut constraints, &mut NullTracer) {
        Unified::Ok(subst) => {
            assert_eq!(subst.resolve(&Term::Var(r)), Term::atom("int"));
            assert_eq!(constraints[0].committed(), Some(0));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn unresolvable_constraint_requests_retry() {
    let mut supply = VarSupply::new();
    let f = supply.fresh();
    let mut constraints = vec![overload_constraint(f)];
    let mut actions = Actions::new();
    match unify(Vec::new(), &mut actions, &mut constraints, &mut NullTracer) {
        Unified::Retry(_) => {}
        other => panic!("expected retry, got {other:?}"),
    }
}

#[test]
fn contradicted_constraint_fails() {
    let mut supply = VarSupply::new();
    let f = supply.fresh();
    let mut constraints = vec![overload_constraint(f)];
    let pairs = vec![pair(
        Term::Var(f),
        Term::app("fn", vec![Term::atom("bool"), Term::atom("bool")]),
    )];
    let mut actions = Actions::new();
    match unify(pairs, &mut actions, &mut constraints, &mut NullTracer) {
        Unified::Failure(f) => assert!(f.reason.contains("overloaded f"), "reason: {}", f.reason),
        other => panic!("expected failure, got {other:?}"),
    }
}
