use std::rc::Rc;

use weir_core::ast::AstBuilder;
use weir_types::{DataTypeDef, Type, TypeSystem};

use super::{Coverage, Exhaustiveness};

fn abc_type(ts: &mut TypeSystem) -> Rc<Type> {
    ts.register_datatype(DataTypeDef {
        name: "t".into(),
        arity: 0,
        constructors: vec![
            ("A".to_owned(), None),
            ("B".to_owned(), None),
            ("C".to_owned(), None),
        ],
    })
}

#[test]
fn missing_constructor_is_reported_with_witness() {
    let mut ts = TypeSystem::new();
    let ty = abc_type(&mut ts);
    let b = AstBuilder::new();
    let pats = [b.con_pat("A", None), b.con_pat("B", None)];
    let mut coverage = Coverage::new(&ts);
    let refs: Vec<_> = pats.iter().collect();
    assert_eq!(
        coverage.exhaustive(&refs, &ty),
        Exhaustiveness::Missing("C".to_owned())
    );
}

#[test]
fn all_constructors_are_exhaustive() {
    let mut ts = TypeSystem::new();
    let ty = abc_type(&mut ts);
    let b = AstBuilder::new();
    let pats = [
        b.con_pat("A", None),
        b.con_pat("B", None),
        b.con_pat("C", None),
    ];
    let mut coverage = Coverage::new(&ts);
    let refs: Vec<_> = pats.iter().collect();
    assert_eq!(coverage.exhaustive(&refs, &ty), Exhaustiveness::Exhaustive);
}

#[test]
fn wildcard_completes_any_match() {
    let mut ts = TypeSystem::new();
    let ty = abc_type(&mut ts);
    let b = AstBuilder::new();
    let pats = [b.con_pat("A", None), b.wildcard()];
    let mut coverage = Coverage::new(&ts);
    let refs: Vec<_> = pats.iter().collect();
    assert_eq!(coverage.exhaustive(&refs, &ty), Exhaustiveness::Exhaustive);
}

#[test]
fn booleans_are_a_two_constructor_datatype() {
    let ts = TypeSystem::new();
    let b = AstBuilder::new();
    let both = [b.bool_pat(true), b.bool_pat(false)];
    let refs: Vec<_> = both.iter().collect();
    let mut coverage = Coverage::new(&ts);
    assert_eq!(
        coverage.exhaustive(&refs, &Type::bool()),
        Exhaustiveness::Exhaustive
    );

    let only_true = [b.bool_pat(true)];
    let refs: Vec<_> = only_true.iter().collect();
    let mut coverage = Coverage::new(&ts);
    assert_eq!(
        coverage.exhaustive(&refs, &Type::bool()),
        Exhaustiveness::Missing("false".to_owned())
    );
}

#[test]
fn integer_literals_never_exhaust() {
    let ts = TypeSystem::new();
    let b = AstBuilder::new();
    let pats = [b.int_pat(0), b.int_pat(1)];
    let refs: Vec<_> = pats.iter().collect();
    let mut coverage = Coverage::new(&ts);
    match coverage.exhaustive(&refs, &Type::int()) {
        Exhaustiveness::Missing(w) => {
            assert!(w != "0" && w != "1", "witness {w} must be uncovered");
        }
        Exhaustiveness::Exhaustive => panic!("ints cannot be exhausted by literals"),
    }
}

#[test]
fn nil_and_cons_exhaust_lists() {
    let ts = TypeSystem::new();
    let b = AstBuilder::new();
    let pats = [
        b.list_pat(vec![]),
        b.cons_pat(b.wildcard(), b.id_pat("rest")),
    ];
    let refs: Vec<_> = pats.iter().collect();
    let mut coverage = Coverage::new(&ts);
    assert_eq!(
        coverage.exhaustive(&refs, &Type::list(Type::int())),
        Exhaustiveness::Exhaustive
    );
}

#[test]
fn nil_alone_misses_cons() {
    let ts = TypeSystem::new();
    let b = AstBuilder::new();
    let pats = [b.list_pat(vec![])];
    let refs: Vec<_> = pats.iter().collect();
    let mut coverage = Coverage::new(&ts);
    match coverage.exhaustive(&refs, &Type::list(Type::int())) {
        Exhaustiveness::Missing(w) => assert!(w.contains("::"), "witness {w} must be a cons"),
        Exhaustiveness::Exhaustive => panic!("[] alone is not exhaustive"),
    }
}

#[test]
fn redundant_arm_is_detected() {
    let mut ts = TypeSystem::new();
    let ty = abc_type(&mut ts);
    let b = AstBuilder::new();
    let pats = [b.wildcard(), b.con_pat("A", None)];
    let refs: Vec<_> = pats.iter().collect();
    let mut coverage = Coverage::new(&ts);
    assert_eq!(coverage.redundant_arms(&refs, &ty), vec![1]);
}

#[test]
fn duplicate_literal_arm_is_redundant() {
    let ts = TypeSystem::new();
    let b = AstBuilder::new();
    let pats = [b.int_pat(1), b.int_pat(1)];
    let refs: Vec<_> = pats.iter().collect();
    let mut coverage = Coverage::new(&ts);
    assert_eq!(coverage.redundant_arms(&refs, &Type::int()), vec![1]);
}

#[test]
fn constructor_arguments_participate() {
    let mut ts = TypeSystem::new();
    // datatype w = W of bool
    let ty = ts.register_datatype(DataTypeDef {
        name: "w".into(),
        arity: 0,
        constructors: vec![("W".to_owned(), Some(Type::bool()))],
    });
    let b = AstBuilder::new();
    let pats = [b.con_pat("W", Some(b.bool_pat(true)))];
    let refs: Vec<_> = pats.iter().collect();
    let mut coverage = Coverage::new(&ts);
    assert_eq!(
        coverage.exhaustive(&refs, &ty),
        Exhaustiveness::Missing("W false".to_owned())
    );

    let pats = [
        b.con_pat("W", Some(b.bool_pat(true))),
        b.con_pat("W", Some(b.bool_pat(false))),
    ];
    let refs: Vec<_> = pats.iter().collect();
    let mut coverage = Coverage::new(&ts);
    assert_eq!(coverage.exhaustive(&refs, &ty), Exhaustiveness::Exhaustive);
}

#[test]
fn tuple_components_are_independent_slots() {
    let ts = TypeSystem::new();
    let b = AstBuilder::new();
    let pair = Rc::new(Type::Tuple(vec![Type::bool(), Type::bool()]));
    let pats = [
        b.tuple_pat(vec![b.bool_pat(true), b.wildcard()]),
        b.tuple_pat(vec![b.wildcard(), b.bool_pat(true)]),
    ];
    let refs: Vec<_> = pats.iter().collect();
    let mut coverage = Coverage::new(&ts);
    assert_eq!(
        coverage.exhaustive(&refs, &pair),
        Exhaustiveness::Missing("(false, false)".to_owned())
    );
}
