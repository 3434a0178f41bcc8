use weir_core::Span;
use weir_core::ast::{AstBuilder, Decl, Expr, Pat, PatKind, QueryStep};

use crate::error::CompileError;
use crate::statement::{validate_declaration, validate_expression};

fn check(exp: &Expr) -> Result<String, CompileError> {
    validate_expression(exp, &[]).map(|r| r.ty.to_string())
}

fn ann_pat(b: &AstBuilder, name: &str, ty: &str) -> Pat {
    b.pat(
        PatKind::Annotated {
            pat: Box::new(b.id_pat(name)),
            ty: b.ty_con(ty, vec![]),
        },
        Span::default(),
    )
}

#[test]
fn literals() {
    let b = AstBuilder::new();
    assert_eq!(check(&b.int(1)).unwrap(), "int");
    assert_eq!(check(&b.real(1.5)).unwrap(), "real");
    assert_eq!(check(&b.bool(true)).unwrap(), "bool");
    assert_eq!(check(&b.string("hi")).unwrap(), "string");
    assert_eq!(check(&b.unit()).unwrap(), "unit");
}

#[test]
fn overloaded_arithmetic_dispatches_on_operands() {
    let b = AstBuilder::new();
    assert_eq!(check(&b.apply2("+", b.int(1), b.int(2))).unwrap(), "int");
    assert_eq!(
        check(&b.apply2("+", b.real(1.0), b.real(2.0))).unwrap(),
        "real"
    );
    assert!(matches!(
        check(&b.apply2("+", b.int(1), b.real(2.0))),
        Err(CompileError::TypeError { .. })
    ));
}

#[test]
fn unconstrained_arithmetic_prefers_int() {
    // fn x => x + x: nothing forces int or real; the retry preference
    // lands on the integer candidate.
    let b = AstBuilder::new();
    let double = b.fn_(vec![b.arm(
        b.id_pat("x"),
        b.apply2("+", b.id("x"), b.id("x")),
    )]);
    assert_eq!(check(&double).unwrap(), "int -> int");
}

#[test]
fn tuples_records_and_lists() {
    let b = AstBuilder::new();
    assert_eq!(
        check(&b.tuple(vec![b.int(1), b.bool(true)])).unwrap(),
        "int * bool"
    );
    assert_eq!(
        check(&b.record(vec![("b", b.real(1.0)), ("a", b.int(1))])).unwrap(),
        "{a:int, b:real}"
    );
    assert_eq!(
        check(&b.list(vec![b.int(1), b.int(2)])).unwrap(),
        "int list"
    );
    assert!(matches!(
        check(&b.list(vec![b.int(1), b.bool(true)])),
        Err(CompileError::TypeError { .. })
    ));
}

#[test]
fn if_requires_bool_and_equal_branches() {
    let b = AstBuilder::new();
    assert_eq!(
        check(&b.if_(b.bool(true), b.int(1), b.int(2))).unwrap(),
        "int"
    );
    assert!(matches!(
        check(&b.if_(b.int(1), b.int(1), b.int(2))),
        Err(CompileError::TypeError { .. })
    ));
    assert!(matches!(
        check(&b.if_(b.bool(true), b.int(1), b.string("x"))),
        Err(CompileError::TypeError { .. })
    ));
}

#[test]
fn unbound_identifier() {
    let b = AstBuilder::new();
    assert!(matches!(
        check(&b.id("nope")),
        Err(CompileError::UnboundIdentifier { name, .. }) if name == "nope"
    ));
}

#[test]
fn length_function_infers_polymorphic_type() {
    // fun len [] = 0 | len (_ :: xs) = 1 + len xs
    let b = AstBuilder::new();
    let arms = vec![
        b.arm(b.list_pat(vec![]), b.int(0)),
        b.arm(
            b.cons_pat(b.wildcard(), b.id_pat("xs")),
            b.apply2("+", b.int(1), b.apply(b.id("len"), b.id("xs"))),
        ),
    ];
    let decl = b.val_rec("len", b.fn_(arms));
    let resolved = validate_declaration(&decl).expect("len type-checks");
    assert_eq!(resolved.ty.to_string(), "forall 'a. 'a list -> int");
    assert_eq!(resolved.bindings.len(), 1);
    assert_eq!(resolved.bindings[0].0, "len");
}

fn overload_decls(b: &AstBuilder) -> Vec<Decl> {
    let int_impl = b.fn_(vec![b.arm(
        b.tuple_pat(vec![ann_pat(b, "x", "int"), ann_pat(b, "y", "int")]),
        b.apply2("+", b.id("x"), b.id("y")),
    )]);
    let real_impl = b.fn_(vec![b.arm(
        b.tuple_pat(vec![ann_pat(b, "x", "real"), ann_pat(b, "y", "real")]),
        b.apply2("+", b.id("x"), b.id("y")),
    )]);
    vec![
        b.over("plus"),
        b.val_inst("plus", int_impl),
        b.val_inst("plus", real_impl),
    ]
}

#[test]
fn overload_resolution_picks_the_matching_instance() {
    let b = AstBuilder::new();
    let int_use = b.let_(
        overload_decls(&b),
        b.apply(b.id("plus"), b.tuple(vec![b.int(1), b.int(2)])),
    );
    assert_eq!(check(&int_use).unwrap(), "int");

    let b = AstBuilder::new();
    let real_use = b.let_(
        overload_decls(&b),
        b.apply(b.id("plus"), b.tuple(vec![b.real(1.0), b.real(2.0)])),
    );
    assert_eq!(check(&real_use).unwrap(), "real");
}

#[test]
fn unapplied_overload_is_ambiguous() {
    let b = AstBuilder::new();
    let bare = b.let_(overload_decls(&b), b.id("plus"));
    match check(&bare) {
        Err(CompileError::TypeError { reason, .. }) => {
            assert!(reason.contains("ambiguous"), "reason: {reason}");
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[test]
fn instance_without_over_is_rejected() {
    let b = AstBuilder::new();
    let exp = b.let_(
        vec![b.val_inst("lonely", b.fn_(vec![b.arm(b.id_pat("x"), b.id("x"))]))],
        b.int(0),
    );
    assert!(matches!(check(&exp), Err(CompileError::TypeError { .. })));
}

#[test]
fn record_selector_resolves_field() {
    let b = AstBuilder::new();
    let exp = b.apply(
        b.selector("a"),
        b.record(vec![("a", b.int(1)), ("b", b.bool(true))]),
    );
    assert_eq!(check(&exp).unwrap(), "int");

    // Numeric selectors address tuple slots.
    let b = AstBuilder::new();
    let exp = b.apply(b.selector("2"), b.tuple(vec![b.int(1), b.bool(true)]));
    assert_eq!(check(&exp).unwrap(), "bool");
}

#[test]
fn selector_on_missing_field_is_no_field() {
    let b = AstBuilder::new();
    let exp = b.apply(b.selector("c"), b.record(vec![("a", b.int(1))]));
    assert!(matches!(
        check(&exp),
        Err(CompileError::NoField { field, .. }) if field == "c"
    ));
}

#[test]
fn unresolvable_selector_argument_is_flex_record() {
    // fn r => #a r: nothing ever says what record type r has.
    let b = AstBuilder::new();
    let exp = b.fn_(vec![b.arm(
        b.id_pat("r"),
        b.apply(b.selector("a"), b.id("r")),
    )]);
    assert!(matches!(
        check(&exp),
        Err(CompileError::FlexRecord { field, .. }) if field == "a"
    ));
}

#[test]
fn case_and_fn_unify_arms() {
    let b = AstBuilder::new();
    let exp = b.case(
        b.int(1),
        vec![
            b.arm(b.int_pat(0), b.string("zero")),
            b.arm(b.wildcard(), b.string("other")),
        ],
    );
    assert_eq!(check(&exp).unwrap(), "string");

    let b = AstBuilder::new();
    let exp = b.fn_(vec![b.arm(b.id_pat("x"), b.apply2("+", b.id("x"), b.int(1)))]);
    assert_eq!(check(&exp).unwrap(), "int -> int");
}

#[test]
fn let_bindings_scope_and_shadow() {
    let b = AstBuilder::new();
    let exp = b.let_(
        vec![
            b.val(b.id_pat("x"), b.int(1)),
            b.val(b.id_pat("x"), b.string("s")),
        ],
        b.id("x"),
    );
    assert_eq!(check(&exp).unwrap(), "string");
}

#[test]
fn constructors_type_check() {
    let b = AstBuilder::new();
    // SOME 3 : int option
    let exp = b.apply(b.id("SOME"), b.int(3));
    assert_eq!(check(&exp).unwrap(), "int option");

    // case SOME 3 of SOME v => v + 1 | NONE => 0
    let b = AstBuilder::new();
    let exp = b.case(
        b.apply(b.id("SOME"), b.int(3)),
        vec![
            b.arm(
                b.con_pat("SOME", Some(b.id_pat("v"))),
                b.apply2("+", b.id("v"), b.int(1)),
            ),
            b.arm(b.con_pat("NONE", None), b.int(0)),
        ],
    );
    assert_eq!(check(&exp).unwrap(), "int");
}

#[test]
fn queries_over_lists_stay_lists() {
    let b = AstBuilder::new();
    let exp = b.from(vec![
        QueryStep::Scan {
            pat: b.id_pat("x"),
            exp: Some(b.list(vec![b.int(1), b.int(2), b.int(3)])),
            condition: None,
        },
        QueryStep::Where(b.apply2("<", b.id("x"), b.int(3))),
        QueryStep::Yield(b.apply2("+", b.id("x"), b.int(10))),
    ]);
    assert_eq!(check(&exp).unwrap(), "int list");
}

#[test]
fn query_row_of_two_bindings_is_a_record() {
    let b = AstBuilder::new();
    let exp = b.from(vec![
        QueryStep::Scan {
            pat: b.id_pat("x"),
            exp: Some(b.list(vec![b.int(1)])),
            condition: None,
        },
        QueryStep::Scan {
            pat: b.id_pat("y"),
            exp: Some(b.list(vec![b.string("a")])),
            condition: None,
        },
    ]);
    assert_eq!(check(&exp).unwrap(), "{x:int, y:string} list");
}

#[test]
fn where_must_be_boolean() {
    let b = AstBuilder::new();
    let exp = b.from(vec![
        QueryStep::Scan {
            pat: b.id_pat("x"),
            exp: Some(b.list(vec![b.int(1)])),
            condition: None,
        },
        QueryStep::Where(b.int(1)),
    ]);
    assert!(matches!(check(&exp), Err(CompileError::TypeError { .. })));
}

#[test]
fn group_labels_must_be_unique() {
    let b = AstBuilder::new();
    let exp = b.from(vec![
        QueryStep::Scan {
            pat: b.id_pat("x"),
            exp: Some(b.list(vec![b.int(1)])),
            condition: None,
        },
        QueryStep::Group {
            keys: vec![("k".to_owned(), b.id("x"))],
            aggregates: vec![weir_core::ast::AggregateItem {
                label: "k".to_owned(),
                aggregate: b.id("count"),
                arg: None,
            }],
        },
    ]);
    assert!(matches!(
        check(&exp),
        Err(CompileError::DuplicateFieldInGroup { label, .. }) if label == "k"
    ));
}

#[test]
fn compute_produces_a_scalar() {
    let b = AstBuilder::new();
    let exp = b.from(vec![
        QueryStep::Scan {
            pat: b.id_pat("x"),
            exp: Some(b.list(vec![b.int(1), b.int(2)])),
            condition: None,
        },
        QueryStep::Compute(vec![weir_core::ast::AggregateItem {
            label: "total".to_owned(),
            aggregate: b.id("sum"),
            arg: Some(b.id("x")),
        }]),
    ]);
    assert_eq!(check(&exp).unwrap(), "int");
}

#[test]
fn non_exhaustive_match_warns_by_default() {
    let b = AstBuilder::new();
    let exp = b.case(b.bool(true), vec![b.arm(b.bool_pat(true), b.int(1))]);
    let resolved = validate_expression(&exp, &[]).expect("warns, not errors");
    assert!(resolved.warnings.has_warnings());
    let rendered = resolved.warnings.messages().join("\n");
    assert!(rendered.contains("false"), "witness in: {rendered}");
}

#[test]
fn annotations_constrain_inference() {
    let b = AstBuilder::new();
    let exp = b.expr(
        weir_core::ast::ExprKind::Annotated {
            exp: Box::new(b.list(vec![])),
            ty: b.ty_con("list", vec![b.ty_con("int", vec![])]),
        },
        Span::default(),
    );
    assert_eq!(check(&exp).unwrap(), "int list");
}

#[test]
fn type_variable_annotations_stay_polymorphic() {
    // [] : 'a list
    let b = AstBuilder::new();
    let exp = b.expr(
        weir_core::ast::ExprKind::Annotated {
            exp: Box::new(b.list(vec![])),
            ty: b.ty_con("list", vec![b.ty_var("a")]),
        },
        Span::default(),
    );
    let resolved = validate_expression(&exp, &[]).expect("annotation type-checks");
    assert_eq!(resolved.ty.to_string(), "forall 'a. 'a list");
}

#[test]
fn polymorphic_identity_generalizes() {
    let b = AstBuilder::new();
    let decl = b.val(
        b.id_pat("id"),
        b.fn_(vec![b.arm(b.id_pat("x"), b.id("x"))]),
    );
    let resolved = validate_declaration(&decl).expect("id type-checks");
    assert_eq!(resolved.ty.to_string(), "forall 'a. 'a -> 'a");
}
