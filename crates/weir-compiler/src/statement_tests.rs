use weir_core::ast::{AstBuilder, Decl, QueryStep};
use weir_types::TypeSystem;

use super::env::Environment;
use super::error::CompileError;
use super::statement::{
    BackendHint, CoverageLevel, Session, prepare_statement,
};
use super::{ground, infer, lower};

struct Repl {
    ts: TypeSystem,
    session: Session,
    env: Environment,
}

impl Repl {
    fn new() -> Self {
        Self {
            ts: TypeSystem::new(),
            session: Session::new(),
            env: super::builtin_env::initial_environment(),
        }
    }

    /// Prepare and evaluate one declaration, extending the environment
    /// with its bindings. Returns the printed lines.
    fn run(&mut self, decl: &Decl) -> Result<Vec<String>, CompileError> {
        let statement = prepare_statement(
            &mut self.ts,
            &self.session,
            &self.env,
            decl,
            BackendHint::Default,
        )?;
        let mut lines = Vec::new();
        let mut env = self.env.clone();
        statement.eval(
            &self.session,
            &self.env,
            &mut |line| lines.push(line),
            &mut |binding| env = env.bind(binding),
        );
        self.env = env;
        Ok(lines)
    }
}

#[test]
fn constant_binding_prints_and_binds() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let lines = repl.run(&b.val(b.id_pat("x"), b.int(42))).unwrap();
    assert_eq!(lines, vec!["val x = 42 : int"]);

    // The binding is visible to the next statement.
    let lines = repl
        .run(&b.val(b.id_pat("y"), b.apply2("+", b.id("x"), b.int(1))))
        .unwrap();
    assert_eq!(lines, vec!["val y = 43 : int"]);
}

#[test]
fn let_inlines_and_folds_to_a_constant() {
    // val it = let val c = 3 in c + 4 end
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(
        b.id_pat("it"),
        b.let_(
            vec![b.val(b.id_pat("c"), b.int(3))],
            b.apply2("+", b.id("c"), b.int(4)),
        ),
    );
    let lines = repl.run(&decl).unwrap();
    assert_eq!(lines, vec!["val it = 7 : int"]);
}

#[test]
fn recursive_length_function_runs() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let arms = vec![
        b.arm(b.list_pat(vec![]), b.int(0)),
        b.arm(
            b.cons_pat(b.wildcard(), b.id_pat("xs")),
            b.apply2("+", b.int(1), b.apply(b.id("len"), b.id("xs"))),
        ),
    ];
    let lines = repl.run(&b.val_rec("len", b.fn_(arms))).unwrap();
    assert_eq!(lines, vec!["val len = fn : forall 'a. 'a list -> int"]);

    let call = b.val(
        b.id_pat("n"),
        b.apply(b.id("len"), b.list(vec![b.int(9), b.int(8), b.int(7)])),
    );
    let lines = repl.run(&call).unwrap();
    assert_eq!(lines, vec!["val n = 3 : int"]);
}

#[test]
fn tuple_pattern_binding_destructures() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(
        b.tuple_pat(vec![b.id_pat("a"), b.id_pat("b")]),
        b.tuple(vec![b.int(1), b.string("two")]),
    );
    let lines = repl.run(&decl).unwrap();
    assert_eq!(
        lines,
        vec!["val a = 1 : int", "val b = \"two\" : string"]
    );
}

#[test]
fn query_pipeline_filters_and_projects() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(
        b.id_pat("it"),
        b.from(vec![
            QueryStep::Scan {
                pat: b.id_pat("x"),
                exp: Some(b.list(vec![b.int(1), b.int(2), b.int(3), b.int(4)])),
                condition: None,
            },
            QueryStep::Where(b.apply2("<", b.id("x"), b.int(4))),
            QueryStep::Yield(b.apply2("*", b.id("x"), b.id("x"))),
        ]),
    );
    let lines = repl.run(&decl).unwrap();
    assert_eq!(lines, vec!["val it = [1,4,9] : int list"]);
}

#[test]
fn query_orders_descending() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(
        b.id_pat("it"),
        b.from(vec![
            QueryStep::Scan {
                pat: b.id_pat("x"),
                exp: Some(b.list(vec![b.int(2), b.int(3), b.int(1)])),
                condition: None,
            },
            QueryStep::Order(vec![weir_core::ast::OrderItem {
                exp: b.id("x"),
                dir: weir_core::ast::Direction::Desc,
            }]),
        ]),
    );
    let lines = repl.run(&decl).unwrap();
    assert_eq!(lines, vec!["val it = [3,2,1] : int list"]);
}

#[test]
fn query_groups_and_aggregates() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(
        b.id_pat("it"),
        b.from(vec![
            QueryStep::Scan {
                pat: b.id_pat("x"),
                exp: Some(b.list(vec![b.int(1), b.int(2), b.int(3), b.int(4)])),
                condition: None,
            },
            QueryStep::Group {
                keys: vec![("parity".to_owned(), b.apply2("mod", b.id("x"), b.int(2)))],
                aggregates: vec![weir_core::ast::AggregateItem {
                    label: "total".to_owned(),
                    aggregate: b.id("sum"),
                    arg: Some(b.id("x")),
                }],
            },
        ]),
    );
    let lines = repl.run(&decl).unwrap();
    // Groups in first-seen order: parity 1 (1 + 3), parity 0 (2 + 4).
    assert_eq!(
        lines,
        vec!["val it = [{parity=1,total=4},{parity=0,total=6}] : {parity:int, total:int} list"]
    );
}

#[test]
fn query_computes_a_scalar() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(
        b.id_pat("it"),
        b.from(vec![
            QueryStep::Scan {
                pat: b.id_pat("x"),
                exp: Some(b.list(vec![b.int(1), b.int(2), b.int(3)])),
                condition: None,
            },
            QueryStep::Compute(vec![weir_core::ast::AggregateItem {
                label: "total".to_owned(),
                aggregate: b.id("sum"),
                arg: Some(b.id("x")),
            }]),
        ]),
    );
    let lines = repl.run(&decl).unwrap();
    assert_eq!(lines, vec!["val it = 6 : int"]);
}

fn grounding_query(b: &AstBuilder) -> weir_core::ast::Expr {
    // from (x, y) where x elem [1,2,3] andalso x = y andalso y < 3
    b.from(vec![
        QueryStep::Scan {
            pat: b.tuple_pat(vec![b.id_pat("x"), b.id_pat("y")]),
            exp: None,
            condition: None,
        },
        QueryStep::Where(b.andalso(
            b.andalso(
                b.apply2(
                    "elem",
                    b.id("x"),
                    b.list(vec![b.int(1), b.int(2), b.int(3)]),
                ),
                b.apply2("=", b.id("x"), b.id("y")),
            ),
            b.apply2("<", b.id("y"), b.int(3)),
        )),
    ])
}

#[test]
fn grounding_rewrites_to_a_bounded_query() {
    // The rewritten core: a single scan, the residual filter, and a
    // projection restoring the original row.
    let b = AstBuilder::new();
    let decl = b.val(b.id_pat("it"), grounding_query(&b));

    let mut ts = TypeSystem::new();
    let env = super::builtin_env::initial_environment();
    let resolved = infer::infer_decl(&mut ts, &env, &decl, CoverageLevel::Warn).unwrap();
    let lowered = lower::lower_decl(&mut ts, &env, &resolved.type_map, &decl);
    let grounded = ground::ground(&mut ts, &lowered.binds[0].exp).unwrap();

    insta::assert_snapshot!(
        grounded.to_string(),
        @"from x in [1,2,3] where x < 3 yield {x, y = x}"
    );
}

#[test]
fn grounded_query_evaluates() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let lines = repl.run(&b.val(b.id_pat("it"), grounding_query(&b))).unwrap();
    assert_eq!(
        lines,
        vec!["val it = [{x=1,y=1},{x=2,y=2}] : {x:int, y:int} list"]
    );

    // The bound rows, as data: records flatten to field vectors.
    let value = repl
        .env
        .get("it")
        .and_then(|binding| binding.runtime_value().cloned())
        .expect("it is bound");
    assert_eq!(serde_json::to_string(&value).unwrap(), "[[1,1],[2,2]]");
}

#[test]
fn equation_without_generator_is_ungrounded() {
    // from x where x + 1 = 2: the filter gives no finite extent for x.
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(
        b.id_pat("it"),
        b.from(vec![
            QueryStep::Scan {
                pat: b.id_pat("x"),
                exp: None,
                condition: None,
            },
            QueryStep::Where(b.apply2(
                "=",
                b.apply2("+", b.id("x"), b.int(1)),
                b.int(2),
            )),
        ]),
    );
    assert!(matches!(
        repl.run(&decl),
        Err(CompileError::UngroundedPattern { name, .. }) if name == "x"
    ));
}

#[test]
fn equality_generator_substitutes() {
    // from x where x = 2 grounds to a single-row pipeline.
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(
        b.id_pat("it"),
        b.from(vec![
            QueryStep::Scan {
                pat: b.id_pat("x"),
                exp: None,
                condition: None,
            },
            QueryStep::Where(b.apply2("=", b.id("x"), b.int(2))),
        ]),
    );
    let lines = repl.run(&decl).unwrap();
    assert_eq!(lines, vec!["val it = [2] : int list"]);
}

#[test]
fn datatype_declaration_and_match_coverage() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    repl.run(&b.datatype("t", vec![("A", None), ("B", None), ("C", None)]))
        .unwrap();

    // fn A => 1 | B => 2 is missing C: a warning by default.
    let partial = b.val(
        b.id_pat("f"),
        b.fn_(vec![
            b.arm(b.con_pat("A", None), b.int(1)),
            b.arm(b.con_pat("B", None), b.int(2)),
        ]),
    );
    let statement = prepare_statement(
        &mut repl.ts,
        &repl.session,
        &repl.env,
        &partial,
        BackendHint::Default,
    )
    .unwrap();
    let warnings = statement.warnings().messages().join("\n");
    assert!(warnings.contains("C is not matched"), "got: {warnings}");

    // With coverage errors on, the same match is rejected with witness C.
    repl.session.coverage = CoverageLevel::Error;
    assert!(matches!(
        repl.run(&partial),
        Err(CompileError::NonExhaustiveMatch { witness, .. }) if witness == "C"
    ));

    // Completing the match removes the finding.
    repl.session.coverage = CoverageLevel::Warn;
    let complete = b.val(
        b.id_pat("g"),
        b.fn_(vec![
            b.arm(b.con_pat("A", None), b.int(1)),
            b.arm(b.con_pat("B", None), b.int(2)),
            b.arm(b.con_pat("C", None), b.int(3)),
        ]),
    );
    let statement = prepare_statement(
        &mut repl.ts,
        &repl.session,
        &repl.env,
        &complete,
        BackendHint::Default,
    )
    .unwrap();
    assert!(statement.warnings().is_empty());
}

#[test]
fn constructors_evaluate_and_match() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(
        b.id_pat("it"),
        b.case(
            b.apply(b.id("SOME"), b.int(3)),
            vec![
                b.arm(
                    b.con_pat("SOME", Some(b.id_pat("v"))),
                    b.apply2("+", b.id("v"), b.int(10)),
                ),
                b.arm(b.con_pat("NONE", None), b.int(0)),
            ],
        ),
    );
    let lines = repl.run(&decl).unwrap();
    assert_eq!(lines, vec!["val it = 13 : int"]);
}

#[test]
fn runtime_errors_are_reported_as_output() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(b.id_pat("it"), b.apply2("div", b.int(1), b.int(0)));
    let lines = repl.run(&decl).unwrap();
    assert_eq!(lines, vec!["uncaught exception: division by zero"]);
}

#[test]
fn set_operations_combine_pipelines() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(
        b.id_pat("it"),
        b.from(vec![
            QueryStep::Scan {
                pat: b.id_pat("x"),
                exp: Some(b.list(vec![b.int(1), b.int(2), b.int(2)])),
                condition: None,
            },
            QueryStep::Union {
                distinct: true,
                args: vec![b.list(vec![b.int(2), b.int(3)])],
            },
        ]),
    );
    let lines = repl.run(&decl).unwrap();
    assert_eq!(lines, vec!["val it = [1,2,3] : int list"]);
}

#[test]
fn skip_take_and_distinct() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(
        b.id_pat("it"),
        b.from(vec![
            QueryStep::Scan {
                pat: b.id_pat("x"),
                exp: Some(b.list(vec![
                    b.int(1),
                    b.int(1),
                    b.int(2),
                    b.int(3),
                    b.int(4),
                ])),
                condition: None,
            },
            QueryStep::Distinct,
            QueryStep::Skip(b.int(1)),
            QueryStep::Take(b.int(2)),
        ]),
    );
    let lines = repl.run(&decl).unwrap();
    assert_eq!(lines, vec!["val it = [2,3] : int list"]);
}

#[test]
fn foreign_values_are_injected() {
    use super::statement::{ForeignValue, install_foreign, validate_expression};
    use weir_core::Value;
    use weir_types::Type;

    let b = AstBuilder::new();
    let foreign = ForeignValue {
        name: "answer".to_owned(),
        ty: Type::int(),
        value: Value::Int(42),
    };
    let resolved =
        validate_expression(&b.apply2("+", b.id("answer"), b.int(1)), &[foreign.clone()])
            .unwrap();
    assert_eq!(resolved.ty.to_string(), "int");

    // Injection respects overload headers: into a plain environment the
    // foreign lands as a Val binding.
    let env = super::builtin_env::initial_environment();
    let env = install_foreign(&env, &foreign);
    assert_eq!(
        env.get("answer").unwrap().kind,
        super::env::BindingKind::Val
    );
}

#[test]
fn bindings_mode_lists_names_without_evaluating() {
    let mut repl = Repl::new();
    let b = AstBuilder::new();
    let decl = b.val(b.id_pat("q"), b.apply2("div", b.int(1), b.int(0)));
    let statement = prepare_statement(
        &mut repl.ts,
        &repl.session,
        &repl.env,
        &decl,
        BackendHint::Default,
    )
    .unwrap();
    let mut names = Vec::new();
    statement.bindings(&mut |binding| names.push(binding.pat.name.to_string()));
    // The division never ran; the binding is still announced.
    assert_eq!(names, vec!["q".to_owned()]);
}
