use std::rc::Rc;

use weir_core::ast::Direction;
use weir_core::{BuiltIn, Value};
use weir_ir::{NamedPat, Pat, SetOpKind};
use weir_types::Type;

use super::code::{AggSpec, Code, FromPlan, SinkStep, Terminal};
use super::env::EvalEnv;
use super::sink::run;

fn ints(ns: &[i64]) -> Value {
    Value::list(ns.iter().map(|n| Value::Int(*n)).collect())
}

fn constant(v: Value) -> Rc<Code> {
    Rc::new(Code::Constant(v))
}

fn get(name: &str) -> Rc<Code> {
    Rc::new(Code::Get {
        name: name.into(),
        ordinal: 0,
    })
}

fn scan_x(collection: Value) -> SinkStep {
    SinkStep::Scan {
        pat: Pat::Id(NamedPat::new("x", 0, Type::int())),
        code: constant(collection),
        condition: constant(Value::Bool(true)),
        bind_ordinal: false,
    }
}

fn collect_x(steps: Vec<SinkStep>) -> FromPlan {
    FromPlan {
        steps,
        terminal: Terminal::Collect { project: get("x") },
    }
}

#[test]
fn scan_filters_and_collects() {
    let plan = collect_x(vec![
        scan_x(ints(&[1, 2, 3, 4])),
        SinkStep::Where {
            condition: Rc::new(Code::ApplyBuiltin2 {
                builtin: BuiltIn::Lt,
                arg0: get("x"),
                arg1: constant(Value::Int(3)),
            }),
        },
    ]);
    assert_eq!(run(&plan, &EvalEnv::empty()).unwrap(), ints(&[1, 2]));
}

#[test]
fn nested_scans_join() {
    // from x in [1,2], y in [10,20] yield x + y
    let plan = FromPlan {
        steps: vec![
            scan_x(ints(&[1, 2])),
            SinkStep::Scan {
                pat: Pat::Id(NamedPat::new("y", 0, Type::int())),
                code: constant(ints(&[10, 20])),
                condition: constant(Value::Bool(true)),
                bind_ordinal: false,
            },
        ],
        terminal: Terminal::Collect {
            project: Rc::new(Code::ApplyBuiltin2 {
                builtin: BuiltIn::Add,
                arg0: get("x"),
                arg1: get("y"),
            }),
        },
    };
    let result = run(&plan, &EvalEnv::empty()).unwrap();
    assert_eq!(result, ints(&[11, 21, 12, 22]));
    assert_eq!(serde_json::to_string(&result).unwrap(), "[11,21,12,22]");
}

#[test]
fn skip_and_take_window() {
    let plan = collect_x(vec![
        scan_x(ints(&[1, 2, 3, 4, 5])),
        SinkStep::Skip {
            count: constant(Value::Int(1)),
        },
        SinkStep::Take {
            count: constant(Value::Int(2)),
        },
    ]);
    assert_eq!(run(&plan, &EvalEnv::empty()).unwrap(), ints(&[2, 3]));
}

#[test]
fn distinct_removes_duplicate_rows() {
    let plan = collect_x(vec![
        scan_x(ints(&[1, 2, 1, 3, 2])),
        SinkStep::Distinct {
            keys: vec![("x".into(), 0)],
        },
    ]);
    assert_eq!(run(&plan, &EvalEnv::empty()).unwrap(), ints(&[1, 2, 3]));
}

#[test]
fn order_sorts_with_directions() {
    let plan = collect_x(vec![
        scan_x(ints(&[2, 3, 1])),
        SinkStep::Order {
            items: vec![(get("x"), Direction::Desc)],
        },
    ]);
    assert_eq!(run(&plan, &EvalEnv::empty()).unwrap(), ints(&[3, 2, 1]));
}

#[test]
fn yield_rebinds_record_fields() {
    // from x in [1,2] yield {a = x, b = x + 1} ... collect a + b
    let project_record = Rc::new(Code::Tuple(vec![
        get("x"),
        Rc::new(Code::ApplyBuiltin2 {
            builtin: BuiltIn::Add,
            arg0: get("x"),
            arg1: constant(Value::Int(1)),
        }),
    ]));
    let plan = FromPlan {
        steps: vec![
            scan_x(ints(&[1, 2])),
            SinkStep::Yield {
                code: project_record,
                rebinds: vec![("a".into(), 0), ("b".into(), 0)],
            },
        ],
        terminal: Terminal::Collect {
            project: Rc::new(Code::ApplyBuiltin2 {
                builtin: BuiltIn::Add,
                arg0: get("a"),
                arg1: get("b"),
            }),
        },
    };
    assert_eq!(run(&plan, &EvalEnv::empty()).unwrap(), ints(&[3, 5]));
}

#[test]
fn group_accumulates_per_key() {
    // from x in [1,2,3,4] group parity = x mod 2 compute total = sum of x
    let parity = Rc::new(Code::ApplyBuiltin2 {
        builtin: BuiltIn::Mod,
        arg0: get("x"),
        arg1: constant(Value::Int(2)),
    });
    let plan = FromPlan {
        steps: vec![
            scan_x(ints(&[1, 2, 3, 4])),
            SinkStep::Group {
                keys: vec![("parity".into(), 0, parity)],
                aggregates: vec![AggSpec {
                    name: "total".into(),
                    ordinal: 0,
                    func: constant(Value::Builtin(BuiltIn::Sum)),
                    arg: Some(get("x")),
                }],
            },
        ],
        terminal: Terminal::Collect {
            project: Rc::new(Code::Tuple(vec![get("parity"), get("total")])),
        },
    };
    // Groups appear in first-seen order: parity 1 (1+3), parity 0 (2+4).
    assert_eq!(
        run(&plan, &EvalEnv::empty()).unwrap(),
        Value::list(vec![
            Value::list(vec![Value::Int(1), Value::Int(4)]),
            Value::list(vec![Value::Int(0), Value::Int(6)]),
        ])
    );
}

#[test]
fn compute_produces_a_single_value() {
    let plan = FromPlan {
        steps: vec![
            scan_x(ints(&[1, 2, 3])),
            SinkStep::Compute {
                aggregates: vec![AggSpec {
                    name: "n".into(),
                    ordinal: 0,
                    func: constant(Value::Builtin(BuiltIn::Count)),
                    arg: None,
                }],
            },
        ],
        terminal: Terminal::Single { project: get("n") },
    };
    assert_eq!(run(&plan, &EvalEnv::empty()).unwrap(), Value::Int(3));
}

#[test]
fn union_and_except_and_intersect() {
    let setop = |kind, distinct, other: Value| FromPlan {
        steps: vec![
            scan_x(ints(&[1, 2, 2, 3])),
            SinkStep::SetOp {
                kind,
                distinct,
                args: vec![constant(other)],
                row: get("x"),
                rebind: Pat::Id(NamedPat::new("x", 0, Type::int())),
            },
        ],
        terminal: Terminal::Collect { project: get("x") },
    };

    assert_eq!(
        run(&setop(SetOpKind::Union, false, ints(&[3, 4])), &EvalEnv::empty()).unwrap(),
        ints(&[1, 2, 2, 3, 3, 4])
    );
    assert_eq!(
        run(&setop(SetOpKind::Union, true, ints(&[3, 4])), &EvalEnv::empty()).unwrap(),
        ints(&[1, 2, 3, 4])
    );
    assert_eq!(
        run(&setop(SetOpKind::Except, false, ints(&[2, 3])), &EvalEnv::empty()).unwrap(),
        ints(&[1, 2])
    );
    assert_eq!(
        run(&setop(SetOpKind::Intersect, false, ints(&[2, 3, 3])), &EvalEnv::empty()).unwrap(),
        ints(&[2, 3])
    );
}

#[test]
fn ordinal_binding_counts_produced_rows() {
    let plan = FromPlan {
        steps: vec![SinkStep::Scan {
            pat: Pat::Id(NamedPat::new("x", 0, Type::int())),
            code: constant(ints(&[10, 20, 30])),
            condition: constant(Value::Bool(true)),
            bind_ordinal: true,
        }],
        terminal: Terminal::Collect {
            project: Rc::new(Code::Get {
                name: super::code::ORDINAL_BINDING.into(),
                ordinal: 0,
            }),
        },
    };
    assert_eq!(run(&plan, &EvalEnv::empty()).unwrap(), ints(&[0, 1, 2]));
}

#[test]
fn take_stops_the_scan_early() {
    // x = 0 would divide by zero downstream; take 1 must stop the scan
    // before that row is produced.
    let plan = collect_x(vec![
        scan_x(ints(&[1, 0])),
        SinkStep::Take {
            count: constant(Value::Int(1)),
        },
        SinkStep::Where {
            condition: Rc::new(Code::ApplyBuiltin2 {
                builtin: BuiltIn::Eq,
                arg0: Rc::new(Code::ApplyBuiltin2 {
                    builtin: BuiltIn::Div,
                    arg0: constant(Value::Int(10)),
                    arg1: get("x"),
                }),
                arg1: constant(Value::Int(10)),
            }),
        },
    ]);
    assert_eq!(run(&plan, &EvalEnv::empty()).unwrap(), ints(&[1]));
}
