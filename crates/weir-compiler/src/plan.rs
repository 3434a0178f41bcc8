//! The plan builder: core IR → executable codes.
//!
//! Expressions compile to [`weir_vm::Code`] trees. Identifier references
//! become environment lookups by (name, ordinal); applications of known
//! built-ins specialize to apply-1/2/3 codes that skip the intermediate
//! tuple; recursive bindings emit a placeholder link before their
//! right-hand side compiles and set its target afterwards.
//!
//! A `from` becomes a [`FromPlan`]: one sink step per core step plus a
//! terminal that projects the row environment into the result value. The
//! step environments recorded in the IR supply every binding list the
//! sinks need — distinct keys, projection fields, set-operation rows.

use std::rc::Rc;

use weir_core::BuiltIn;
use weir_ir::{Exp, NamedPat, Pat, Step, StepEnv};
use weir_types::Type;
use weir_vm::code::ORDINAL_BINDING;
use weir_vm::{AggSpec, Code, FromPlan, LinkCell, SinkStep, Terminal};

type VarKey = (Rc<str>, u32);

/// Compiles core expressions, tracking links for recursive bindings in
/// scope.
#[derive(Default)]
pub struct PlanBuilder {
    links: Vec<(VarKey, Rc<LinkCell>)>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a link for a recursive binding; returns it for the caller
    /// to set once the right-hand side is compiled.
    pub fn push_link(&mut self, pat: &NamedPat) -> Rc<LinkCell> {
        let link = LinkCell::new();
        self.links
            .push(((pat.name.clone(), pat.ordinal), link.clone()));
        link
    }

    pub fn pop_links(&mut self, n: usize) {
        for _ in 0..n {
            self.links.pop();
        }
    }

    pub fn compile(&mut self, exp: &Rc<Exp>) -> Rc<Code> {
        match exp.as_ref() {
            Exp::Literal { value, .. } => Rc::new(Code::Constant(value.clone())),
            Exp::Id(id) => {
                let k = (id.name.clone(), id.ordinal);
                for (link_key, link) in self.links.iter().rev() {
                    if *link_key == k {
                        return Rc::new(Code::Link(link.clone()));
                    }
                }
                Rc::new(Code::Get {
                    name: id.name.clone(),
                    ordinal: id.ordinal,
                })
            }
            Exp::Select { ty, slot, .. } => {
                // As a first-class function: a one-arm closure around the
                // field access.
                let param_ty = match ty.as_ref() {
                    Type::Fn(param, _) => param.clone(),
                    other => panic!("selector with non-function type {other} (lowering bug)"),
                };
                let param = NamedPat::new("$sel", 0, param_ty);
                let body = Rc::new(Code::Field {
                    slot: *slot,
                    arg: Rc::new(Code::Get {
                        name: param.name.clone(),
                        ordinal: 0,
                    }),
                });
                Rc::new(Code::Closure {
                    arms: Rc::new(vec![(Pat::Id(param), body)]),
                })
            }
            Exp::Tuple { args, .. } => Rc::new(Code::Tuple(
                args.iter().map(|a| self.compile(a)).collect(),
            )),
            Exp::Apply { func, arg, .. } => self.compile_apply(func, arg),
            Exp::Fn { arms, .. } => Rc::new(Code::Closure {
                arms: Rc::new(self.compile_arms(arms)),
            }),
            Exp::Case {
                scrutinee, arms, ..
            } => Rc::new(Code::Case {
                scrutinee: self.compile(scrutinee),
                arms: Rc::new(self.compile_arms(arms)),
            }),
            Exp::Let { rec, binds, body } => {
                let mut links = 0;
                if *rec {
                    // Links first, so the right-hand sides can refer to
                    // every binding of the group.
                    for bind in binds {
                        if let Pat::Id(id) = &bind.pat {
                            self.push_link(id);
                            links += 1;
                        }
                    }
                }
                let mut compiled = Vec::with_capacity(binds.len());
                for bind in binds {
                    let code = self.compile(&bind.exp);
                    if *rec {
                        if let Pat::Id(id) = &bind.pat {
                            let k = (id.name.clone(), id.ordinal);
                            let link = self
                                .links
                                .iter()
                                .rev()
                                .find(|(lk, _)| *lk == k)
                                .map(|(_, l)| l.clone())
                                .expect("link pushed above");
                            link.set(code.clone());
                        }
                    }
                    compiled.push((bind.pat.clone(), code));
                }
                let body = self.compile(body);
                self.pop_links(links);
                Rc::new(Code::Let {
                    binds: compiled,
                    body,
                })
            }
            Exp::From { steps, .. } => Rc::new(Code::From(Rc::new(self.compile_from(steps)))),
            Exp::Extent { ty, .. } => {
                panic!("extent of {ty} survived grounding (grounding bug)")
            }
        }
    }

    fn compile_arms(&mut self, arms: &[weir_ir::MatchArm]) -> Vec<(Pat, Rc<Code>)> {
        arms.iter()
            .map(|arm| (arm.pat.clone(), self.compile(&arm.exp)))
            .collect()
    }

    fn compile_apply(&mut self, func: &Rc<Exp>, arg: &Rc<Exp>) -> Rc<Code> {
        if let Exp::Select { slot, .. } = func.as_ref() {
            return Rc::new(Code::Field {
                slot: *slot,
                arg: self.compile(arg),
            });
        }
        if let Some(b) = func.as_builtin() {
            let tuple_args = match arg.as_ref() {
                Exp::Tuple { args, .. } => Some(args),
                _ => None,
            };
            match (b, tuple_args) {
                (BuiltIn::AndAlso, Some(args)) if args.len() == 2 => {
                    return Rc::new(Code::AndAlso {
                        left: self.compile(&args[0]),
                        right: self.compile(&args[1]),
                    });
                }
                (BuiltIn::OrElse, Some(args)) if args.len() == 2 => {
                    return Rc::new(Code::OrElse {
                        left: self.compile(&args[0]),
                        right: self.compile(&args[1]),
                    });
                }
                _ => {}
            }
            match (b.arity(), tuple_args) {
                (1, _) => {
                    return Rc::new(Code::ApplyBuiltin1 {
                        builtin: b,
                        arg: self.compile(arg),
                    });
                }
                (2, Some(args)) if args.len() == 2 => {
                    return Rc::new(Code::ApplyBuiltin2 {
                        builtin: b,
                        arg0: self.compile(&args[0]),
                        arg1: self.compile(&args[1]),
                    });
                }
                (3, Some(args)) if args.len() == 3 => {
                    return Rc::new(Code::ApplyBuiltin3 {
                        builtin: b,
                        arg0: self.compile(&args[0]),
                        arg1: self.compile(&args[1]),
                        arg2: self.compile(&args[2]),
                    });
                }
                _ => {}
            }
        }
        Rc::new(Code::Apply {
            func: self.compile(func),
            arg: self.compile(arg),
        })
    }

    // ── Queries ─────────────────────────────────────────────────────────

    fn compile_from(&mut self, steps: &[Step]) -> FromPlan {
        let uses_ordinal = steps
            .iter()
            .flat_map(crate::ground::step_exprs)
            .any(|e| mentions_ordinal(&e));
        let last_scan = steps
            .iter()
            .rposition(|s| matches!(s, Step::Scan { .. }));

        let mut sink_steps = Vec::with_capacity(steps.len());
        let mut scalar_project: Option<Rc<Code>> = None;
        let mut computed = false;

        for (index, step) in steps.iter().enumerate() {
            match step {
                Step::Scan {
                    pat,
                    exp,
                    condition,
                    ..
                } => {
                    if matches!(exp.as_ref(), Exp::Extent { .. }) {
                        panic!("extent scan survived grounding (grounding bug)");
                    }
                    sink_steps.push(SinkStep::Scan {
                        pat: pat.clone(),
                        code: self.compile(exp),
                        condition: self.compile(condition),
                        bind_ordinal: uses_ordinal && Some(index) == last_scan,
                    });
                }
                Step::Where { exp, .. } => {
                    sink_steps.push(SinkStep::Where {
                        condition: self.compile(exp),
                    });
                }
                Step::Skip { exp, .. } => {
                    sink_steps.push(SinkStep::Skip {
                        count: self.compile(exp),
                    });
                }
                Step::Take { exp, .. } => {
                    sink_steps.push(SinkStep::Take {
                        count: self.compile(exp),
                    });
                }
                Step::Distinct { env } => {
                    sink_steps.push(SinkStep::Distinct {
                        keys: env
                            .bindings
                            .iter()
                            .map(|b| (b.name.clone(), b.ordinal))
                            .collect(),
                    });
                }
                Step::Yield { exp, env } => {
                    if env.bindings.is_empty() {
                        // Scalar projection: becomes the terminal.
                        scalar_project = Some(self.compile(exp));
                    } else {
                        sink_steps.push(SinkStep::Yield {
                            code: self.compile(exp),
                            rebinds: env
                                .bindings
                                .iter()
                                .map(|b| (b.name.clone(), b.ordinal))
                                .collect(),
                        });
                    }
                }
                Step::Order { items, .. } => {
                    sink_steps.push(SinkStep::Order {
                        items: items
                            .iter()
                            .map(|(e, dir)| (self.compile(e), *dir))
                            .collect(),
                    });
                }
                Step::Group {
                    keys, aggregates, ..
                } => {
                    sink_steps.push(SinkStep::Group {
                        keys: keys
                            .iter()
                            .map(|(pat, e)| (pat.name.clone(), pat.ordinal, self.compile(e)))
                            .collect(),
                        aggregates: self.compile_aggregates(aggregates),
                    });
                }
                Step::Compute { aggregates, .. } => {
                    computed = true;
                    sink_steps.push(SinkStep::Compute {
                        aggregates: self.compile_aggregates(aggregates),
                    });
                }
                Step::SetOp {
                    kind,
                    distinct,
                    args,
                    env,
                } => {
                    sink_steps.push(SinkStep::SetOp {
                        kind: *kind,
                        distinct: *distinct,
                        args: args.iter().map(|a| self.compile(a)).collect(),
                        row: row_projection(env),
                        rebind: row_pattern(env),
                    });
                }
            }
        }

        let terminal = if let Some(project) = scalar_project {
            Terminal::Collect { project }
        } else {
            let env = steps
                .last()
                .map(|s| s.env().clone())
                .unwrap_or_default();
            let project = row_projection(&env);
            if computed {
                Terminal::Single { project }
            } else {
                Terminal::Collect { project }
            }
        };

        FromPlan {
            steps: sink_steps,
            terminal,
        }
    }

    fn compile_aggregates(&mut self, aggregates: &[weir_ir::Aggregate]) -> Vec<AggSpec> {
        aggregates
            .iter()
            .map(|agg| AggSpec {
                name: agg.label.name.clone(),
                ordinal: agg.label.ordinal,
                func: self.compile(&agg.func),
                arg: agg.arg.as_ref().map(|a| self.compile(a)),
            })
            .collect()
    }
}

/// The current row as a value: the single binding, or a record over the
/// bindings in canonical label order.
fn row_projection(env: &StepEnv) -> Rc<Code> {
    let mut sorted = sorted_bindings(env);
    if sorted.len() == 1 {
        let b = sorted.pop().expect("len checked");
        return Rc::new(Code::Get {
            name: b.name.clone(),
            ordinal: b.ordinal,
        });
    }
    Rc::new(Code::Tuple(
        sorted
            .iter()
            .map(|b| {
                Rc::new(Code::Get {
                    name: b.name.clone(),
                    ordinal: b.ordinal,
                })
            })
            .collect(),
    ))
}

/// A pattern rebinding a row value produced by [`row_projection`].
fn row_pattern(env: &StepEnv) -> Pat {
    let mut sorted = sorted_bindings(env);
    if sorted.len() == 1 {
        return Pat::Id(sorted.pop().expect("len checked"));
    }
    let fields: Vec<(String, Rc<Type>)> = sorted
        .iter()
        .map(|b| (b.name.to_string(), b.ty.clone()))
        .collect();
    let ty = Rc::new(Type::Record(fields));
    let args = sorted.into_iter().map(Pat::Id).collect();
    Pat::Record { ty, args }
}

fn sorted_bindings(env: &StepEnv) -> Vec<NamedPat> {
    let mut sorted: Vec<NamedPat> = env.bindings.clone();
    sorted.sort_by(|a, b| weir_core::label::compare_labels(&a.name, &b.name));
    sorted
}

fn mentions_ordinal(exp: &Rc<Exp>) -> bool {
    match exp.as_ref() {
        Exp::Id(id) => id.name.as_ref() == ORDINAL_BINDING,
        Exp::Literal { .. } | Exp::Select { .. } | Exp::Extent { .. } => false,
        Exp::Fn { arms, .. } => arms.iter().any(|a| mentions_ordinal(&a.exp)),
        Exp::Apply { func, arg, .. } => mentions_ordinal(func) || mentions_ordinal(arg),
        Exp::Let { binds, body, .. } => {
            binds.iter().any(|b| mentions_ordinal(&b.exp)) || mentions_ordinal(body)
        }
        Exp::Tuple { args, .. } => args.iter().any(mentions_ordinal),
        Exp::Case {
            scrutinee, arms, ..
        } => mentions_ordinal(scrutinee) || arms.iter().any(|a| mentions_ordinal(&a.exp)),
        Exp::From { steps, .. } => steps
            .iter()
            .flat_map(crate::ground::step_exprs)
            .any(|e| mentions_ordinal(&e)),
    }
}
