//! Compiled statements and the compiler entry points.
//!
//! [`prepare_statement`] runs the full pipeline — inference, lowering,
//! grounding, inline/simplify to a fixed point, plan building — and
//! returns a [`CompiledStatement`] whose actions, applied in source order,
//! evaluate each binding, print it, and emit the new environment entries.
//! [`validate_expression`] stops after inference, for tests and type-only
//! tooling.
//!
//! Session state travels as an explicit parameter everywhere; nothing in
//! the pipeline reads process globals.

use std::rc::Rc;

use weir_core::ast::{Decl, Expr};
use weir_core::{RuntimeError, Value};
use weir_ir::{Exp, NamedPat, Pat};
use weir_types::{Type, TypeSystem};
use weir_vm::pretty::print_binding;
use weir_vm::{Code, EvalEnv, PrettyConfig};

use crate::diagnostics::Diagnostics;
use crate::env::{Binding, BindingKind, BoundValue, Environment};
use crate::error::CompileResult;
use crate::infer::{self, Resolved};
use crate::plan::PlanBuilder;
use crate::{ground, inline, lower};

/// How pattern-match coverage findings surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverageLevel {
    Ignore,
    #[default]
    Warn,
    Error,
}

/// Which execution path a prepared statement targets. The relational
/// backend is an external collaborator; until one is wired in, the hint
/// routes to the default evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendHint {
    #[default]
    Default,
    Relational,
}

/// Per-session configuration, passed explicitly into every entry point.
#[derive(Debug, Clone)]
pub struct Session {
    pub pretty: PrettyConfig,
    pub coverage: CoverageLevel,
    pub inline_passes: usize,
}

impl Session {
    pub fn new() -> Self {
        Self {
            pretty: PrettyConfig::default(),
            coverage: CoverageLevel::default(),
            inline_passes: 5,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// A host value injected into the initial environment: an `Inst` binding
/// when its name is declared overloaded, a plain `Val` otherwise.
#[derive(Debug, Clone)]
pub struct ForeignValue {
    pub name: String,
    pub ty: Rc<Type>,
    pub value: Value,
}

/// Add a foreign value to an environment.
pub fn install_foreign(env: &Environment, foreign: &ForeignValue) -> Environment {
    let pat = NamedPat::new(foreign.name.as_str(), 0, foreign.ty.clone());
    let binding = match env.get(&foreign.name) {
        Some(existing) if existing.kind == BindingKind::Over => {
            Binding::inst(pat, foreign.value.clone())
        }
        _ => Binding::val(pat, foreign.value.clone()),
    };
    env.bind(binding)
}

/// One evaluation action: evaluate a binding's right-hand side, print it,
/// and emit the new environment entries.
#[derive(Debug)]
struct Action {
    pat: Pat,
    code: Rc<Code>,
    /// The optimized core, carried so later statements can inline it.
    core: Rc<Exp>,
    kind: BindingKind,
    /// Generalized types per bound name.
    types: Vec<(String, Rc<Type>)>,
}

/// The compiled form of one declaration.
#[derive(Debug)]
pub struct CompiledStatement {
    ty: Rc<Type>,
    warnings: Diagnostics,
    actions: Vec<Action>,
    /// Bindings a declaration introduces without evaluation (overload
    /// headers, datatype constructors).
    decl_bindings: Vec<Binding>,
}

impl CompiledStatement {
    /// The declared top-level type.
    pub fn ty(&self) -> &Rc<Type> {
        &self.ty
    }

    pub fn warnings(&self) -> &Diagnostics {
        &self.warnings
    }

    /// Produce the would-be bindings without evaluating anything, for the
    /// type-only mode. Values carry the compiled core expression.
    pub fn bindings(&self, out: &mut impl FnMut(Binding)) {
        for binding in &self.decl_bindings {
            out(binding.clone());
        }
        for action in &self.actions {
            let mut named = Vec::new();
            action.pat.bindings(&mut named);
            for pat in named {
                let ty = action
                    .types
                    .iter()
                    .find(|(n, _)| n.as_str() == pat.name.as_ref())
                    .map(|(_, t)| t.clone())
                    .unwrap_or_else(|| pat.ty.clone());
                out(Binding {
                    pat: NamedPat::new(pat.name.clone(), pat.ordinal, ty),
                    value: Some(BoundValue::Core(action.core.clone())),
                    kind: action.kind,
                });
            }
        }
    }

    /// Execute. Output lines and new bindings arrive in source order;
    /// runtime errors are formatted onto the output and end the
    /// statement.
    pub fn eval(
        &self,
        session: &Session,
        env: &Environment,
        on_line: &mut impl FnMut(String),
        on_binding: &mut impl FnMut(Binding),
    ) {
        for binding in &self.decl_bindings {
            on_binding(binding.clone());
        }

        let mut eval_env = eval_environment(env);
        for action in &self.actions {
            match self.apply_action(action, session, &eval_env, on_line, on_binding) {
                Ok(extended) => eval_env = extended,
                Err(error) => {
                    on_line(format!("uncaught exception: {error}"));
                    return;
                }
            }
        }
    }

    fn apply_action(
        &self,
        action: &Action,
        session: &Session,
        eval_env: &EvalEnv,
        on_line: &mut impl FnMut(String),
        on_binding: &mut impl FnMut(Binding),
    ) -> Result<EvalEnv, RuntimeError> {
        let value = action.code.eval(eval_env)?;
        let scope =
            weir_vm::code::bind_pat(&action.pat, &value, eval_env).ok_or_else(|| {
                RuntimeError::BindFailure {
                    pattern: action.pat.to_string(),
                }
            })?;
        let mut named = Vec::new();
        action.pat.bindings(&mut named);
        for pat in &named {
            let bound = scope
                .get(&pat.name, pat.ordinal)
                .expect("pattern bound above")
                .clone();
            let ty = action
                .types
                .iter()
                .find(|(n, _)| n.as_str() == pat.name.as_ref())
                .map(|(_, t)| t.clone())
                .unwrap_or_else(|| pat.ty.clone());
            for line in print_binding(&pat.name, &bound, &ty, &session.pretty) {
                on_line(line);
            }
            on_binding(Binding {
                pat: NamedPat::new(pat.name.clone(), pat.ordinal, ty),
                value: Some(BoundValue::Runtime(bound)),
                kind: action.kind,
            });
        }
        Ok(scope)
    }
}

/// Snapshot a compile-time environment's runtime values for evaluation.
fn eval_environment(env: &Environment) -> EvalEnv {
    let bindings: Vec<&Binding> = env.iter().collect();
    let mut out = EvalEnv::empty();
    // Oldest first, so the most recent shadows.
    for binding in bindings.into_iter().rev() {
        if let Some(value) = binding.runtime_value() {
            out = out.bind(
                binding.pat.name.clone(),
                binding.pat.ordinal,
                value.clone(),
            );
        }
    }
    out
}

/// Type-check an expression against the initial environment plus foreign
/// values; no code is emitted.
pub fn validate_expression(
    exp: &Expr,
    foreigns: &[ForeignValue],
) -> CompileResult<Resolved> {
    let mut ts = TypeSystem::new();
    let mut env = crate::builtin_env::initial_environment();
    for foreign in foreigns {
        env = install_foreign(&env, foreign);
    }
    infer::infer_expr(&mut ts, &env, exp, CoverageLevel::Warn)
}

/// The full pipeline: inference, lowering, grounding, optimization, plan.
pub fn prepare_statement(
    ts: &mut TypeSystem,
    session: &Session,
    env: &Environment,
    decl: &Decl,
    hint: BackendHint,
) -> CompileResult<CompiledStatement> {
    // The relational path is an external collaborator; its hint currently
    // selects the default evaluator.
    let _ = hint;

    let resolved = infer::infer_decl(ts, env, decl, session.coverage)?;
    let lowered = lower::lower_decl(ts, env, &resolved.type_map, decl);

    let kind = match decl {
        Decl::Val { inst: true, .. } => BindingKind::Inst,
        _ => BindingKind::Val,
    };

    let mut planner = PlanBuilder::new();
    let mut actions = Vec::with_capacity(lowered.binds.len());
    let mut links = Vec::new();
    if lowered.rec {
        for bind in &lowered.binds {
            if let Pat::Id(id) = &bind.pat {
                links.push(planner.push_link(id));
            }
        }
    }
    for (index, bind) in lowered.binds.iter().enumerate() {
        let grounded = ground::ground(ts, &bind.exp)?;
        let optimized = inline::optimize(env, &grounded, session.inline_passes);
        tracing::debug!(%optimized, "optimized core");
        let code = planner.compile(&optimized);
        if lowered.rec {
            if let Some(link) = links.get(index) {
                link.set(code.clone());
            }
        }
        let mut named = Vec::new();
        bind.pat.bindings(&mut named);
        let types = named
            .iter()
            .map(|pat| {
                let ty = resolved
                    .bindings
                    .iter()
                    .find(|(n, _)| n.as_str() == pat.name.as_ref())
                    .map(|(_, t)| t.clone())
                    .unwrap_or_else(|| pat.ty.clone());
                (pat.name.to_string(), ty)
            })
            .collect();
        actions.push(Action {
            pat: bind.pat.clone(),
            code,
            core: optimized,
            kind,
            types,
        });
    }
    planner.pop_links(links.len());

    let decl_bindings = declaration_bindings(ts, decl);

    Ok(CompiledStatement {
        ty: resolved.ty,
        warnings: resolved.warnings,
        actions,
        decl_bindings,
    })
}

/// Bindings introduced without evaluation: overload headers and datatype
/// constructors.
fn declaration_bindings(ts: &mut TypeSystem, decl: &Decl) -> Vec<Binding> {
    match decl {
        Decl::Over { name, .. } => {
            vec![Binding::over(NamedPat::new(
                name.as_str(),
                ts.ordinal(name),
                Type::unit(),
            ))]
        }
        Decl::Datatype { binds, .. } => {
            let mut out = Vec::new();
            for bind in binds {
                let Some(def) = ts.datatype(&bind.name).cloned() else {
                    continue;
                };
                let data = Rc::new(Type::Data {
                    name: def.name.clone(),
                    args: (0..def.arity).map(|i| Type::var(i as u32)).collect(),
                });
                for (con, arg) in &def.constructors {
                    let ty = match arg {
                        None => Type::forall(def.arity, data.clone()),
                        Some(arg_ty) => {
                            Type::forall(def.arity, Type::func(arg_ty.clone(), data.clone()))
                        }
                    };
                    out.push(Binding::val(
                        NamedPat::new(con.as_str(), ts.ordinal(con), ty),
                        Value::con(con.as_str(), None),
                    ));
                }
            }
            out
        }
        Decl::Val { .. } | Decl::TypeAlias { .. } => Vec::new(),
    }
}

/// A declaration can also be checked without planning, for tests.
pub fn validate_declaration(decl: &Decl) -> CompileResult<Resolved> {
    let mut ts = TypeSystem::new();
    let env = crate::builtin_env::initial_environment();
    infer::infer_decl(&mut ts, &env, decl, CoverageLevel::Warn)
}
