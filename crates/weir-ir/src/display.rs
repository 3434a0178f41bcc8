//! The unparser: source-shaped rendering of core expressions.
//!
//! Used by tests asserting on rewritten queries and by diagnostics that
//! quote a fragment back at the user. The output is close to what the
//! parser would accept, not guaranteed to round-trip.

use std::fmt;

use weir_core::ast::Direction;
use weir_types::Type;

use crate::exp::{Aggregate, Exp, Pat, SetOpKind, Step};

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exp::Literal { value, .. } => write!(f, "{value}"),
            Exp::Id(pat) => f.write_str(&pat.name),
            Exp::Select { field, .. } => write!(f, "#{field}"),
            Exp::Tuple { ty, args } => write_aggregate_exp(f, ty, args),
            Exp::Apply { func, arg, .. } => write_apply(f, func, arg),
            Exp::Fn { arms, .. } => {
                f.write_str("fn ")?;
                for (i, arm) in arms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{} => {}", arm.pat, arm.exp)?;
                }
                Ok(())
            }
            Exp::Case {
                scrutinee, arms, ..
            } => {
                write!(f, "case {scrutinee} of ")?;
                for (i, arm) in arms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{} => {}", arm.pat, arm.exp)?;
                }
                Ok(())
            }
            Exp::Let { rec, binds, body } => {
                f.write_str("let ")?;
                for (i, bind) in binds.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    if *rec {
                        write!(f, "val rec {} = {}", bind.pat, bind.exp)?;
                    } else {
                        write!(f, "val {} = {}", bind.pat, bind.exp)?;
                    }
                }
                write!(f, " in {body} end")
            }
            Exp::From { steps, .. } => {
                let mut prev_was_scan = false;
                for (i, step) in steps.iter().enumerate() {
                    write_step(f, step, i == 0, prev_was_scan)?;
                    prev_was_scan = matches!(step, Step::Scan { .. });
                }
                Ok(())
            }
            Exp::Extent { ty, .. } => write!(f, "extent({ty})"),
        }
    }
}

/// Tuples and records share a node; the type's labels decide the rendering.
fn write_aggregate_exp(
    f: &mut fmt::Formatter<'_>,
    ty: &Type,
    args: &[std::rc::Rc<Exp>],
) -> fmt::Result {
    if let Type::Record(fields) = ty {
        f.write_str("{")?;
        for (i, ((label, _), arg)) in fields.iter().zip(args).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            // Shorthand for a field bound to the identifier of the same name.
            match arg.as_ref() {
                Exp::Id(pat) if pat.name.as_ref() == label => f.write_str(label)?,
                _ => write!(f, "{label} = {arg}")?,
            }
        }
        f.write_str("}")
    } else {
        f.write_str("(")?;
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

fn write_apply(f: &mut fmt::Formatter<'_>, func: &Exp, arg: &Exp) -> fmt::Result {
    if let Some(b) = func.as_builtin() {
        if b.is_infix() {
            if let Exp::Tuple { args, .. } = arg {
                if args.len() == 2 {
                    write_operand(f, &args[0])?;
                    write!(f, " {} ", b.name())?;
                    return write_operand(f, &args[1]);
                }
            }
        }
    }
    if let Exp::Select { field, .. } = func {
        write!(f, "#{field} ")?;
        return write_operand(f, arg);
    }
    match func {
        Exp::Id(_) | Exp::Literal { .. } | Exp::Select { .. } => write!(f, "{func} ")?,
        _ => write!(f, "({func}) ")?,
    }
    write_operand(f, arg)
}

fn write_operand(f: &mut fmt::Formatter<'_>, exp: &Exp) -> fmt::Result {
    if is_delimited(exp) {
        write!(f, "{exp}")
    } else {
        write!(f, "({exp})")
    }
}

/// Expressions whose rendering needs no extra parentheses as an operand.
fn is_delimited(exp: &Exp) -> bool {
    match exp {
        Exp::Literal { .. } | Exp::Id(_) | Exp::Tuple { .. } | Exp::Select { .. } => true,
        Exp::Apply { .. }
        | Exp::Fn { .. }
        | Exp::Case { .. }
        | Exp::Let { .. }
        | Exp::From { .. }
        | Exp::Extent { .. } => false,
    }
}

fn write_step(
    f: &mut fmt::Formatter<'_>,
    step: &Step,
    first: bool,
    prev_was_scan: bool,
) -> fmt::Result {
    if !first && !matches!(step, Step::Scan { .. }) {
        f.write_str(" ")?;
    }
    match step {
        Step::Scan {
            pat,
            exp,
            condition,
            ..
        } => {
            if first {
                f.write_str("from ")?;
            } else if prev_was_scan {
                f.write_str(", ")?;
            } else {
                f.write_str(" join ")?;
            }
            write!(f, "{pat}")?;
            if !matches!(exp.as_ref(), Exp::Extent { .. }) {
                write!(f, " in {exp}")?;
            }
            if !is_true(condition) {
                write!(f, " on {condition}")?;
            }
            Ok(())
        }
        Step::Where { exp, .. } => write!(f, "where {exp}"),
        Step::Skip { exp, .. } => write!(f, "skip {exp}"),
        Step::Take { exp, .. } => write!(f, "take {exp}"),
        Step::Distinct { .. } => f.write_str("distinct"),
        Step::Yield { exp, .. } => write!(f, "yield {exp}"),
        Step::Order { items, .. } => {
            f.write_str("order ")?;
            for (i, (exp, dir)) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{exp}")?;
                if *dir == Direction::Desc {
                    f.write_str(" desc")?;
                }
            }
            Ok(())
        }
        Step::Group {
            keys, aggregates, ..
        } => {
            f.write_str("group ")?;
            for (i, (pat, exp)) in keys.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                match exp.as_ref() {
                    Exp::Id(id) if id.name == pat.name => f.write_str(&pat.name)?,
                    _ => write!(f, "{} = {exp}", pat.name)?,
                }
            }
            if !aggregates.is_empty() {
                f.write_str(" compute ")?;
                write_aggregates(f, aggregates)?;
            }
            Ok(())
        }
        Step::Compute { aggregates, .. } => {
            f.write_str("compute ")?;
            write_aggregates(f, aggregates)
        }
        Step::SetOp {
            kind,
            distinct,
            args,
            ..
        } => {
            let name = match kind {
                SetOpKind::Union => "union",
                SetOpKind::Except => "except",
                SetOpKind::Intersect => "intersect",
            };
            f.write_str(name)?;
            if *distinct {
                f.write_str(" distinct")?;
            }
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, " {arg}")?;
            }
            Ok(())
        }
    }
}

fn write_aggregates(f: &mut fmt::Formatter<'_>, aggregates: &[Aggregate]) -> fmt::Result {
    for (i, agg) in aggregates.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{} = {}", agg.label.name, agg.func)?;
        if let Some(arg) = &agg.arg {
            write!(f, " of {arg}")?;
        }
    }
    Ok(())
}

fn is_true(exp: &Exp) -> bool {
    matches!(
        exp.as_literal(),
        Some(weir_core::Value::Bool(true))
    )
}

impl fmt::Display for Pat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pat::Wildcard(_) => f.write_str("_"),
            Pat::Id(pat) => f.write_str(&pat.name),
            Pat::Literal { value, .. } => write!(f, "{value}"),
            Pat::Tuple { args, .. } => {
                f.write_str("(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Pat::Record { ty, args } => {
                f.write_str("{")?;
                let labels = ty.field_labels().unwrap_or_default();
                for (i, (label, arg)) in labels.iter().zip(args).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match arg {
                        Pat::Id(id) if id.name.as_ref() == label => f.write_str(label)?,
                        _ => write!(f, "{label} = {arg}")?,
                    }
                }
                f.write_str("}")
            }
            Pat::Con0 { name, .. } => f.write_str(name),
            Pat::Con { name, arg, .. } => match arg.as_ref() {
                Pat::Tuple { .. } | Pat::Id(_) | Pat::Wildcard(_) | Pat::Literal { .. } => {
                    write!(f, "{name} {arg}")
                }
                _ => write!(f, "{name} ({arg})"),
            },
            Pat::Cons { head, tail, .. } => {
                match head.as_ref() {
                    Pat::Cons { .. } | Pat::As { .. } => write!(f, "({head}) :: {tail}"),
                    _ => write!(f, "{head} :: {tail}"),
                }
            }
            Pat::List { args, .. } => {
                f.write_str("[")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str("]")
            }
            Pat::As { name, pat } => write!(f, "{} as {pat}", name.name),
        }
    }
}
