//! The typed, width-aware value printer.
//!
//! Renders `val name = value : type` lines within a configured line width,
//! list length, string length, and nesting depth. Only plan-builder actions
//! call this; it is presentation, not semantics.

use std::rc::Rc;

use weir_core::{Value, value::format_real};
use weir_types::Type;

#[derive(Debug, Clone)]
pub struct PrettyConfig {
    pub line_width: usize,
    /// Nesting depth before a value collapses to `...`.
    pub print_depth: usize,
    /// Elements of a collection shown before `...`.
    pub print_length: usize,
    /// Characters of a string shown before `...`.
    pub string_size: usize,
}

impl Default for PrettyConfig {
    fn default() -> Self {
        Self {
            line_width: 79,
            print_depth: 12,
            print_length: 64,
            string_size: 70,
        }
    }
}

/// Render one binding as output lines.
pub fn print_binding(name: &str, value: &Value, ty: &Rc<Type>, config: &PrettyConfig) -> Vec<String> {
    let rendered = format_typed(value, ty, config.print_depth, config);
    let single = format!("val {name} = {rendered} : {ty}");
    if single.len() <= config.line_width {
        return vec![single];
    }
    // Break the value at top-level commas, two-space continuation indent.
    let mut lines = vec![format!("val {name} =")];
    for chunk in wrap(&rendered, config.line_width.saturating_sub(2)) {
        lines.push(format!("  {chunk}"));
    }
    lines.push(format!("  : {ty}"));
    lines
}

/// Type-directed rendering with depth and length limits.
pub fn format_typed(value: &Value, ty: &Rc<Type>, depth: usize, config: &PrettyConfig) -> String {
    if depth == 0 {
        return "...".to_owned();
    }
    match (value, strip_alias(ty).as_ref()) {
        (Value::List(items), Type::List(elem) | Type::Bag(elem)) => {
            let mut out = String::from("[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if i == config.print_length {
                    out.push_str("...");
                    break;
                }
                out.push_str(&format_typed(item, elem, depth - 1, config));
            }
            out.push(']');
            out
        }
        (Value::List(items), Type::Tuple(args)) => {
            let mut out = String::from("(");
            for (i, (item, item_ty)) in items.iter().zip(args).enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&format_typed(item, item_ty, depth - 1, config));
            }
            out.push(')');
            out
        }
        (Value::List(items), Type::Record(fields)) => {
            let mut out = String::from("{");
            for (i, (item, (label, field_ty))) in items.iter().zip(fields).enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(label);
                out.push('=');
                out.push_str(&format_typed(item, field_ty, depth - 1, config));
            }
            out.push('}');
            out
        }
        (Value::String(s), _) => {
            if s.chars().count() > config.string_size {
                let shown: String = s.chars().take(config.string_size).collect();
                format!("{shown:?}...")
            } else {
                format!("{s:?}")
            }
        }
        (Value::Real(r), _) => format_real(*r),
        (Value::Con(name, arg), _) => match arg {
            None => name.to_string(),
            // The constructor's argument type is not at hand here; fall
            // back to the untyped rendering for the payload.
            Some(inner) => format!("{name} {inner}"),
        },
        (Value::Closure(_) | Value::Builtin(_), _) => "fn".to_owned(),
        (other, _) => other.to_string(),
    }
}

fn strip_alias(ty: &Rc<Type>) -> Rc<Type> {
    let mut t = ty.clone();
    while let Type::Alias { target, .. } = t.as_ref() {
        t = target.clone();
    }
    t
}

/// Greedy wrap at comma boundaries.
fn wrap(s: &str, width: usize) -> Vec<String> {
    if s.len() <= width {
        return vec![s.to_owned()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for piece in split_keep_commas(s) {
        if !current.is_empty() && current.len() + piece.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        current.push_str(piece);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Split after each top-level comma, keeping the comma with the left piece.
fn split_keep_commas(s: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '[' | '(' | '{' if !in_string => depth += 1,
            ']' | ')' | '}' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth <= 1 => {
                pieces.push(&s[start..=i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < s.len() {
        pieces.push(&s[start..]);
    }
    pieces
}
