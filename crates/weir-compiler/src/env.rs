//! Compile-time environments.
//!
//! A persistent chain of bindings, most recent first. `bind` never mutates;
//! environments older than any live compiled statement stay valid for as
//! long as those statements hold them. A binding that shadows the current
//! head with the same name rebinds against the parent instead, keeping
//! chains short under repeated redefinition.

use std::rc::Rc;

use weir_core::Value;
use weir_ir::{Exp, NamedPat};

/// What kind of name a binding introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A plain value.
    Val,
    /// An overload declaration: introduces a new overloaded name.
    Over,
    /// A specific overload instance of an enclosing `Over` name.
    Inst,
}

/// A compile-time value attached to a binding.
#[derive(Debug, Clone)]
pub enum BoundValue {
    /// A runtime object, available for embedding as a literal.
    Runtime(Value),
    /// A previously-compiled core expression, available for inlining.
    Core(Rc<Exp>),
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub pat: NamedPat,
    pub value: Option<BoundValue>,
    pub kind: BindingKind,
}

impl Binding {
    pub fn val(pat: NamedPat, value: Value) -> Self {
        Self {
            pat,
            value: Some(BoundValue::Runtime(value)),
            kind: BindingKind::Val,
        }
    }

    pub fn over(pat: NamedPat) -> Self {
        Self {
            pat,
            value: None,
            kind: BindingKind::Over,
        }
    }

    pub fn inst(pat: NamedPat, value: Value) -> Self {
        Self {
            pat,
            value: Some(BoundValue::Runtime(value)),
            kind: BindingKind::Inst,
        }
    }

    pub fn runtime_value(&self) -> Option<&Value> {
        match &self.value {
            Some(BoundValue::Runtime(v)) => Some(v),
            _ => None,
        }
    }

    pub fn core_exp(&self) -> Option<&Rc<Exp>> {
        match &self.value {
            Some(BoundValue::Core(e)) => Some(e),
            _ => None,
        }
    }
}

/// The persistent binding chain.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    node: Option<Rc<EnvNode>>,
}

#[derive(Debug)]
struct EnvNode {
    binding: Binding,
    parent: Environment,
}

impl Environment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bind(&self, binding: Binding) -> Environment {
        // Shadowing the head with the same name: rebind against the parent.
        let parent = match &self.node {
            Some(node)
                if node.binding.pat.name == binding.pat.name
                    && node.binding.kind == binding.kind
                    && binding.kind == BindingKind::Val =>
            {
                node.parent.clone()
            }
            _ => self.clone(),
        };
        Environment {
            node: Some(Rc::new(EnvNode { binding, parent })),
        }
    }

    /// The top match for `name`.
    pub fn get(&self, name: &str) -> Option<&Binding> {
        let mut env = self;
        while let Some(node) = &env.node {
            if node.binding.pat.name.as_ref() == name {
                return Some(&node.binding);
            }
            env = &node.parent;
        }
        None
    }

    /// The binding for exactly (name, ordinal).
    pub fn get_ordinal(&self, name: &str, ordinal: u32) -> Option<&Binding> {
        let mut env = self;
        while let Some(node) = &env.node {
            if node.binding.pat.name.as_ref() == name && node.binding.pat.ordinal == ordinal {
                return Some(&node.binding);
            }
            env = &node.parent;
        }
        None
    }

    /// Walk outward collecting every `Inst` of `name`, stopping at the
    /// `Over` binding that introduced the overloaded name. Stopping there
    /// keeps instances of an enclosing scope's *different* overload of the
    /// same name out of the answer.
    pub fn instances(&self, name: &str) -> Vec<Binding> {
        let mut out = Vec::new();
        let mut env = self;
        while let Some(node) = &env.node {
            if node.binding.pat.name.as_ref() == name {
                match node.binding.kind {
                    BindingKind::Inst => out.push(node.binding.clone()),
                    BindingKind::Over => break,
                    BindingKind::Val => {}
                }
            }
            env = &node.parent;
        }
        out
    }

    /// All bindings, most recent first.
    pub fn iter(&self) -> EnvIter<'_> {
        EnvIter { env: self }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_none()
    }
}

pub struct EnvIter<'a> {
    env: &'a Environment,
}

impl<'a> Iterator for EnvIter<'a> {
    type Item = &'a Binding;

    fn next(&mut self) -> Option<&'a Binding> {
        let node = self.env.node.as_ref()?;
        self.env = &node.parent;
        Some(&node.binding)
    }
}
