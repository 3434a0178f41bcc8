//! The evaluation environment.
//!
//! A persistent chain of (name, ordinal) → value bindings. `bind` never
//! mutates; query sinks extend the chain per row and hand the extension
//! downstream, so shared prefixes cost nothing. Ambient context is always
//! passed through here, never through process globals.

use std::rc::Rc;

use weir_core::Value;

#[derive(Debug, Clone, Default)]
pub struct EvalEnv {
    node: Option<Rc<EnvNode>>,
}

#[derive(Debug)]
struct EnvNode {
    name: Rc<str>,
    ordinal: u32,
    value: Value,
    parent: EvalEnv,
}

impl EvalEnv {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bind(&self, name: Rc<str>, ordinal: u32, value: Value) -> EvalEnv {
        EvalEnv {
            node: Some(Rc::new(EnvNode {
                name,
                ordinal,
                value,
                parent: self.clone(),
            })),
        }
    }

    /// The most recent binding of (name, ordinal).
    pub fn get(&self, name: &str, ordinal: u32) -> Option<&Value> {
        let mut env = self;
        while let Some(node) = &env.node {
            if node.name.as_ref() == name && node.ordinal == ordinal {
                return Some(&node.value);
            }
            env = &node.parent;
        }
        None
    }

    /// The most recent binding of `name`, regardless of ordinal.
    pub fn get_top(&self, name: &str) -> Option<&Value> {
        let mut env = self;
        while let Some(node) = &env.node {
            if node.name.as_ref() == name {
                return Some(&node.value);
            }
            env = &node.parent;
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_none()
    }
}
