//! Lexical environments
//!
//! A reverse chain of frames: lookup walks outward, `extend` makes a child,
//! and a child never mutates its parent. `define` binds into the current
//! frame only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::value::Value;

/// One lexical scope
#[derive(Debug, Default)]
pub struct Environment {
    vars: Mutex<HashMap<String, Value>>,
    parent: Option<Arc<Environment>>,
}

impl Environment {
    /// A fresh top-level environment
    pub fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Child scope seeded with bindings
    pub fn extend(parent: &Arc<Self>, bindings: Vec<(String, Value)>) -> Arc<Self> {
        Arc::new(Self {
            vars: Mutex::new(bindings.into_iter().collect()),
            parent: Some(parent.clone()),
        })
    }

    /// Resolve a symbol, walking outward through parent frames
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.lock().expect("env lock poisoned").get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }

    /// Bind a symbol in this frame
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.vars.lock().expect("env lock poisoned").insert(name.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_outward() {
        let root = Environment::root();
        root.define("x", Value::Int(1));

        let child = Environment::extend(&root, vec![("y".to_string(), Value::Int(2))]);

        assert_eq!(child.lookup("x"), Some(Value::Int(1)));
        assert_eq!(child.lookup("y"), Some(Value::Int(2)));
        assert_eq!(child.lookup("z"), None);
    }

    #[test]
    fn test_child_shadows_parent() {
        let root = Environment::root();
        root.define("x", Value::Int(1));

        let child = Environment::extend(&root, vec![("x".to_string(), Value::Int(99))]);

        assert_eq!(child.lookup("x"), Some(Value::Int(99)));
        assert_eq!(root.lookup("x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_define_never_touches_parent() {
        let root = Environment::root();
        let child = Environment::extend(&root, vec![]);

        child.define("only-here", Value::Bool(true));

        assert!(root.lookup("only-here").is_none());
        assert!(child.lookup("only-here").is_some());
    }
}
