//! # Lexical Scope Stack
//!
//! The translation collaborator resolves source identifiers through a stack
//! of scopes. Variables and functions live in separate namespaces, so a
//! function and a variable may share a name in the same scope; lookups walk
//! from the innermost layer outward.

use rustc_hash::FxHashMap;

use crate::{FunctionId, Value};

#[derive(Debug, Default)]
struct Layer {
    values: FxHashMap<String, Value>,
    funcs: FxHashMap<String, FunctionId>,
}

/// A stack of name-resolution layers. Constructed with the outermost layer
/// already open; the runtime interface is registered there before any source
/// scope is entered.
#[derive(Debug)]
pub struct Scopes {
    layers: Vec<Layer>,
}

impl Scopes {
    pub fn new() -> Self {
        Self {
            layers: vec![Layer::default()],
        }
    }

    /// Opens a new innermost layer.
    pub fn enter(&mut self) {
        self.layers.push(Layer::default());
    }

    /// Closes the innermost layer, dropping its bindings.
    ///
    /// # Panics
    /// Panics when called on the outermost layer; the runtime bindings are
    /// never popped.
    pub fn exit(&mut self) {
        assert!(self.layers.len() > 1, "exiting the outermost scope");
        self.layers.pop();
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Binds a variable name in the innermost layer, shadowing any outer
    /// binding of the same name.
    pub fn define_value(&mut self, name: &str, value: Value) {
        self.innermost().values.insert(name.to_string(), value);
    }

    /// Binds a function name in the innermost layer.
    pub fn define_func(&mut self, name: &str, func: FunctionId) {
        self.innermost().funcs.insert(name.to_string(), func);
    }

    /// Resolves a variable name, innermost layer first.
    pub fn find_value(&self, name: &str) -> Option<Value> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.values.get(name).copied())
    }

    /// Resolves a function name, innermost layer first.
    pub fn find_func(&self, name: &str) -> Option<FunctionId> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.funcs.get(name).copied())
    }

    fn innermost(&mut self) -> &mut Layer {
        self.layers
            .last_mut()
            .unwrap_or_else(|| panic!("scope stack is empty"))
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}
