use crate::types::{Symbol, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

// --- Environment Error ---
#[derive(Debug, Clone, PartialEq)]
pub enum EnvError {
    UnboundSymbol(Symbol),
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::UnboundSymbol(name) => {
                write!(f, "Symbol '{}' is not defined", name)
            }
        }
    }
}

impl std::error::Error for EnvError {}

// --- Environment Definition ---

/// A lexically nested scope: a local mapping from symbols to values plus an
/// optional parent. Shared ownership and interior mutability are needed for
/// closures capturing environments and for `set!`.
#[derive(Debug)]
pub struct Environment {
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<Symbol, Value>,
}

impl Environment {
    /// Creates a new root environment with no parent.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: None,
            bindings: HashMap::new(),
        }))
    }

    /// Creates a new environment enclosed within an outer one.
    pub fn new_enclosed(outer_env: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: HashMap::new(),
        }))
    }

    /// Defines a binding in the *current* environment frame, replacing any
    /// previous binding of the same symbol in this frame.
    pub fn define(&mut self, name: Symbol, value: Value) {
        self.bindings.insert(name, value);
    }

    /// Looks up a symbol, walking outward through the parent chain.
    pub fn get(&self, name: Symbol) -> Result<Value, EnvError> {
        if let Some(value) = self.bindings.get(&name) {
            Ok(value.clone())
        } else {
            match &self.outer {
                Some(outer_env_ptr) => outer_env_ptr.borrow().get(name),
                None => Err(EnvError::UnboundSymbol(name)),
            }
        }
    }

    /// Rebinds an *existing* symbol in the nearest enclosing frame that
    /// already binds it. Errors if no frame binds the symbol.
    pub fn set(&mut self, name: Symbol, value: Value) -> Result<(), EnvError> {
        if let Some(slot) = self.bindings.get_mut(&name) {
            *slot = value;
            Ok(())
        } else {
            match &self.outer {
                Some(outer_env_ptr) => outer_env_ptr.borrow_mut().set(name, value),
                None => Err(EnvError::UnboundSymbol(name)),
            }
        }
    }
}
