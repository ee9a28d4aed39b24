//! Lexical environments.

use super::ast::Name;
use super::heap::{self, CONTAINER_OVERHEAD, ENTRY_OVERHEAD, Garbage, Tracked};
use super::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type ScopeRef = Rc<RefCell<Scope>>;

pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}

pub struct Scope {
    vars: HashMap<Name, Binding>,
    parent: Option<ScopeRef>,
    /// `Some` on non-arrow function scopes and the global scope.
    this: Option<Value>,
    function_scope: bool,
    charged: usize,
}

pub enum AssignError {
    NotDefined,
    Constant,
}

impl Scope {
    pub fn new_ref(parent: Option<ScopeRef>, function_scope: bool, this: Option<Value>) -> ScopeRef {
        heap::charge(CONTAINER_OVERHEAD);
        let scope = Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent,
            this,
            function_scope,
            charged: CONTAINER_OVERHEAD,
        }));
        heap::track(Tracked::Scope(Rc::downgrade(&scope)));
        scope
    }

    /// Create or overwrite a binding in this scope.
    pub fn declare(&mut self, name: Name, value: Value, mutable: bool) {
        let cost = name.len() + ENTRY_OVERHEAD;
        if self
            .vars
            .insert(name, Binding { value, mutable })
            .is_none()
        {
            heap::charge(cost);
            self.charged += cost;
        }
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub(super) fn take_contents(&mut self) -> (Vec<Value>, Option<ScopeRef>) {
        let values = self.vars.drain().map(|(_, binding)| binding.value).collect();
        heap::release(self.charged - CONTAINER_OVERHEAD);
        self.charged = CONTAINER_OVERHEAD;
        (values, self.parent.take())
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let (values, parent) = self.take_contents();
        heap::release(self.charged);
        self.charged = 0;
        let mut garbage: Vec<Garbage> = values.into_iter().map(Garbage::Value).collect();
        if let Some(parent) = parent {
            garbage.push(Garbage::Scope(parent));
        }
        if !garbage.is_empty() {
            heap::dispose(garbage);
        }
    }
}

pub fn lookup(scope: &ScopeRef, name: &str) -> Option<Value> {
    let mut current = scope.clone();
    loop {
        let next = {
            let borrowed = current.borrow();
            if let Some(binding) = borrowed.vars.get(name) {
                return Some(binding.value.clone());
            }
            borrowed.parent.clone()
        };
        current = next?;
    }
}

/// Assign to the nearest binding named `name`, returning the previous value.
pub fn assign(scope: &ScopeRef, name: &str, value: Value) -> Result<Value, AssignError> {
    let mut current = scope.clone();
    loop {
        let next = {
            let mut borrowed = current.borrow_mut();
            if let Some(binding) = borrowed.vars.get_mut(name) {
                if !binding.mutable {
                    return Err(AssignError::Constant);
                }
                return Ok(std::mem::replace(&mut binding.value, value));
            }
            borrowed.parent.clone()
        };
        current = next.ok_or(AssignError::NotDefined)?;
    }
}

pub fn lookup_this(scope: &ScopeRef) -> Value {
    let mut current = scope.clone();
    loop {
        let next = {
            let borrowed = current.borrow();
            if let Some(this) = &borrowed.this {
                return this.clone();
            }
            borrowed.parent.clone()
        };
        match next {
            Some(next) => current = next,
            None => return Value::Undefined,
        }
    }
}

/// Nearest enclosing function (or global) scope, where `var` bindings live.
pub fn function_scope(scope: &ScopeRef) -> ScopeRef {
    let mut current = scope.clone();
    loop {
        let next = {
            let borrowed = current.borrow();
            if borrowed.function_scope {
                None
            } else {
                borrowed.parent.clone()
            }
        };
        match next {
            Some(next) => current = next,
            None => return current,
        }
    }
}

/// Clear a scope that is about to go out of use when the only remaining
/// references to it come from closures stored in its own bindings.
pub fn release_if_unshared(scope: ScopeRef) {
    let self_refs = scope
        .borrow()
        .vars
        .values()
        .filter(|binding| match &binding.value {
            Value::Function(closure) => {
                Rc::strong_count(closure) == 1 && Rc::ptr_eq(&closure.scope, &scope)
            }
            _ => false,
        })
        .count();
    if self_refs > 0 && Rc::strong_count(&scope) == 1 + self_refs {
        let (values, parent) = scope.borrow_mut().take_contents();
        drop(parent);
        let garbage = values.into_iter().map(Garbage::Value).collect();
        heap::dispose(garbage);
    }
}
