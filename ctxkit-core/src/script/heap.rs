//! Live-heap accounting for script values.
//!
//! Every heap value charges the interpreter thread's counter when it is
//! created and releases the charge when it is dropped, so the counter tracks
//! what the script currently holds, temporaries included. Values never leave
//! the thread that created them.
//!
//! Containers are also tracked weakly so that [`teardown`] can break the
//! reference cycles closures and self-referencing objects create.

use super::scope::ScopeRef;
use super::value::{JsArray, JsObject, Value};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Fixed cost charged for a string besides its bytes.
pub const STRING_OVERHEAD: usize = 32;
/// Fixed cost charged for an array, object or scope.
pub const CONTAINER_OVERHEAD: usize = 64;
/// Cost of one property or binding besides its key bytes.
pub const ENTRY_OVERHEAD: usize = 48;
/// Cost of one array slot.
pub const SLOT: usize = size_of::<Value>();

thread_local! {
    static LIVE: Cell<usize> = const { Cell::new(0) };
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

pub fn charge(bytes: usize) {
    LIVE.with(|live| live.set(live.get().saturating_add(bytes)));
}

pub fn release(bytes: usize) {
    LIVE.with(|live| live.set(live.get().saturating_sub(bytes)));
}

/// Bytes currently charged on this thread.
pub fn live() -> usize {
    LIVE.with(Cell::get)
}

pub fn reset() {
    LIVE.with(|live| live.set(0));
}

pub(super) enum Tracked {
    Array(Weak<JsArray>),
    Object(Weak<JsObject>),
    Scope(Weak<RefCell<super::scope::Scope>>),
}

impl Tracked {
    fn is_alive(&self) -> bool {
        match self {
            Tracked::Array(weak) => weak.strong_count() > 0,
            Tracked::Object(weak) => weak.strong_count() > 0,
            Tracked::Scope(weak) => weak.strong_count() > 0,
        }
    }
}

#[derive(Default)]
struct Registry {
    entries: Vec<Tracked>,
    prune_at: usize,
}

pub(super) fn track(entry: Tracked) {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        if registry.entries.len() >= registry.prune_at.max(1024) {
            registry.entries.retain(Tracked::is_alive);
            registry.prune_at = registry.entries.len() * 2;
        }
        registry.entries.push(entry);
    });
}

/// Something whose children still need releasing.
pub(super) enum Garbage {
    Value(Value),
    Scope(ScopeRef),
}

/// Drop a batch of values without recursing into nested containers, so
/// arbitrarily deep structures cannot exhaust the stack.
pub(super) fn dispose(mut stack: Vec<Garbage>) {
    while let Some(item) = stack.pop() {
        match item {
            Garbage::Value(Value::Array(array)) => {
                if let Ok(mut array) = Rc::try_unwrap(array) {
                    stack.extend(array.take_items().into_iter().map(Garbage::Value));
                }
            }
            Garbage::Value(Value::Object(object)) => {
                if let Ok(mut object) = Rc::try_unwrap(object) {
                    stack.extend(object.take_values().into_iter().map(Garbage::Value));
                }
            }
            Garbage::Value(Value::Function(closure)) => {
                if let Ok(closure) = Rc::try_unwrap(closure) {
                    stack.push(Garbage::Scope(closure.scope));
                }
            }
            Garbage::Value(_) => {}
            Garbage::Scope(scope) => {
                if let Ok(cell) = Rc::try_unwrap(scope) {
                    let mut scope = cell.into_inner();
                    let (values, parent) = scope.take_contents();
                    stack.extend(values.into_iter().map(Garbage::Value));
                    if let Some(parent) = parent {
                        stack.push(Garbage::Scope(parent));
                    }
                }
            }
        }
    }
}

/// Empty every container still alive on this thread. Run once the script
/// has finished and its result has been converted.
pub fn teardown() {
    let entries = REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        registry.prune_at = 0;
        std::mem::take(&mut registry.entries)
    });

    let mut garbage = Vec::new();
    for entry in entries {
        match entry {
            Tracked::Array(weak) => {
                if let Some(array) = weak.upgrade() {
                    garbage.extend(array.drain().into_iter().map(Garbage::Value));
                }
            }
            Tracked::Object(weak) => {
                if let Some(object) = weak.upgrade() {
                    garbage.extend(object.drain().into_iter().map(Garbage::Value));
                }
            }
            Tracked::Scope(weak) => {
                if let Some(scope) = weak.upgrade() {
                    let (values, parent) = scope.borrow_mut().take_contents();
                    garbage.extend(values.into_iter().map(Garbage::Value));
                    if let Some(parent) = parent {
                        garbage.push(Garbage::Scope(parent));
                    }
                }
            }
        }
    }
    dispose(garbage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::value::JsString;

    #[test]
    fn strings_release_their_charge() {
        reset();
        let before = live();
        let text = Value::Str(JsString::from("x".repeat(1000)));
        assert!(live() >= before + 1000);
        drop(text);
        assert_eq!(live(), before);
    }

    #[test]
    fn deep_nesting_drops_without_overflow() {
        reset();
        let mut value = JsArray::new_value(Vec::new());
        for _ in 0..200_000 {
            value = JsArray::new_value(vec![value]);
        }
        drop(value);
        teardown();
        assert_eq!(live(), 0);
    }

    #[test]
    fn teardown_breaks_object_cycles() {
        reset();
        let object = JsObject::new_rc();
        object.set("me".into(), Value::Object(object.clone()));
        let weak = Rc::downgrade(&object);
        drop(object);
        assert!(weak.upgrade().is_some(), "cycle keeps the object alive");
        teardown();
        assert!(weak.upgrade().is_none());
        assert_eq!(live(), 0);
    }
}
