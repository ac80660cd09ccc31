//! Context registry: id-indirected execution contexts for advice.
//!
//! Advice declared once should keep running against "the logically current"
//! context even after the advised value has been replaced, so callbacks are
//! bound to a small integer handle rather than closing over an object
//! reference. The registry holds the handle-to-object mapping weakly: a
//! registration never keeps an otherwise-unreferenced context alive, and a
//! failed upgrade at call time means "context gone", which dispatch treats
//! as "skip this observer", never as a crash.

use std::cell::RefCell;
use std::rc::Weak;

use ahash::AHashMap;

use crate::error::{Error, Result};
use crate::ident;
use crate::logging::debug;
use crate::value::{Object, ObjectData, Value};

/// Execution-context choice for a registration.
#[derive(Clone)]
pub enum Context {
    /// Bind to whatever receiver the intercepted call actually had.
    Calling,
    /// Run against this object (registered by id, resolved at call time).
    Bind(Value),
}

/// Resolved form of [`Context`] stored inside observer entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    Calling,
    Id(u64),
}

thread_local! {
    static CONTEXTS: RefCell<AHashMap<u64, Weak<RefCell<ObjectData>>>> =
        RefCell::new(AHashMap::new());
}

pub(crate) fn binding_for(context: Context) -> Result<Binding> {
    match context {
        Context::Calling => Ok(Binding::Calling),
        Context::Bind(value) => Ok(Binding::Id(register(&value)?)),
    }
}

/// Register an object as a context, minting an id on first registration.
/// Idempotent: the id is cached in the object's hidden meta.
pub(crate) fn register(value: &Value) -> Result<u64> {
    let Value::Object(obj) = value else {
        return Err(Error::TargetNotObjectOrFunction);
    };
    if let Some(id) = obj.meta(|m| m.context_id).flatten() {
        return Ok(id);
    }
    let id = ident::next_context_id();
    obj.with_meta(|m| m.context_id = Some(id));
    CONTEXTS.with(|contexts| {
        contexts.borrow_mut().insert(id, obj.downgrade());
    });
    debug!(context_id = id, "registered advice context");
    Ok(id)
}

/// Resolve a stored binding against this call's actual receiver. `None`
/// means the registered context has been dropped.
pub(crate) fn resolve(calling_this: &Value, binding: Binding) -> Option<Value> {
    match binding {
        Binding::Calling => Some(calling_this.clone()),
        Binding::Id(id) => CONTEXTS
            .with(|contexts| contexts.borrow().get(&id).and_then(Weak::upgrade))
            .map(|inner| Value::Object(Object::from_inner(inner))),
    }
}

/// Drop the registry entry for a torn-down target, if it has one.
pub(crate) fn unregister(target: &Object) {
    if let Some(id) = target.meta(|m| m.context_id).flatten() {
        CONTEXTS.with(|contexts| {
            contexts.borrow_mut().remove(&id);
        });
        target.with_meta(|m| m.context_id = None);
    }
}

/// Number of live context registrations on this thread. Dead weak entries
/// are swept before counting.
#[must_use]
pub fn registered_context_count() -> usize {
    CONTEXTS.with(|contexts| {
        let mut map = contexts.borrow_mut();
        map.retain(|_, weak| weak.strong_count() > 0);
        map.len()
    })
}
