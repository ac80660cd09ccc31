//! Public advice surface: registration, unbound get/set interception, and
//! token-based removal.
//!
//! Registration is dual-mode. With a path, advice attaches to a key of the
//! target (dotted paths build a [chain](crate::chain) that survives
//! intermediate reassignment). Without a path, the target itself must be an
//! [`observify`](crate::observify)-wrapped function and only function
//! advice is legal.
//!
//! `unbound_get` / `unbound_set` are the instrumented access path: they
//! fire property advice, keep function-advised keys wrapped, and drive the
//! chain reassignment protocol. Raw access through [`Object::get`] /
//! [`Object::set`] stays uninstrumented on purpose.

use std::rc::Rc;

use crate::chain::ChainNode;
use crate::context::{self, Binding, Context};
use crate::error::{Error, Result};
use crate::ident;
use crate::logging::trace;
use crate::observers::{
    self, Advice, AdviceCallback, AroundLink, KeySlot, ObserverEntry, Remover,
};
use crate::value::{Object, Value};
use crate::wrap;

/// Dual-mode registration entry point.
///
/// `path: Some(..)` attaches to a key (or dotted path) of `target`;
/// `path: None` registers free-function advice on an observified wrapper.
/// The callback travels as an `Option` so a host driving registration
/// dynamically hits [`Error::MissingCallback`] instead of a type error.
pub fn add_observer(
    target: &Value,
    path: Option<&str>,
    advice: Advice,
    callback: Option<AdviceCallback>,
    context: Context,
) -> Result<Remover> {
    let Value::Object(obj) = target else {
        return Err(Error::TargetNotObjectOrFunction);
    };
    let callback = callback.ok_or(Error::MissingCallback)?;
    let binding = context::binding_for(context)?;
    match path {
        Some(path) => observe_targeted(obj, path, advice, callback, binding),
        None => observe_free(obj, advice, callback, binding),
    }
}

fn observe_targeted(
    target: &Object,
    path: &str,
    advice: Advice,
    callback: AdviceCallback,
    binding: Binding,
) -> Result<Remover> {
    let segments: Vec<String> = path.split('.').map(str::to_owned).collect();
    let removal_id = ident::next_removal_id();
    let remover = Remover {
        removal_id,
        advice,
        key: segments.last().cloned(),
    };
    if segments.len() == 1 {
        attach_keyed(target, &segments[0], advice, callback, binding, removal_id)?;
    } else {
        let root = ChainNode::new(segments.into(), advice, callback, binding, remover.clone(), 0);
        root.walk_and_create(&Value::Object(target.clone()))?;
    }
    trace!(removal_id, advice = %advice, "registered targeted observer");
    Ok(remover)
}

fn observe_free(
    target: &Object,
    advice: Advice,
    callback: AdviceCallback,
    binding: Binding,
) -> Result<Remover> {
    let slot = target.callable_slot().ok_or(Error::TargetNotObservable)?;
    if !advice.is_function_advice() {
        return Err(Error::InvalidFreeFunctionAdvice(advice));
    }
    let removal_id = ident::next_removal_id();
    slot.borrow_mut().add(
        advice,
        ObserverEntry {
            removal_id,
            callback,
            context: binding,
        },
    );
    trace!(removal_id, advice = %advice, "registered free-function observer");
    Ok(Remover {
        removal_id,
        advice,
        key: None,
    })
}

/// Attach one entry at a single key, wrapping a present function value when
/// function advice demands it. Chains re-enter here for their final
/// segment, carrying the chain's shared removal id.
pub(crate) fn attach_keyed(
    target: &Object,
    key: &str,
    advice: Advice,
    callback: AdviceCallback,
    binding: Binding,
    removal_id: u64,
) -> Result<()> {
    let slot = target.ensure_key_slot(key);
    slot.borrow_mut().add(
        advice,
        ObserverEntry {
            removal_id,
            callback,
            context: binding,
        },
    );
    if advice.is_function_advice()
        && let Some(current) = target.get_own(key)
        && current.is_callable()
        && !current.is_observified()
    {
        let wrapper = wrap::observify_keyed(target, key, &current)?;
        target.set(key, wrapper);
    }
    Ok(())
}

/// Register `before` advice on a key or dotted path.
pub fn before(
    target: &Value,
    path: &str,
    callback: AdviceCallback,
    context: Context,
) -> Result<Remover> {
    add_observer(target, Some(path), Advice::Before, Some(callback), context)
}

/// Register `after` advice on a key or dotted path.
pub fn after(
    target: &Value,
    path: &str,
    callback: AdviceCallback,
    context: Context,
) -> Result<Remover> {
    add_observer(target, Some(path), Advice::After, Some(callback), context)
}

/// Register `around` advice on a key or dotted path. The callback decides
/// whether the chain continues by calling [`proceed`](crate::proceed).
pub fn around(
    target: &Value,
    path: &str,
    callback: AdviceCallback,
    context: Context,
) -> Result<Remover> {
    add_observer(target, Some(path), Advice::Around, Some(callback), context)
}

/// Register `afterReturn` advice on a key or dotted path. The callback
/// receives the return value prepended to the call arguments.
pub fn after_return(
    target: &Value,
    path: &str,
    callback: AdviceCallback,
    context: Context,
) -> Result<Remover> {
    add_observer(
        target,
        Some(path),
        Advice::AfterReturn,
        Some(callback),
        context,
    )
}

/// Register `onGet` advice on a key or dotted path.
pub fn on_get(
    target: &Value,
    path: &str,
    callback: AdviceCallback,
    context: Context,
) -> Result<Remover> {
    add_observer(target, Some(path), Advice::OnGet, Some(callback), context)
}

/// Register `onSet` advice on a key or dotted path. The callback receives
/// `(new_value, old_value)`.
pub fn on_set(
    target: &Value,
    path: &str,
    callback: AdviceCallback,
    context: Context,
) -> Result<Remover> {
    add_observer(target, Some(path), Advice::OnSet, Some(callback), context)
}

/// Register function advice on an observified free function.
pub fn observe(
    target: &Value,
    advice: Advice,
    callback: AdviceCallback,
    context: Context,
) -> Result<Remover> {
    add_observer(target, None, advice, Some(callback), context)
}

/// Instrumented property read.
///
/// Function-advised keys yield the stored original, never the wrapper.
/// `onGet` observers fire in registration order with the resolved value;
/// observers whose context is gone are skipped silently.
pub fn unbound_get(target: &Value, key: &str) -> Result<Value> {
    let Value::Object(obj) = target else {
        return Err(Error::SetGetTargetNotObjectOrFunction);
    };
    let mut value = obj.get(key);
    if let Some(slot) = obj.key_slot(key) {
        if value.is_observified() {
            let original = slot.borrow().original.clone();
            if let Some(original) = original {
                value = original;
            }
        }
        observers::fire(&slot, Advice::OnGet, target, std::slice::from_ref(&value), false)?;
    }
    Ok(value)
}

/// Instrumented property write.
///
/// A write to an uninstrumented key is a plain assignment with no side
/// effects. On an instrumented key: an incoming function value is wrapped
/// (earlier around advice stays attached); a non-function clears the stored
/// original; `onSet` observers fire in registration order with
/// `(new, old)`; then every chain watching the key rebuilds its subtree —
/// destroy against the old value, create against the new one.
pub fn unbound_set(target: &Value, key: &str, value: Value) -> Result<()> {
    let Value::Object(obj) = target else {
        return Err(Error::SetGetTargetNotObjectOrFunction);
    };
    let Some(slot) = obj.key_slot(key) else {
        obj.set(key, value);
        return Ok(());
    };
    let old_raw = obj.get(key);
    let old = if old_raw.is_observified() {
        let stored = slot.borrow().original.clone();
        stored.unwrap_or(old_raw)
    } else {
        old_raw
    };
    let new = if value.is_callable() {
        let wrapper = wrap::observify_keyed(obj, key, &value)?;
        obj.set(key, wrapper);
        value
    } else {
        slot.borrow_mut().original = None;
        obj.set(key, value.clone());
        value
    };
    observers::fire(&slot, Advice::OnSet, target, &[new.clone(), old.clone()], false)?;
    let watching: Vec<ChainNode> = obj
        .meta(|meta| {
            meta.chains
                .iter()
                .filter(|node| node.matches(key))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    for node in watching {
        if let Some(next) = node.next() {
            trace!(key, "rebuilding chain subtree");
            next.walk_and_destroy(&old);
            next.walk_and_create(&new)?;
        }
    }
    Ok(())
}

/// Cancel the registration that produced `remover`.
///
/// Deletes every matching entry from the list the remover names; a remover
/// minted for a dotted path tears the whole chain down from its root.
/// Silent no-op when nothing matches (a remover may be replayed
/// defensively).
pub fn remove(target: &Value, remover: &Remover) {
    let Value::Object(obj) = target else {
        return;
    };
    let slot = match remover.key.as_deref() {
        Some(key) => obj.key_slot(key),
        None => obj.callable_slot(),
    };
    if let Some(slot) = slot {
        slot.borrow_mut().remove_by_id(remover.advice, remover.removal_id);
    }
    let roots: Vec<ChainNode> = obj
        .meta(|meta| {
            meta.chains
                .iter()
                .filter(|node| node.depth() == 0 && node.removal_id() == remover.removal_id)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    for root in roots {
        root.walk_and_destroy(target);
    }
    trace!(removal_id = remover.removal_id, "removed observer");
}

/// Remove all advice and all chains rooted at `target`.
///
/// Wrapped function values are restored to their originals, the hidden
/// bookkeeping is dropped, and the target's context registration is
/// released. Traversal order is unspecified.
pub fn remove_all_observers(target: &Value) {
    let Value::Object(obj) = target else {
        return;
    };
    let roots: Vec<ChainNode> = obj
        .meta(|meta| {
            meta.chains
                .iter()
                .filter(|node| node.depth() == 0)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    for root in roots {
        root.walk_and_destroy(target);
    }
    if let Some(slot) = obj.callable_slot() {
        let mut table = slot.borrow_mut();
        table.before.clear();
        table.after.clear();
        table.after_return.clear();
        table.on_get.clear();
        table.on_set.clear();
        table.around.retain(|link| matches!(link, AroundLink::Base(_)));
    }
    let keyed: Vec<(String, KeySlot)> = obj
        .meta(|meta| {
            meta.keys
                .iter()
                .map(|(key, slot)| (key.clone(), Rc::clone(slot)))
                .collect()
        })
        .unwrap_or_default();
    for (key, slot) in keyed {
        let original = slot.borrow().original.clone();
        if let Some(original) = original
            && obj.get_own(&key).is_some_and(|v| v.is_observified())
        {
            obj.set(&key, original);
        }
    }
    context::unregister(obj);
    obj.clear_meta();
}
