//! Cheap observational counters for hosts and tests.
//!
//! These read the hidden bookkeeping without exposing it: enough to assert
//! "no observers left" or "the chain is gone" without reaching into
//! internals.

use crate::observers::Advice;
use crate::value::Value;

pub use crate::context::registered_context_count;

/// Number of observers of `advice` kind registered at `key` on `target`.
#[must_use]
pub fn observer_count(target: &Value, key: &str, advice: Advice) -> usize {
    let Value::Object(obj) = target else {
        return 0;
    };
    obj.key_slot(key)
        .map_or(0, |slot| slot.borrow().count(advice))
}

/// Number of free-function observers of `advice` kind on a wrapped
/// function.
#[must_use]
pub fn free_observer_count(target: &Value, advice: Advice) -> usize {
    let Value::Object(obj) = target else {
        return 0;
    };
    obj.callable_slot()
        .map_or(0, |slot| slot.borrow().count(advice))
}

/// Number of chain segments registered at `target`.
#[must_use]
pub fn chain_count(target: &Value) -> usize {
    let Value::Object(obj) = target else {
        return 0;
    };
    obj.meta(|meta| meta.chains.len()).unwrap_or(0)
}
