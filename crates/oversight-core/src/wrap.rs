//! Function wrapping ("observify"): turn a plain function into an
//! interceptable one without changing how callers see it.
//!
//! A wrapper copies every enumerable own property of the original at wrap
//! time and shares the `prototype` handle (not a copy), so constructor use
//! and static-attribute access behave as if the original were still in
//! place. Wrapping is idempotent: an already-wrapped callable comes back as
//! the same handle, never double-wrapped.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::logging::debug;
use crate::observers::{KeyObservers, KeySlot, ensure_base};
use crate::value::{Callable, Object, Value};

/// Prepare a free function for advice registration.
///
/// Returns a wrapper dispatching through the joinpoint; register function
/// advice against the wrapper and invoke the wrapper instead of the
/// original. Passing an already-wrapped value returns it unchanged.
pub fn observify(function: &Value) -> Result<Value> {
    let Value::Object(obj) = function else {
        return Err(Error::TargetNotObjectOrFunction);
    };
    match obj.callable() {
        Some(Callable::Observified(_)) => Ok(function.clone()),
        Some(Callable::Plain(_)) => {
            let slot: KeySlot = Rc::new(RefCell::new(KeyObservers {
                original: Some(function.clone()),
                ..KeyObservers::default()
            }));
            ensure_base(&slot);
            debug!("wrapped free function");
            Ok(Value::Object(build_wrapper(obj, slot)))
        }
        None => Err(Error::TargetNotCallable),
    }
}

/// Wrap the function value of an instrumented key, reusing the key's
/// observer table.
///
/// On reassignment this replaces only the stored original and the terminal
/// base link, so around advice registered earlier stays attached and the
/// base is never duplicated.
pub(crate) fn observify_keyed(target: &Object, key: &str, function: &Value) -> Result<Value> {
    let Value::Object(fobj) = function else {
        return Err(Error::TargetNotCallable);
    };
    match fobj.callable() {
        Some(Callable::Observified(_)) => Ok(function.clone()),
        Some(Callable::Plain(_)) => {
            let slot = target.ensure_key_slot(key);
            slot.borrow_mut().original = Some(function.clone());
            ensure_base(&slot);
            debug!(key, "wrapped function value");
            Ok(Value::Object(build_wrapper(fobj, slot)))
        }
        None => Err(Error::TargetNotCallable),
    }
}

fn build_wrapper(function: &Object, slot: KeySlot) -> Object {
    let wrapper = Object::new();
    // Own properties (the `prototype` handle included) are shared, not
    // deep-copied, so later mutation through either reference stays visible
    // through both.
    for (key, value) in function.own_props() {
        wrapper.set(&key, value);
    }
    wrapper.set_callable(Callable::Observified(slot));
    wrapper
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observify_is_idempotent() {
        let f = Value::from(Object::function(|_, _| Ok(Value::from(1))));
        let wrapped = observify(&f).unwrap();
        let rewrapped = observify(&wrapped).unwrap();
        assert_eq!(wrapped, rewrapped);
    }

    #[test]
    fn wrapper_shares_the_prototype_handle() {
        let f = Object::function(|_, _| Ok(Value::Undefined));
        let wrapped = observify(&Value::from(f.clone())).unwrap();
        let wobj = wrapped.as_object().unwrap();
        if let Value::Object(proto) = f.get("prototype") {
            proto.set("late", 9);
        }
        let Value::Object(wproto) = wobj.get("prototype") else {
            panic!("wrapper lost its prototype");
        };
        assert_eq!(wproto.get("late"), Value::from(9));
    }

    #[test]
    fn wrapper_copies_static_attributes() {
        let f = Object::function(|_, _| Ok(Value::Undefined));
        f.set("version", 3);
        let wrapped = observify(&Value::from(f)).unwrap();
        assert_eq!(wrapped.as_object().unwrap().get("version"), Value::from(3));
    }

    #[test]
    fn observify_rejects_non_callables() {
        assert_eq!(
            observify(&Value::from(Object::new())).unwrap_err(),
            Error::TargetNotCallable
        );
        assert_eq!(
            observify(&Value::from(2)).unwrap_err(),
            Error::TargetNotObjectOrFunction
        );
    }
}
