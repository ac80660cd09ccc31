//! onGet/onSet interception through the unbound accessors.

use std::cell::RefCell;
use std::rc::Rc;

use oversight_core::{
    AdviceCallback, Context, Error, Object, Value, before, callback, on_get, on_set, unbound_get,
    unbound_set,
};

type Seen = Rc<RefCell<Vec<Vec<Value>>>>;

fn new_seen() -> Seen {
    Rc::new(RefCell::new(Vec::new()))
}

fn record(seen: &Seen) -> AdviceCallback {
    let seen = Rc::clone(seen);
    callback(move |_ctx, args| {
        seen.borrow_mut().push(args.to_vec());
        Ok(Value::Undefined)
    })
}

#[test]
fn on_get_fires_with_the_resolved_value() {
    let target = Value::from(Object::new());
    target.as_object().unwrap().set("answer", 42);
    let seen = new_seen();
    on_get(&target, "answer", record(&seen), Context::Calling).unwrap();
    let value = unbound_get(&target, "answer").unwrap();
    assert_eq!(value, Value::from(42));
    assert_eq!(*seen.borrow(), vec![vec![Value::from(42)]]);
}

#[test]
fn on_get_observers_fire_in_registration_order() {
    let target = Value::from(Object::new());
    target.as_object().unwrap().set("k", 1);
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    for name in ["g0", "g1", "g2"] {
        let order = Rc::clone(&order);
        on_get(
            &target,
            "k",
            callback(move |_ctx, _args| {
                order.borrow_mut().push(name);
                Ok(Value::Undefined)
            }),
            Context::Calling,
        )
        .unwrap();
    }
    unbound_get(&target, "k").unwrap();
    assert_eq!(*order.borrow(), vec!["g0", "g1", "g2"]);
}

#[test]
fn on_set_receives_new_then_old() {
    let target = Value::from(Object::new());
    target.as_object().unwrap().set("k", "before");
    let seen = new_seen();
    on_set(&target, "k", record(&seen), Context::Calling).unwrap();
    unbound_set(&target, "k", Value::from("after")).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![vec![Value::from("after"), Value::from("before")]]
    );
    assert_eq!(
        target.as_object().unwrap().get("k"),
        Value::from("after")
    );
}

#[test]
fn uninstrumented_set_is_a_plain_assignment() {
    let target = Value::from(Object::new());
    let function = Value::from(Object::function(|_, _| Ok(Value::Undefined)));
    unbound_set(&target, "free", function.clone()).unwrap();
    // No advice on the key: the value is stored as-is, never wrapped.
    let stored = target.as_object().unwrap().get("free");
    assert_eq!(stored, function);
    assert!(!stored.is_observified());
}

#[test]
fn get_returns_the_original_of_a_function_advised_key() {
    let target = Value::from(Object::new());
    let function = Value::from(Object::function(|_, _| Ok(Value::from("out"))));
    target.as_object().unwrap().set("fn", function.clone());
    before(
        &target,
        "fn",
        callback(|_, _| Ok(Value::Undefined)),
        Context::Calling,
    )
    .unwrap();
    // The property itself holds the wrapper...
    assert!(target.as_object().unwrap().get("fn").is_observified());
    // ...but the unbound read surfaces the original.
    let read = unbound_get(&target, "fn").unwrap();
    assert_eq!(read, function);
    assert!(!read.is_observified());
}

#[test]
fn set_wraps_an_incoming_function_on_an_instrumented_key() {
    let target = Value::from(Object::new());
    let seen = new_seen();
    on_set(&target, "fn", record(&seen), Context::Calling).unwrap();
    let function = Value::from(Object::function(|_, _| Ok(Value::Undefined)));
    unbound_set(&target, "fn", function.clone()).unwrap();
    assert!(target.as_object().unwrap().get("fn").is_observified());
    // The observer saw the function itself, not the wrapper.
    assert_eq!(*seen.borrow(), vec![vec![function, Value::Undefined]]);
}

#[test]
fn replacing_a_function_with_a_scalar_clears_the_original() {
    let target = Value::from(Object::new());
    target.as_object().unwrap().set(
        "fn",
        Value::from(Object::function(|_, _| Ok(Value::Undefined))),
    );
    before(
        &target,
        "fn",
        callback(|_, _| Ok(Value::Undefined)),
        Context::Calling,
    )
    .unwrap();
    unbound_set(&target, "fn", Value::from(3)).unwrap();
    assert_eq!(target.as_object().unwrap().get("fn"), Value::from(3));
    // A later read must not resurrect the wrapper or the old function.
    assert_eq!(unbound_get(&target, "fn").unwrap(), Value::from(3));
}

#[test]
fn unbound_accessors_reject_non_objects() {
    assert_eq!(
        unbound_get(&Value::from(1), "k").unwrap_err(),
        Error::SetGetTargetNotObjectOrFunction
    );
    assert_eq!(
        unbound_set(&Value::Undefined, "k", Value::from(1)).unwrap_err(),
        Error::SetGetTargetNotObjectOrFunction
    );
}

#[test]
fn on_get_skips_observers_whose_context_is_gone() {
    let target = Value::from(Object::new());
    target.as_object().unwrap().set("k", 5);
    let seen = new_seen();
    {
        let ctx = Value::from(Object::new());
        on_get(&target, "k", record(&seen), Context::Bind(ctx)).unwrap();
    }
    let live = new_seen();
    on_get(&target, "k", record(&live), Context::Calling).unwrap();
    unbound_get(&target, "k").unwrap();
    assert!(seen.borrow().is_empty());
    assert_eq!(live.borrow().len(), 1);
}

#[test]
fn property_observers_default_to_the_target_as_context() {
    let target = Value::from(Object::new());
    target.as_object().unwrap().set("k", 1);
    let target_clone = target.clone();
    let matched = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&matched);
    on_set(
        &target,
        "k",
        callback(move |ctx, _args| {
            *flag.borrow_mut() = *ctx == target_clone;
            Ok(Value::Undefined)
        }),
        Context::Calling,
    )
    .unwrap();
    unbound_set(&target, "k", Value::from(2)).unwrap();
    assert!(*matched.borrow());
}
