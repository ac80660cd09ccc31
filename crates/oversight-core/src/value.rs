//! Single-threaded dynamic value model the engine instruments.
//!
//! # Design
//!
//! [`Object`] is a cheap handle (`Rc<RefCell<..>>`) to shared object state.
//! An object owns its enumerable properties, an optional prototype link, an
//! optional [`Callable`] making it invocable, and an optional hidden
//! instrumentation record. The record lives outside the property map, so
//! bookkeeping never shows up in enumeration.
//!
//! Whether a callable is instrumented is a tagged variant
//! ([`Callable::Plain`] vs [`Callable::Observified`]), not a boolean probed
//! across the codebase: the `Observified` arm carries the shared observer
//! table that dispatch, removal and get-transparency all key off.
//!
//! # Invariants
//!
//! 1. Object equality is identity (`Rc::ptr_eq`); scalar equality is
//!    structural.
//! 2. A wrapper and the target it instruments share one observer table; the
//!    table is never duplicated by re-wrapping.
//! 3. `get` walks the prototype chain; `set` always writes an own property.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::error::{Error, Result};
use crate::observers::{KeySlot, ObserverMeta};

/// A host-supplied native function body.
pub type NativeFn = Rc<dyn Fn(&Value, &[Value]) -> Result<Value>>;

/// What happens when an object is invoked.
#[derive(Clone)]
pub(crate) enum Callable {
    /// An uninstrumented function body.
    Plain(NativeFn),
    /// A wrapper dispatching through the joinpoint; carries the shared
    /// observer table holding the original body and the around stack.
    Observified(KeySlot),
}

pub(crate) struct ObjectData {
    pub(crate) props: AHashMap<String, Value>,
    pub(crate) proto: Option<Object>,
    pub(crate) call: Option<Callable>,
    /// Hidden instrumentation record; invisible to property enumeration.
    pub(crate) meta: Option<Box<ObserverMeta>>,
}

/// Handle to a shared dynamic object. Cloning clones the handle, not the
/// object.
#[derive(Clone)]
pub struct Object {
    inner: Rc<RefCell<ObjectData>>,
}

impl Object {
    /// Create an empty object with no prototype.
    #[must_use]
    pub fn new() -> Self {
        Self::with_proto(None)
    }

    pub(crate) fn with_proto(proto: Option<Object>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObjectData {
                props: AHashMap::new(),
                proto,
                call: None,
                meta: None,
            })),
        }
    }

    /// Create a callable object from a native function body.
    ///
    /// Like any constructor-capable function it starts with a fresh
    /// `prototype` own-property; instances built through
    /// [`construct`](Object::construct) link to that object.
    #[must_use]
    pub fn function(body: impl Fn(&Value, &[Value]) -> Result<Value> + 'static) -> Self {
        let obj = Self::new();
        obj.set("prototype", Value::Object(Object::new()));
        obj.inner.borrow_mut().call = Some(Callable::Plain(Rc::new(body)));
        obj
    }

    pub(crate) fn from_inner(inner: Rc<RefCell<ObjectData>>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<ObjectData>> {
        Rc::downgrade(&self.inner)
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a property, walking the prototype chain. Uninstrumented raw
    /// access; interception goes through
    /// [`unbound_get`](crate::unbound_get).
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        let mut current = self.clone();
        loop {
            let (found, proto) = {
                let data = current.inner.borrow();
                (data.props.get(key).cloned(), data.proto.clone())
            };
            if let Some(value) = found {
                return value;
            }
            match proto {
                Some(next) => current = next,
                None => return Value::Undefined,
            }
        }
    }

    /// Read an own property without touching the prototype chain.
    #[must_use]
    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.inner.borrow().props.get(key).cloned()
    }

    /// Write an own property. Uninstrumented raw access; interception goes
    /// through [`unbound_set`](crate::unbound_set).
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.inner
            .borrow_mut()
            .props
            .insert(key.to_owned(), value.into());
    }

    /// Enumerable own property names. Hidden instrumentation never appears
    /// here.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().props.keys().cloned().collect()
    }

    pub(crate) fn own_props(&self) -> Vec<(String, Value)> {
        self.inner
            .borrow()
            .props
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn proto(&self) -> Option<Object> {
        self.inner.borrow().proto.clone()
    }

    /// Whether the object can be invoked.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        self.inner.borrow().call.is_some()
    }

    pub(crate) fn callable(&self) -> Option<Callable> {
        self.inner.borrow().call.clone()
    }

    pub(crate) fn set_callable(&self, callable: Callable) {
        self.inner.borrow_mut().call = Some(callable);
    }

    /// The shared observer table of an observified callable.
    pub(crate) fn callable_slot(&self) -> Option<KeySlot> {
        match self.inner.borrow().call {
            Some(Callable::Observified(ref slot)) => Some(Rc::clone(slot)),
            _ => None,
        }
    }

    pub(crate) fn is_observified(&self) -> bool {
        matches!(self.inner.borrow().call, Some(Callable::Observified(_)))
    }

    /// Invoke the object with an explicit receiver.
    ///
    /// Plain callables run directly; observified callables dispatch through
    /// the joinpoint so attached advice fires.
    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        let callable = self.callable();
        match callable {
            Some(Callable::Plain(body)) => body(this, args),
            Some(Callable::Observified(slot)) => crate::joinpoint::dispatch(&slot, this, args),
            None => Err(Error::TargetNotCallable),
        }
    }

    /// Construct an instance: a fresh object whose prototype is this
    /// function's `prototype` property, with the function body run against
    /// it. An object return value replaces the fresh instance.
    pub fn construct(&self, args: &[Value]) -> Result<Value> {
        let proto = match self.get("prototype") {
            Value::Object(p) => Some(p),
            _ => None,
        };
        let instance = Object::with_proto(proto);
        let receiver = Value::Object(instance);
        let returned = self.call(&receiver, args)?;
        match returned {
            Value::Object(_) => Ok(returned),
            _ => Ok(receiver),
        }
    }

    /// Run `f` against the instrumentation record, creating it on demand.
    pub(crate) fn with_meta<R>(&self, f: impl FnOnce(&mut ObserverMeta) -> R) -> R {
        let mut data = self.inner.borrow_mut();
        let meta = data.meta.get_or_insert_with(Box::default);
        f(meta)
    }

    /// Run `f` against the instrumentation record if one exists.
    pub(crate) fn meta<R>(&self, f: impl FnOnce(&ObserverMeta) -> R) -> Option<R> {
        let data = self.inner.borrow();
        data.meta.as_deref().map(f)
    }

    pub(crate) fn clear_meta(&self) {
        self.inner.borrow_mut().meta = None;
    }

    /// The observer table for `key`, if the key is instrumented.
    pub(crate) fn key_slot(&self, key: &str) -> Option<KeySlot> {
        self.meta(|m| m.keys.get(key).map(Rc::clone)).flatten()
    }

    /// Idempotently create the observer table for `key`.
    pub(crate) fn ensure_key_slot(&self, key: &str) -> KeySlot {
        self.with_meta(|m| Rc::clone(m.keys.entry(key.to_owned()).or_default()))
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.borrow();
        f.debug_struct("Object")
            .field("props", &data.props.len())
            .field("callable", &data.call.is_some())
            .field("instrumented", &data.meta.is_some())
            .finish()
    }
}

/// A dynamically typed value. Cloning is cheap: scalars copy, strings and
/// objects clone handles.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Object(Object),
}

impl Value {
    /// The object behind this value, if it is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Whether the value is an invocable object.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(Object::is_callable)
    }

    /// Whether the value is a joinpoint-dispatching wrapper.
    #[must_use]
    pub fn is_observified(&self) -> bool {
        self.as_object().is_some_and(Object::is_observified)
    }

    /// Invoke the value with an explicit receiver.
    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        match self.as_object() {
            Some(obj) => obj.call(this, args),
            None => Err(Error::TargetNotCallable),
        }
    }

    /// Construct an instance through the value (see [`Object::construct`]).
    pub fn construct(&self, args: &[Value]) -> Result<Value> {
        match self.as_object() {
            Some(obj) => obj.construct(args),
            None => Err(Error::TargetNotCallable),
        }
    }

    /// Whether this value's prototype chain contains `ctor`'s `prototype`
    /// object.
    #[must_use]
    pub fn instance_of(&self, ctor: &Object) -> bool {
        let Value::Object(proto) = ctor.get("prototype") else {
            return false;
        };
        let Some(obj) = self.as_object() else {
            return false;
        };
        let mut current = obj.proto();
        while let Some(link) = current {
            if link.ptr_eq(&proto) {
                return true;
            }
            current = link.proto();
        }
        false
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(obj) => obj.fmt(f),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v.as_str()))
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_walks_prototype_chain() {
        let proto = Object::new();
        proto.set("answer", 42);
        let obj = Object::with_proto(Some(proto.clone()));
        assert_eq!(obj.get("answer"), Value::from(42));
        assert_eq!(obj.get_own("answer"), None);
        obj.set("answer", 7);
        assert_eq!(obj.get("answer"), Value::from(7));
        assert_eq!(proto.get("answer"), Value::from(42));
    }

    #[test]
    fn object_equality_is_identity() {
        let a = Object::new();
        let b = a.clone();
        let c = Object::new();
        assert_eq!(Value::from(a), Value::from(b));
        assert_ne!(Value::Object(c), Value::Undefined);
    }

    #[test]
    fn call_plain_function() {
        let double = Object::function(|_this, args| {
            let n = args.first().and_then(Value::as_int).unwrap_or(0);
            Ok(Value::from(n * 2))
        });
        let out = double.call(&Value::Undefined, &[Value::from(21)]).unwrap();
        assert_eq!(out, Value::from(42));
    }

    #[test]
    fn call_non_callable_fails() {
        let obj = Object::new();
        let err = obj.call(&Value::Undefined, &[]).unwrap_err();
        assert_eq!(err, Error::TargetNotCallable);
    }

    #[test]
    fn construct_links_prototype_and_runs_body() {
        let ctor = Object::function(|this, args| {
            if let Some(obj) = this.as_object() {
                obj.set("x", args.first().cloned().unwrap_or(Value::Undefined));
            }
            Ok(Value::Undefined)
        });
        if let Value::Object(proto) = ctor.get("prototype") {
            proto.set("tag", "instance");
        }
        let inst = ctor.construct(&[Value::from(5)]).unwrap();
        assert!(inst.instance_of(&ctor));
        let obj = inst.as_object().unwrap();
        assert_eq!(obj.get_own("x"), Some(Value::from(5)));
        assert_eq!(obj.get("tag"), Value::from("instance"));
    }

    #[test]
    fn construct_object_return_overrides_instance() {
        let other = Object::new();
        other.set("marker", true);
        let replaced = other.clone();
        let ctor = Object::function(move |_this, _args| Ok(Value::Object(replaced.clone())));
        let inst = ctor.construct(&[]).unwrap();
        assert!(inst.as_object().unwrap().ptr_eq(&other));
    }

    #[test]
    fn keys_never_show_instrumentation() {
        let obj = Object::new();
        obj.set("visible", 1);
        obj.ensure_key_slot("visible");
        let keys = obj.keys();
        assert_eq!(keys, vec!["visible".to_owned()]);
    }
}
