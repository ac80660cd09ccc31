#![forbid(unsafe_code)]

//! Core engine for Oversight: attach advice to functions and properties
//! without touching the code that owns them.
//!
//! Advice comes in two families:
//!
//! - **Function advice** (`before`, `after`, `around`, `afterReturn`) runs in
//!   relation to a call through an instrumented function.
//! - **Property advice** (`onGet`, `onSet`) runs when an instrumented key is
//!   read or written through [`unbound_get`] / [`unbound_set`].
//!
//! Registrations return a [`Remover`] capability; [`remove`] cancels exactly
//! the registration that produced it. Dotted paths (`"a.b.c"`) build a chain
//! that survives intermediate values being reassigned.
//!
//! The engine operates on a small single-threaded dynamic value model
//! ([`Value`] / [`Object`]); hosts build their observable graph from it.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use oversight_core::{Context, Object, Value, callback};
//!
//! let target = Value::from(Object::new());
//! let greet = Object::function(|_this, args| {
//!     Ok(args.first().cloned().unwrap_or(Value::Undefined))
//! });
//! oversight_core::unbound_set(&target, "greet", Value::from(greet)).unwrap();
//!
//! let seen = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&seen);
//! oversight_core::before(
//!     &target,
//!     "greet",
//!     callback(move |_ctx, _args| {
//!         counter.set(counter.get() + 1);
//!         Ok(Value::Undefined)
//!     }),
//!     Context::Calling,
//! )
//! .unwrap();
//!
//! let greet = target.as_object().unwrap().get("greet");
//! let out = greet.call(&target, &[Value::from("hi")]).unwrap();
//! assert_eq!(out, Value::from("hi"));
//! assert_eq!(seen.get(), 1);
//! ```

mod chain;
mod ident;
mod logging;

pub mod advice;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod joinpoint;
pub mod observers;
pub mod value;
pub mod wrap;

pub use advice::{
    add_observer, after, after_return, around, before, observe, on_get, on_set, remove,
    remove_all_observers, unbound_get, unbound_set,
};
pub use context::Context;
pub use error::{Error, Result};
pub use joinpoint::{proceed, proceed_with};
pub use observers::{Advice, AdviceCallback, Remover, callback};
pub use value::{NativeFn, Object, Value};
pub use wrap::observify;
