#![forbid(unsafe_code)]

//! Oversight public facade crate.
//!
//! Attach advice (`before`, `after`, `around`, `afterReturn` for calls;
//! `onGet`, `onSet` for properties) to functions and object properties —
//! dotted paths included — without modifying the advised code. See
//! [`oversight_core`] for the engine itself.

pub use oversight_core::{
    Advice, AdviceCallback, Context, Error, NativeFn, Object, Remover, Result, Value,
    add_observer, after, after_return, around, before, callback, observe, observify, on_get,
    on_set, proceed, proceed_with, remove, remove_all_observers, unbound_get, unbound_set,
};

pub mod prelude {
    pub use oversight_core::{
        Advice, Context, Object, Remover, Value, after, after_return, around, before, callback,
        observe, observify, on_get, on_set, proceed, proceed_with, remove, unbound_get,
        unbound_set,
    };
}

pub mod diagnostics {
    pub use oversight_core::diagnostics::*;
}
