//! The fixed catalog of failure conditions.
//!
//! Every condition is raised synchronously at the point of misuse and
//! propagates to the immediate caller; nothing is caught or retried
//! internally. Observer callback errors are never suppressed either — they
//! travel through the dispatch chain exactly as if the advice were inlined
//! at the call site.

use thiserror::Error;

use crate::observers::Advice;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Free-function advice registration on a function that was never passed
    /// through [`observify`](crate::observify).
    #[error(
        "target is not observable; pass free functions through `observify` \
         and register advice on the returned wrapper"
    )]
    TargetNotObservable,

    /// A free function only accepts function advice.
    #[error(
        "invalid advice for a free function: {0}; free functions accept \
         before, after, around and afterReturn"
    )]
    InvalidFreeFunctionAdvice(Advice),

    /// The advice kind is outside the legal set for a targeted registration.
    #[error("invalid advice for a targeted registration: {0}")]
    InvalidTargetFunctionAdvice(Advice),

    /// The advised target is neither an object nor a function.
    #[error("the target of an observer registration must be an object or a function")]
    TargetNotObjectOrFunction,

    /// `unbound_get` / `unbound_set` on a non-object target.
    #[error("the target of an unbound get or set must be an object or a function")]
    SetGetTargetNotObjectOrFunction,

    /// No callback supplied to a registration call.
    #[error("a callback is required for every observer registration")]
    MissingCallback,

    /// The value is not invocable.
    #[error("the value is not callable")]
    TargetNotCallable,

    /// `proceed()` invoked with no active around frame.
    #[error("proceed() cannot be called outside of an around advice invocation")]
    ProceedOutsideJoinpoint,

    /// `proceed()` invoked a second time within the same advice invocation.
    #[error("proceed() cannot be called twice from the same advice invocation")]
    ProceedCalledTwice,
}
