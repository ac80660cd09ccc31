//! The around-call stack and explicit `proceed()` continuation protocol.
//!
//! # Design
//!
//! Every invocation of a wrapped function pushes a fresh frame onto a
//! thread-local stack, so recursive calls through the same wrapper cannot
//! corrupt each other. A frame snapshots the around stack at call time
//! (outermost link first, synthetic base link last) and carries the current
//! argument list, which [`proceed_with`] may replace for the rest of the
//! chain.
//!
//! Each link's result is returned to its caller unmodified, so an around
//! observer that never proceeds short-circuits the chain and its own return
//! value becomes the call's result.
//!
//! # Invariants
//!
//! 1. Frame teardown is guard-scoped: a throwing observer or original body
//!    never leaves a stale frame behind.
//! 2. Each executing link gets exactly one continuation; a second
//!    `proceed()` from the same advice invocation fails with
//!    [`Error::ProceedCalledTwice`].
//! 3. Links whose registered context has been dropped are skipped and the
//!    walk continues with the next link.

use std::cell::RefCell;

use crate::context;
use crate::error::{Error, Result};
use crate::logging::trace;
use crate::observers::{self, Advice, AroundLink, KeySlot};
use crate::value::Value;

/// Per-invocation state of one wrapped call.
struct Frame {
    /// The receiver of the intercepted call.
    receiver: Value,
    /// Current argument list; replaced by `proceed_with`.
    args: Vec<Value>,
    /// Snapshot of the around stack, outermost first.
    stack: Vec<AroundLink>,
    /// Index of the next link to run.
    pointer: usize,
    /// Links currently on the native call stack, innermost last.
    executing: Vec<usize>,
    /// One-shot continuation permits, indexed by link.
    proceeded: Vec<bool>,
    /// Permit for the kick-off continuation issued by dispatch itself.
    root_proceeded: bool,
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

fn with_frames<R>(f: impl FnOnce(&mut Vec<Frame>) -> R) -> R {
    FRAMES.with(|frames| f(&mut frames.borrow_mut()))
}

/// Pops the owning frame when the dispatch that pushed it unwinds.
struct FrameGuard;

impl Drop for FrameGuard {
    fn drop(&mut self) {
        with_frames(|frames| {
            frames.pop();
        });
    }
}

/// Pops the `executing` marker of the link that just returned.
struct ExecGuard;

impl Drop for ExecGuard {
    fn drop(&mut self) {
        with_frames(|frames| {
            if let Some(frame) = frames.last_mut() {
                frame.executing.pop();
            }
        });
    }
}

fn enter_link(index: usize) -> Result<ExecGuard> {
    with_frames(|frames| {
        let frame = frames.last_mut().ok_or(Error::ProceedOutsideJoinpoint)?;
        frame.executing.push(index);
        Ok(ExecGuard)
    })
}

/// Entry point for calls through an observified wrapper: establish a frame
/// and kick the chain off with a single continuation.
pub(crate) fn dispatch(slot: &KeySlot, this: &Value, args: &[Value]) -> Result<Value> {
    let stack = slot.borrow().around.clone();
    let depth = stack.len();
    trace!(links = depth, "dispatching wrapped call");
    with_frames(|frames| {
        frames.push(Frame {
            receiver: this.clone(),
            args: args.to_vec(),
            stack,
            pointer: 0,
            executing: Vec::new(),
            proceeded: vec![false; depth],
            root_proceeded: false,
        });
    });
    let _guard = FrameGuard;
    proceed_inner(None)
}

/// Continue the active around chain with the current arguments.
///
/// Only legal while an around advice invocation is on the stack; the result
/// of the next link (ultimately the original function) is returned
/// unmodified.
pub fn proceed() -> Result<Value> {
    proceed_inner(None)
}

/// Continue the active around chain, replacing the argument list for this
/// and every remaining link.
pub fn proceed_with(args: impl IntoIterator<Item = Value>) -> Result<Value> {
    proceed_inner(Some(args.into_iter().collect()))
}

fn proceed_inner(new_args: Option<Vec<Value>>) -> Result<Value> {
    // Consume the caller's one-shot continuation permit and apply any
    // argument replacement before touching the chain.
    with_frames(|frames| {
        let frame = frames.last_mut().ok_or(Error::ProceedOutsideJoinpoint)?;
        match frame.executing.last().copied() {
            Some(index) => {
                if frame.proceeded[index] {
                    return Err(Error::ProceedCalledTwice);
                }
                frame.proceeded[index] = true;
            }
            None => {
                if frame.root_proceeded {
                    return Err(Error::ProceedCalledTwice);
                }
                frame.root_proceeded = true;
            }
        }
        if let Some(args) = new_args {
            frame.args = args;
        }
        Ok(())
    })?;

    loop {
        let next = with_frames(|frames| {
            let frame = frames.last_mut().ok_or(Error::ProceedOutsideJoinpoint)?;
            let index = frame.pointer;
            match frame.stack.get(index).cloned() {
                Some(link) => {
                    frame.pointer += 1;
                    Ok(Some((index, link, frame.receiver.clone(), frame.args.clone())))
                }
                None => Ok(None),
            }
        })?;
        let Some((index, link, receiver, args)) = next else {
            // Only the base link may end the chain, so running out of links
            // means the continuation came from outside the around portion
            // of the stack.
            return Err(Error::ProceedOutsideJoinpoint);
        };
        match link {
            AroundLink::Advice(entry) => {
                let Some(ctx) = context::resolve(&receiver, entry.context) else {
                    trace!(index, "skipping around link with dropped context");
                    continue;
                };
                let _guard = enter_link(index)?;
                return (entry.callback)(&ctx, &args);
            }
            AroundLink::Base(table) => {
                let Some(slot) = table.upgrade() else {
                    continue;
                };
                let _guard = enter_link(index)?;
                return run_base(&slot, &receiver, &args);
            }
        }
    }
}

/// The synthetic innermost handler: before phase (newest first), original
/// body, after phase, then afterReturn with the return value prepended to
/// the argument list. Yields the original's return value.
fn run_base(slot: &KeySlot, receiver: &Value, args: &[Value]) -> Result<Value> {
    observers::fire(slot, Advice::Before, receiver, args, true)?;
    let original = slot.borrow().original.clone();
    let returned = match original {
        Some(function) => function.call(receiver, args)?,
        None => Value::Undefined,
    };
    observers::fire(slot, Advice::After, receiver, args, false)?;
    let mut with_return = Vec::with_capacity(args.len() + 1);
    with_return.push(returned.clone());
    with_return.extend_from_slice(args);
    observers::fire(slot, Advice::AfterReturn, receiver, &with_return, false)?;
    Ok(returned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proceed_outside_any_frame_fails() {
        assert_eq!(proceed().unwrap_err(), Error::ProceedOutsideJoinpoint);
    }

    #[test]
    fn frames_are_torn_down_after_errors() {
        use crate::observers::{KeyObservers, ensure_base};
        use crate::value::Object;
        use std::rc::Rc;

        let failing = Object::function(|_this, _args| Err(Error::TargetNotCallable));
        let slot: KeySlot = Rc::new(RefCell::new(KeyObservers {
            original: Some(Value::from(failing)),
            ..KeyObservers::default()
        }));
        ensure_base(&slot);
        let err = dispatch(&slot, &Value::Undefined, &[]).unwrap_err();
        assert_eq!(err, Error::TargetNotCallable);
        // The frame must be gone, so proceed is outside a joinpoint again.
        assert_eq!(proceed().unwrap_err(), Error::ProceedOutsideJoinpoint);
    }
}
