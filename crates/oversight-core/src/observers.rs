//! Per-target observer bookkeeping: advice kinds, entries, removal tokens,
//! and the per-key table shared between a target and its wrapper.
//!
//! # Invariants
//!
//! 1. An entry lives in exactly one advice list of exactly one target/key
//!    pair and is located by removal id, never by identity.
//! 2. Removal preserves the relative order of surviving entries.
//! 3. The around stack keeps its synthetic base link innermost (last);
//!    re-wrapping overwrites the base link, it never stacks a second one.
//! 4. Dispatch tolerates an observer removing itself (or a sibling) while
//!    the list is being walked: removed observers do not fire, survivors
//!    fire exactly once.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::chain::ChainNode;
use crate::context::{self, Binding};
use crate::error::Result;
use crate::value::Value;

/// An advice callback: receives the resolved context and the call (or
/// access) arguments.
pub type AdviceCallback = Rc<dyn Fn(&Value, &[Value]) -> Result<Value>>;

/// Build an [`AdviceCallback`] from a closure.
pub fn callback(f: impl Fn(&Value, &[Value]) -> Result<Value> + 'static) -> AdviceCallback {
    Rc::new(f)
}

/// The kind of a registered advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Advice {
    Before,
    After,
    Around,
    AfterReturn,
    OnGet,
    OnSet,
}

impl Advice {
    /// Function advice runs in relation to a call.
    #[must_use]
    pub fn is_function_advice(self) -> bool {
        matches!(
            self,
            Advice::Before | Advice::After | Advice::Around | Advice::AfterReturn
        )
    }

    /// Property advice runs in relation to an unbound get or set.
    #[must_use]
    pub fn is_property_advice(self) -> bool {
        matches!(self, Advice::OnGet | Advice::OnSet)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Advice::Before => "before",
            Advice::After => "after",
            Advice::Around => "around",
            Advice::AfterReturn => "afterReturn",
            Advice::OnGet => "onGet",
            Advice::OnSet => "onSet",
        }
    }
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque capability returned from a registration; hand it back to
/// [`remove`](crate::remove) to cancel exactly that registration.
#[derive(Debug, Clone)]
pub struct Remover {
    pub(crate) removal_id: u64,
    pub(crate) advice: Advice,
    pub(crate) key: Option<String>,
}

impl Remover {
    /// Process-wide unique id of the registration.
    #[must_use]
    pub fn removal_id(&self) -> u64 {
        self.removal_id
    }

    #[must_use]
    pub fn advice(&self) -> Advice {
        self.advice
    }

    /// The advised key; `None` for free-function advice.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

/// One registered observer.
#[derive(Clone)]
pub(crate) struct ObserverEntry {
    pub(crate) removal_id: u64,
    pub(crate) callback: AdviceCallback,
    pub(crate) context: Binding,
}

/// One link of the around stack.
#[derive(Clone)]
pub(crate) enum AroundLink {
    /// A registered around observer.
    Advice(ObserverEntry),
    /// The synthetic innermost handler: before phase, original body, after
    /// and afterReturn phases. Weak to its own table to avoid a cycle.
    Base(Weak<RefCell<KeyObservers>>),
}

/// Per-key observer table. Shared (`KeySlot`) between the owning target's
/// hidden meta and the wrapper dispatching through it.
#[derive(Default)]
pub(crate) struct KeyObservers {
    pub(crate) before: Vec<ObserverEntry>,
    pub(crate) after: Vec<ObserverEntry>,
    pub(crate) after_return: Vec<ObserverEntry>,
    pub(crate) on_get: Vec<ObserverEntry>,
    pub(crate) on_set: Vec<ObserverEntry>,
    /// Around links, outermost first, base link last.
    pub(crate) around: Vec<AroundLink>,
    /// The unwrapped function value for a function-advised key.
    pub(crate) original: Option<Value>,
}

pub(crate) type KeySlot = Rc<RefCell<KeyObservers>>;

impl KeyObservers {
    pub(crate) fn list(&self, advice: Advice) -> Option<&[ObserverEntry]> {
        match advice {
            Advice::Before => Some(&self.before),
            Advice::After => Some(&self.after),
            Advice::AfterReturn => Some(&self.after_return),
            Advice::OnGet => Some(&self.on_get),
            Advice::OnSet => Some(&self.on_set),
            Advice::Around => None,
        }
    }

    fn list_mut(&mut self, advice: Advice) -> Option<&mut Vec<ObserverEntry>> {
        match advice {
            Advice::Before => Some(&mut self.before),
            Advice::After => Some(&mut self.after),
            Advice::AfterReturn => Some(&mut self.after_return),
            Advice::OnGet => Some(&mut self.on_get),
            Advice::OnSet => Some(&mut self.on_set),
            Advice::Around => None,
        }
    }

    pub(crate) fn add(&mut self, advice: Advice, entry: ObserverEntry) {
        match advice {
            // Newest around advice runs closest to the caller.
            Advice::Around => self.around.insert(0, AroundLink::Advice(entry)),
            _ => {
                if let Some(list) = self.list_mut(advice) {
                    list.push(entry);
                }
            }
        }
    }

    /// Remove every entry matching `removal_id`, scanning from the end so
    /// in-place splicing cannot skip survivors. Silent no-op when nothing
    /// matches.
    pub(crate) fn remove_by_id(&mut self, advice: Advice, removal_id: u64) {
        match advice {
            Advice::Around => {
                let mut i = self.around.len();
                while i > 0 {
                    i -= 1;
                    if let AroundLink::Advice(entry) = &self.around[i]
                        && entry.removal_id == removal_id
                    {
                        self.around.remove(i);
                    }
                }
            }
            _ => {
                if let Some(list) = self.list_mut(advice) {
                    let mut i = list.len();
                    while i > 0 {
                        i -= 1;
                        if list[i].removal_id == removal_id {
                            list.remove(i);
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn count(&self, advice: Advice) -> usize {
        match advice {
            Advice::Around => self
                .around
                .iter()
                .filter(|l| matches!(l, AroundLink::Advice(_)))
                .count(),
            _ => self.list(advice).map_or(0, <[ObserverEntry]>::len),
        }
    }
}

/// Install (or refresh) the synthetic base link as the innermost entry of
/// the around stack.
pub(crate) fn ensure_base(slot: &KeySlot) {
    let base = AroundLink::Base(Rc::downgrade(slot));
    let mut table = slot.borrow_mut();
    match table.around.last_mut() {
        Some(link @ AroundLink::Base(_)) => *link = base,
        _ => table.around.push(base),
    }
}

/// Hidden per-object instrumentation record.
#[derive(Default)]
pub(crate) struct ObserverMeta {
    /// Context-registry id minted for this object, if any.
    pub(crate) context_id: Option<u64>,
    /// Per-key observer tables.
    pub(crate) keys: AHashMap<String, KeySlot>,
    /// Chain segments registered at this object.
    pub(crate) chains: Vec<ChainNode>,
}

/// Fire one advice list. `newest_first` selects LIFO order (the `before`
/// phase); everything else fires in registration order.
///
/// The list is snapshotted, then each entry is re-checked for membership
/// just before it fires, so observers removed mid-dispatch stay silent and
/// survivors fire exactly once. Observers whose registered context has been
/// dropped are skipped. Errors abort the remaining phase and propagate.
pub(crate) fn fire(
    slot: &KeySlot,
    advice: Advice,
    receiver: &Value,
    args: &[Value],
    newest_first: bool,
) -> Result<()> {
    let mut snapshot: Vec<ObserverEntry> = {
        let table = slot.borrow();
        match table.list(advice) {
            Some(list) => list.to_vec(),
            None => return Ok(()),
        }
    };
    if newest_first {
        snapshot.reverse();
    }
    for entry in snapshot {
        let live = {
            let table = slot.borrow();
            table.list(advice).is_some_and(|list| {
                list.iter().any(|e| e.removal_id == entry.removal_id)
            })
        };
        if !live {
            continue;
        }
        let Some(ctx) = context::resolve(receiver, entry.context) else {
            continue;
        };
        (entry.callback)(&ctx, args)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn entry(id: u64) -> ObserverEntry {
        ObserverEntry {
            removal_id: id,
            callback: callback(|_, _| Ok(Value::Undefined)),
            context: Binding::Calling,
        }
    }

    #[test]
    fn removal_preserves_order_of_survivors() {
        let mut table = KeyObservers::default();
        for id in 0..4 {
            table.add(Advice::After, entry(id));
        }
        table.remove_by_id(Advice::After, 1);
        let ids: Vec<u64> = table.after.iter().map(|e| e.removal_id).collect();
        assert_eq!(ids, vec![0, 2, 3]);
    }

    #[test]
    fn removal_deletes_every_matching_entry() {
        let mut table = KeyObservers::default();
        table.add(Advice::Before, entry(7));
        table.add(Advice::Before, entry(8));
        table.add(Advice::Before, entry(7));
        table.remove_by_id(Advice::Before, 7);
        let ids: Vec<u64> = table.before.iter().map(|e| e.removal_id).collect();
        assert_eq!(ids, vec![8]);
    }

    #[test]
    fn around_entries_go_outermost_and_base_stays_last() {
        let slot: KeySlot = Rc::new(RefCell::new(KeyObservers::default()));
        ensure_base(&slot);
        slot.borrow_mut().add(Advice::Around, entry(1));
        slot.borrow_mut().add(Advice::Around, entry(2));
        let table = slot.borrow();
        assert_eq!(table.around.len(), 3);
        assert!(matches!(&table.around[0], AroundLink::Advice(e) if e.removal_id == 2));
        assert!(matches!(&table.around[1], AroundLink::Advice(e) if e.removal_id == 1));
        assert!(matches!(table.around[2], AroundLink::Base(_)));
    }

    #[test]
    fn ensure_base_overwrites_instead_of_stacking() {
        let slot: KeySlot = Rc::new(RefCell::new(KeyObservers::default()));
        ensure_base(&slot);
        ensure_base(&slot);
        assert_eq!(slot.borrow().around.len(), 1);
    }

    #[test]
    fn base_link_is_never_removed_by_id() {
        let slot: KeySlot = Rc::new(RefCell::new(KeyObservers::default()));
        ensure_base(&slot);
        slot.borrow_mut().add(Advice::Around, entry(3));
        slot.borrow_mut().remove_by_id(Advice::Around, 3);
        let table = slot.borrow();
        assert_eq!(table.around.len(), 1);
        assert!(matches!(table.around[0], AroundLink::Base(_)));
    }
}
