//! Monotonic process-wide id source for context registrations and removal
//! tokens. Ids are never reused; overflow is not a practical concern.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_REMOVAL_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_context_id() -> u64 {
    NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn next_removal_id() -> u64 {
    NEXT_REMOVAL_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strictly_increase() {
        let a = next_removal_id();
        let b = next_removal_id();
        let c = next_removal_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn namespaces_are_independent() {
        let r = next_removal_id();
        let x = next_context_id();
        let y = next_context_id();
        assert!(y > x);
        assert!(next_removal_id() > r);
    }
}
