//! Property-path chains: observer "memory" for dotted paths.
//!
//! A chain node represents one slot of a path like `"a.b.c"` — not the
//! object currently occupying it. Interior nodes register themselves in the
//! occupying object's chain list so a reassignment of their key can be
//! detected; the final node attaches the requested advice. On reassignment
//! the subtree below the written key is destroyed against the old value
//! before being recreated against the new one, so two generations of the
//! same path never coexist. Creation stops quietly at the first missing
//! link and resumes when a value arrives.

use std::cell::RefCell;
use std::rc::Rc;

use crate::advice;
use crate::context::Binding;
use crate::error::Result;
use crate::logging::trace;
use crate::observers::{Advice, AdviceCallback, Remover};
use crate::value::Value;

struct ChainData {
    /// Full path, shared by every node of the chain.
    path: Rc<[String]>,
    advice: Advice,
    callback: AdviceCallback,
    context: Binding,
    /// Shared remover; the final node attaches advice under its id.
    remover: Remover,
    /// This node's position in the path.
    depth: usize,
    next: Option<ChainNode>,
}

/// One linked-list node of a chain.
#[derive(Clone)]
pub(crate) struct ChainNode {
    inner: Rc<RefCell<ChainData>>,
}

impl ChainNode {
    pub(crate) fn new(
        path: Rc<[String]>,
        advice: Advice,
        callback: AdviceCallback,
        context: Binding,
        remover: Remover,
        depth: usize,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ChainData {
                path,
                advice,
                callback,
                context,
                remover,
                depth,
                next: None,
            })),
        }
    }

    pub(crate) fn ptr_eq(&self, other: &ChainNode) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this node watches `key` at its position in the path.
    pub(crate) fn matches(&self, key: &str) -> bool {
        let data = self.inner.borrow();
        data.path[data.depth] == key
    }

    pub(crate) fn depth(&self) -> usize {
        self.inner.borrow().depth
    }

    pub(crate) fn removal_id(&self) -> u64 {
        self.inner.borrow().remover.removal_id
    }

    pub(crate) fn next(&self) -> Option<ChainNode> {
        self.inner.borrow().next.clone()
    }

    /// Instrument `value` for this node and everything below it. No-op on
    /// non-objects: the rest of the chain is deferred until a value exists.
    pub(crate) fn walk_and_create(&self, value: &Value) -> Result<()> {
        let Value::Object(target) = value else {
            return Ok(());
        };
        let (path, advice, callback, context, remover, depth) = {
            let data = self.inner.borrow();
            (
                Rc::clone(&data.path),
                data.advice,
                Rc::clone(&data.callback),
                data.context,
                data.remover.clone(),
                data.depth,
            )
        };
        let key = &path[depth];
        if depth == path.len() - 1 {
            advice::attach_keyed(target, key, advice, callback, context, remover.removal_id)
        } else {
            target.ensure_key_slot(key);
            target.with_meta(|meta| meta.chains.push(self.clone()));
            trace!(depth, "registered chain segment");
            let next = ChainNode::new(path.clone(), advice, callback, context, remover, depth + 1);
            self.inner.borrow_mut().next = Some(next.clone());
            next.walk_and_create(&target.get(key))
        }
    }

    /// Tear this node and everything below it out of `value`. No-op on
    /// non-objects; never disturbs other chains registered at the same key.
    pub(crate) fn walk_and_destroy(&self, value: &Value) {
        let Value::Object(target) = value else {
            return;
        };
        let (path, remover, depth, next) = {
            let data = self.inner.borrow();
            (
                Rc::clone(&data.path),
                data.remover.clone(),
                data.depth,
                data.next.clone(),
            )
        };
        let key = &path[depth];
        if depth == path.len() - 1 {
            advice::remove(&Value::Object(target.clone()), &remover);
        } else {
            target.with_meta(|meta| meta.chains.retain(|node| !node.ptr_eq(self)));
            if let Some(next) = next {
                next.walk_and_destroy(&target.get(key));
            }
        }
    }
}
