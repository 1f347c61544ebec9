//! Finalizer storage for scopes.
//!
//! Finalizers are kept in registration order and run in reverse (LIFO), so
//! cleanup unwinds in the opposite order of setup. Each entry has a
//! [`FinalizerKey`] so its owner can withdraw it before the scope closes.

use crate::cx::Cx;
use crate::types::{BoxFuture, ErasedExit};

/// A scope finalizer: receives the closing fiber's context and the scope's exit.
pub(crate) type Finalizer = Box<dyn FnOnce(Cx, ErasedExit) -> BoxFuture<'static, ()> + Send>;

/// Handle to a registered finalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FinalizerKey(u64);

impl FinalizerKey {
    /// Key handed out by scopes that never close.
    pub(crate) const DETACHED: Self = Self(u64::MAX);
}

/// A stack of finalizers with keyed removal.
#[derive(Debug)]
pub(crate) struct FinalizerStack<F> {
    entries: Vec<(FinalizerKey, F)>,
    next_key: u64,
}

impl<F> Default for FinalizerStack<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_key: 0,
        }
    }
}

impl<F> FinalizerStack<F> {
    /// Pushes a finalizer, returning its key.
    pub(crate) fn push(&mut self, finalizer: F) -> FinalizerKey {
        let key = FinalizerKey(self.next_key);
        self.next_key += 1;
        self.entries.push((key, finalizer));
        key
    }

    /// Removes the finalizer with `key`. Returns false if it is not present.
    pub(crate) fn remove(&mut self, key: FinalizerKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.len() != before
    }

    /// Empties the stack, returning finalizers in the order they must run.
    pub(crate) fn drain_lifo(&mut self) -> Vec<F> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .rev()
            .map(|(_, f)| f)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
