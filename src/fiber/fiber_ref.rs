//! Fiber-local references.
//!
//! A [`FiberRef`] is a handle to a value that every fiber sees its own copy of.
//! Forking copies the parent's values through the ref's `fork` function; joining
//! a child merges its values back through `join`.
//!
//! Values are stored type-erased in [`FiberRefs`], a per-fiber map keyed by
//! [`FiberRefId`]. Each entry carries its own `fork` and `join` so maps can be
//! merged without knowing the value types.

use crate::types::FiberRefId;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type ErasedValue = Arc<dyn Any + Send + Sync>;
type ErasedFork = Arc<dyn Fn(&ErasedValue) -> ErasedValue + Send + Sync>;
type ErasedJoin = Arc<dyn Fn(&ErasedValue, &ErasedValue) -> ErasedValue + Send + Sync>;

/// A handle to a fiber-local value of type `V`.
pub struct FiberRef<V> {
    id: FiberRefId,
    initial: V,
    fork: Arc<dyn Fn(&V) -> V + Send + Sync>,
    join: Arc<dyn Fn(&V, &V) -> V + Send + Sync>,
}

impl<V: Clone> Clone for FiberRef<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            initial: self.initial.clone(),
            fork: Arc::clone(&self.fork),
            join: Arc::clone(&self.join),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for FiberRef<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberRef")
            .field("id", &self.id)
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

impl<V> FiberRef<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// A ref whose children start with a copy of the parent's value and whose
    /// joins keep the child's value.
    #[must_use]
    pub fn new(initial: V) -> Self {
        Self::with_combinators(initial, V::clone, |_, child| child.clone())
    }

    /// A ref with explicit `fork` and `join` functions.
    ///
    /// `join(parent, child)` should be associative.
    #[must_use]
    pub fn with_combinators<F, J>(initial: V, fork: F, join: J) -> Self
    where
        F: Fn(&V) -> V + Send + Sync + 'static,
        J: Fn(&V, &V) -> V + Send + Sync + 'static,
    {
        Self {
            id: FiberRefId::next(),
            initial,
            fork: Arc::new(fork),
            join: Arc::new(join),
        }
    }

    /// Returns the ref's identifier.
    #[must_use]
    pub const fn id(&self) -> FiberRefId {
        self.id
    }

    /// Returns the value seen by fibers that never set this ref.
    #[must_use]
    pub const fn initial(&self) -> &V {
        &self.initial
    }

    /// Merges two values through this ref's `join`.
    #[must_use]
    pub fn join(&self, parent: &V, child: &V) -> V {
        (self.join)(parent, child)
    }

    fn entry(&self, value: V) -> RefEntry {
        let fork = Arc::clone(&self.fork);
        let join = Arc::clone(&self.join);
        RefEntry {
            value: Arc::new(value),
            initial: Arc::new(self.initial.clone()),
            fork: Arc::new(move |v: &ErasedValue| -> ErasedValue {
                match v.downcast_ref::<V>() {
                    Some(v) => Arc::new(fork(v)),
                    None => Arc::clone(v),
                }
            }),
            join: Arc::new(move |parent: &ErasedValue, child: &ErasedValue| -> ErasedValue {
                match (parent.downcast_ref::<V>(), child.downcast_ref::<V>()) {
                    (Some(p), Some(c)) => Arc::new(join(p, c)),
                    _ => Arc::clone(child),
                }
            }),
        }
    }
}

#[derive(Clone)]
struct RefEntry {
    value: ErasedValue,
    initial: ErasedValue,
    fork: ErasedFork,
    join: ErasedJoin,
}

impl RefEntry {
    fn with_value(&self, value: ErasedValue) -> Self {
        Self {
            value,
            initial: Arc::clone(&self.initial),
            fork: Arc::clone(&self.fork),
            join: Arc::clone(&self.join),
        }
    }
}

/// A snapshot of one fiber's fiber-local values.
#[derive(Clone, Default)]
pub struct FiberRefs {
    entries: BTreeMap<FiberRefId, RefEntry>,
}

impl fmt::Debug for FiberRefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl FiberRefs {
    /// Reads `fiber_ref`, falling back to its initial value.
    #[must_use]
    pub fn get<V>(&self, fiber_ref: &FiberRef<V>) -> V
    where
        V: Clone + Send + Sync + 'static,
    {
        self.entries
            .get(&fiber_ref.id)
            .and_then(|entry| entry.value.downcast_ref::<V>())
            .cloned()
            .unwrap_or_else(|| fiber_ref.initial.clone())
    }

    /// Number of refs with a stored value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no ref has a stored value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn set<V>(&mut self, fiber_ref: &FiberRef<V>, value: V)
    where
        V: Clone + Send + Sync + 'static,
    {
        self.entries.insert(fiber_ref.id, fiber_ref.entry(value));
    }

    /// The values a freshly forked child starts with.
    pub(crate) fn forked(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(id, entry)| (*id, entry.with_value((entry.fork)(&entry.value))))
            .collect();
        Self { entries }
    }

    /// Merges a child's values into `self` with each ref's `join`.
    pub(crate) fn inherit(&mut self, child: &Self) {
        for (id, child_entry) in &child.entries {
            let parent_value = self
                .entries
                .get(id)
                .map_or_else(|| Arc::clone(&child_entry.initial), |e| Arc::clone(&e.value));
            let joined = (child_entry.join)(&parent_value, &child_entry.value);
            self.entries.insert(*id, child_entry.with_value(joined));
        }
    }

    /// Merges two sibling snapshots with each ref's `join`, left to right.
    pub(crate) fn combine(&self, right: &Self) -> Self {
        let mut merged = self.clone();
        for (id, right_entry) in &right.entries {
            let value = match merged.entries.get(id) {
                Some(left_entry) => (right_entry.join)(&left_entry.value, &right_entry.value),
                None => Arc::clone(&right_entry.value),
            };
            merged.entries.insert(*id, right_entry.with_value(value));
        }
        merged
    }
}
