//! Supervision scopes.
//!
//! A [`Scope`] owns a stack of finalizers and a list of extension edges to
//! other scopes. Closing a scope runs its finalizers in reverse registration
//! order with the scope's exit, then closes every scope it was extended with.
//! Every fiber has its own scope; forking a child into a scope registers a
//! finalizer that interrupts the child and waits for it.
//!
//! The runtime's global scope never closes. Fibers forked into it are daemons
//! and outlive their forker; finalizers added to it are accepted and dropped.

use crate::cx::Cx;
use crate::record::finalizer::{Finalizer, FinalizerKey, FinalizerStack};
use crate::tracing_compat::trace;
use crate::types::{BoxFuture, ErasedExit, ScopeId};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

enum ScopeState {
    Open {
        finalizers: FinalizerStack<Finalizer>,
        extensions: Vec<Scope>,
    },
    Closed(ErasedExit),
}

struct ScopeInner {
    id: ScopeId,
    global: bool,
    state: Mutex<ScopeState>,
}

/// A finalization boundary.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Scope");
        dbg.field("id", &self.inner.id)
            .field("global", &self.inner.global);
        match &*self.inner.state.lock() {
            ScopeState::Open {
                finalizers,
                extensions,
            } => dbg
                .field("finalizers", &finalizers.len())
                .field("extensions", &extensions.len()),
            ScopeState::Closed(exit) => dbg.field("closed", exit),
        };
        dbg.finish()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// Creates an open local scope.
    #[must_use]
    pub fn new() -> Self {
        Self::with_kind(false)
    }

    /// Creates a global scope. Each runtime owns exactly one.
    pub(crate) fn global() -> Self {
        Self::with_kind(true)
    }

    fn with_kind(global: bool) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: ScopeId::next(),
                global,
                state: Mutex::new(ScopeState::Open {
                    finalizers: FinalizerStack::default(),
                    extensions: Vec::new(),
                }),
            }),
        }
    }

    /// Returns the scope's identifier.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// Returns true for the runtime's global (daemon) scope.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.inner.global
    }

    /// Returns true once [`close`](Self::close) has started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(*self.inner.state.lock(), ScopeState::Closed(_))
    }

    /// The exit the scope was closed with, if closed.
    #[must_use]
    pub fn closed_exit(&self) -> Option<ErasedExit> {
        match &*self.inner.state.lock() {
            ScopeState::Closed(exit) => Some(exit.clone()),
            ScopeState::Open { .. } => None,
        }
    }

    /// Number of finalizers waiting to run.
    #[must_use]
    pub fn finalizer_count(&self) -> usize {
        match &*self.inner.state.lock() {
            ScopeState::Open { finalizers, .. } => finalizers.len(),
            ScopeState::Closed(_) => 0,
        }
    }

    /// Registers a finalizer run with the scope's exit when it closes.
    ///
    /// Returns `None` if the scope is already closed. The global scope hands
    /// back a detached key and never runs the finalizer.
    pub fn add_finalizer<F, Fut>(&self, finalizer: F) -> Option<FinalizerKey>
    where
        F: FnOnce(Cx, ErasedExit) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.inner.global {
            return Some(FinalizerKey::DETACHED);
        }
        let mut state = self.inner.state.lock();
        match &mut *state {
            ScopeState::Open { finalizers, .. } => {
                let boxed: Finalizer = Box::new(move |cx, exit| Box::pin(finalizer(cx, exit)));
                Some(finalizers.push(boxed))
            }
            ScopeState::Closed(_) => None,
        }
    }

    /// Withdraws a finalizer. Returns false if it already ran or was removed.
    pub fn remove_finalizer(&self, key: FinalizerKey) -> bool {
        if key == FinalizerKey::DETACHED {
            return false;
        }
        match &mut *self.inner.state.lock() {
            ScopeState::Open { finalizers, .. } => finalizers.remove(key),
            ScopeState::Closed(_) => false,
        }
    }

    /// Makes closing `self` also close `child`.
    ///
    /// Extending the global scope is a no-op that succeeds, since it never
    /// closes. Returns false if `self` is already closed.
    pub fn extend(&self, child: &Self) -> bool {
        if self.inner.global || self == child {
            return true;
        }
        match &mut *self.inner.state.lock() {
            ScopeState::Open { extensions, .. } => {
                extensions.push(child.clone());
                true
            }
            ScopeState::Closed(_) => false,
        }
    }

    /// Closes the scope with `exit`.
    ///
    /// Finalizers run last-registered first, then extended scopes close with
    /// the same exit. The whole close is uninterruptible. Returns false if the
    /// scope was already closed or is the global scope.
    pub fn close(&self, cx: &Cx, exit: ErasedExit) -> BoxFuture<'static, bool> {
        if self.inner.global {
            return Box::pin(async { false });
        }
        let taken = {
            let mut state = self.inner.state.lock();
            match std::mem::replace(&mut *state, ScopeState::Closed(exit.clone())) {
                ScopeState::Open {
                    finalizers,
                    extensions,
                } => Some((finalizers, extensions)),
                closed @ ScopeState::Closed(_) => {
                    *state = closed;
                    None
                }
            }
        };
        let Some((mut finalizers, extensions)) = taken else {
            return Box::pin(async { false });
        };
        trace!(
            scope = %self.inner.id,
            finalizers = finalizers.len(),
            extensions = extensions.len(),
            "closing scope"
        );
        let closer = cx.clone();
        Box::pin(cx.shielded(async move {
            for finalizer in finalizers.drain_lifo() {
                finalizer(closer.clone(), exit.clone()).await;
            }
            for child in extensions {
                child.close(&closer, exit.clone()).await;
            }
            true
        }))
    }
}
