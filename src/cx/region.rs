//! Lexically scoped fiber settings.
//!
//! A [`Region`] wraps a future and installs one fiber setting (interrupt
//! status, fork scope or parallelism) for exactly the duration of each poll of
//! that future, restoring whatever was there before when the poll returns.
//! Nested regions therefore form a stack: the innermost one wins while its
//! future is being polled, and nothing leaks outward once it completes.

use crate::record::{FiberRecord, FiberState};
use crate::scope::Scope;
use crate::types::InterruptStatus;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A setting a [`Region`] overrides.
#[derive(Debug, Clone)]
pub(crate) enum LocalOverride {
    InterruptStatus(InterruptStatus),
    ForkScope(Option<Scope>),
    Parallelism(Option<usize>),
}

impl LocalOverride {
    /// Installs `self` into `state`, returning the value it replaced.
    fn swap_into(self, state: &mut FiberState) -> Self {
        match self {
            Self::InterruptStatus(status) => {
                Self::InterruptStatus(std::mem::replace(&mut state.interrupt_status, status))
            }
            Self::ForkScope(scope) => {
                Self::ForkScope(std::mem::replace(&mut state.fork_scope, scope))
            }
            Self::Parallelism(n) => Self::Parallelism(std::mem::replace(&mut state.parallelism, n)),
        }
    }
}

/// Future that polls `inner` with a setting overridden.
#[must_use = "futures do nothing unless polled"]
pub(crate) struct Region<F> {
    record: Arc<FiberRecord>,
    value: LocalOverride,
    inner: Pin<Box<F>>,
}

impl<F> Region<F> {
    pub(crate) fn new(record: Arc<FiberRecord>, value: LocalOverride, inner: F) -> Self {
        Self {
            record,
            value,
            inner: Box::pin(inner),
        }
    }
}

impl<F: Future> Future for Region<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let value = this.value.clone();
        let previous = this.record.with_state(|state| value.swap_into(state));
        let poll = this.inner.as_mut().poll(cx);
        this.record.with_state(|state| previous.swap_into(state));
        poll
    }
}
