//! Stored fiber type for runtime future storage.
//!
//! `StoredFiber` wraps the type-erased driver future of one fiber. The driver
//! has already been wired to complete the fiber's promise, so its output is
//! `()`. [`CatchUnwind`] turns a panic in a fiber body into a [`Defect`].

use crate::tracing_compat::trace;
use crate::types::{Defect, FiberId};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

/// A type-erased fiber driver stored in the runtime.
pub(crate) struct StoredFiber {
    future: Pin<Box<dyn Future<Output = ()> + Send>>,
    fiber: FiberId,
    poll_count: u64,
}

impl StoredFiber {
    pub(crate) fn new<F>(fiber: FiberId, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
            fiber,
            poll_count: 0,
        }
    }

    /// Polls the driver once.
    pub(crate) fn poll(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        self.poll_count += 1;
        let result = self.future.as_mut().poll(cx);
        trace!(
            fiber = %self.fiber,
            poll_number = self.poll_count,
            ready = result.is_ready(),
            "fiber polled"
        );
        result
    }
}

impl std::fmt::Debug for StoredFiber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredFiber")
            .field("fiber", &self.fiber)
            .field("poll_count", &self.poll_count)
            .finish_non_exhaustive()
    }
}

/// Future adapter that reports a panic in `inner` as a defect.
///
/// After a panic the inner future is never polled again.
#[must_use = "futures do nothing unless polled"]
pub(crate) struct CatchUnwind<F> {
    inner: Pin<Box<F>>,
}

impl<F> CatchUnwind<F> {
    pub(crate) fn new(inner: F) -> Self {
        Self {
            inner: Box::pin(inner),
        }
    }
}

impl<F: Future> Future for CatchUnwind<F> {
    type Output = Result<F::Output, Defect>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.get_mut().inner;
        match catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))) {
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(Defect::from_panic(&*payload))),
        }
    }
}
