//! Fiberscope: structured concurrency on lightweight fibers.
//!
//! # Overview
//!
//! Fiberscope runs effects on fibers: cheap, cooperatively scheduled units of
//! work multiplexed on one thread and driven by a virtual clock. Every fiber
//! is attached to a scope that outlives it, so a parent never leaves children
//! running behind it. Interruption is a request that the target observes at
//! its next checkpoint, and code can shield itself from it with lexically
//! scoped interruptibility regions.
//!
//! # Core Guarantees
//!
//! - **No orphan fibers**: a fiber's scope closes when it finishes, interrupting
//!   and awaiting every child still attached to it
//! - **Attributed interruption**: every interruption records which fiber asked
//!   for it, and a fiber's exit carries the full set
//! - **Masked regions**: `uninterruptible_mask` hands its body a restore that
//!   reinstates exactly the status in force on entry
//! - **Typed failure**: exits are `Success(a)` or `Failure(cause)`, where the
//!   cause tree keeps typed failures, defects and interruptions apart
//! - **Deterministic time**: the clock only moves when nothing is runnable,
//!   so programs that sleep for hours finish instantly and repeatably
//!
//! # Module Structure
//!
//! - [`types`]: Identifiers, causes, exits and statuses
//! - [`sync`]: The single-assignment [`Promise`]
//! - [`fiber`]: Runtime and synthetic fibers, the fiber algebra and fiber refs
//! - [`scope`]: Scopes and their finalizers
//! - [`cx`]: The capability context and the interruption and fork-scope combinators
//! - [`combinator`]: Parallel traversal, race, zip, bracket and timeout
//! - [`runtime`]: Configuration, the builder and the executor
//! - [`error`]: Runtime errors
//! - [`tracing_compat`]: Logging shim over `tracing`
//!
//! # Example
//!
//! ```ignore
//! use fiberscope::{Cause, Cx, Exit, Runtime};
//! use std::time::Duration;
//!
//! let runtime = Runtime::new();
//! let exit = runtime.run(|cx: Cx| async move {
//!     let slow = cx.fork(|cx: Cx| async move {
//!         cx.sleep(Duration::from_secs(60)).await?;
//!         Ok::<_, Cause<()>>("slow")
//!     });
//!     let fast = cx.fork(|cx: Cx| async move {
//!         cx.sleep(Duration::from_millis(5)).await?;
//!         Ok::<_, Cause<()>>("fast")
//!     });
//!     let value = fast.join(&cx).await?;
//!     slow.interrupt(&cx).await;
//!     Ok(value)
//! });
//! assert_eq!(exit, Exit::succeed("fast"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::future_not_send)]
#![allow(clippy::too_many_lines)]

pub mod combinator;
pub mod cx;
pub mod error;
pub mod fiber;
pub(crate) mod record;
pub mod runtime;
pub mod scope;
pub mod sync;
pub mod tracing_compat;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenient access to core types
pub use combinator::{
    bracket_exit, collect_all_par, collect_all_par_n, effect, ensuring, foreach_par,
    foreach_par_discard, foreach_par_n, foreach_par_unbounded, on_exit, race, race_all, timeout,
    zip_par, zip_with_par, Effect, InterruptStrategy,
};
pub use cx::{Cx, InterruptRestore};
pub use error::{Error, ErrorCategory, ErrorKind, Result};
pub use fiber::{Fiber, FiberDump, FiberOps, FiberRef, RuntimeFiber, SyntheticFiber};
pub use record::FinalizerKey;
pub use runtime::{
    Runtime, RuntimeBuilder, RuntimeConfig, UnhandledFailure, UnhandledFailureResponse,
};
pub use scope::Scope;
pub use sync::Promise;
pub use types::{
    Cause, Defect, ErasedExit, Exit, FiberId, FiberStatus, InterruptStatus, Interrupted, Time,
};
