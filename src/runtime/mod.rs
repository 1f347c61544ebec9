//! The fiber runtime.
//!
//! This module contains the scheduling machinery:
//!
//! - [`config`]: Runtime configuration types
//! - [`env_config`]: `FIBERSCOPE_*` environment overrides
//! - [`builder`]: The [`RuntimeBuilder`] and the [`Runtime`] handle
//! - `state`: Runtime state and the cooperative executor
//! - `stored_fiber`: Type-erased driver futures
//! - `waker`: Ready queue with deduplicating wakers
//! - `timer`: Timer heap for the virtual clock
//!
//! # Runtime Builder
//!
//! The builder is fluent and move-based: each method consumes `self` and
//! returns the updated builder.
//!
//! ```ignore
//! use fiberscope::runtime::{RuntimeBuilder, UnhandledFailureResponse};
//!
//! let runtime = RuntimeBuilder::new()
//!     .default_parallelism(Some(8))
//!     .unhandled_failure_response(UnhandledFailureResponse::Log)
//!     .with_env_overrides()?
//!     .build()?;
//!
//! let exit = runtime.run(|cx: Cx| async move {
//!     let child = cx.fork(|cx: Cx| async move { Ok::<_, Cause<()>>(cx.id()) });
//!     child.join(&cx).await
//! });
//! ```
//!
//! # Scheduling
//!
//! Fibers are multiplexed on the calling thread. A fiber runs until it
//! suspends; the executor then polls the next ready fiber. When nothing is
//! ready the virtual clock jumps to the next timer deadline, so a program that
//! sleeps for an hour completes instantly and deterministically.
//!
//! # Configuration Reference (Defaults + Notes)
//!
//! - `max_steps`: default = unlimited. Bounds fiber polls per drive call;
//!   a runaway program ends with `StepLimitExceeded` instead of spinning.
//! - `default_parallelism`: default = unbounded. The bound `foreach_par` uses
//!   when no fiber has set one with `Cx::with_parallelism`.
//! - `unhandled_failure_response`: default = `Panic`. Applies when no reporter
//!   hook is installed.
//! - `start_time`: default = zero. Initial virtual clock reading, which also
//!   stamps fiber ids.

pub mod builder;
pub mod config;
pub mod env_config;
pub(crate) mod state;
pub(crate) mod stored_fiber;
pub(crate) mod timer;
pub(crate) mod waker;

pub use builder::{Runtime, RuntimeBuilder};
pub use config::{RuntimeConfig, UnhandledFailureResponse};
pub use state::{UnhandledFailure, UnhandledFailureHook};
