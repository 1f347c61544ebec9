//! Core types for the fiber runtime.
//!
//! - [`id`]: Identifier types (`FiberId`, `ScopeId`, `FiberRefId`, `Time`)
//! - [`cause`]: Failure causes and the `Interrupted` signal
//! - [`exit`]: Terminal outcomes of fibers and effects
//! - [`status`]: Fiber lifecycle status and interruptibility

pub mod cause;
pub mod exit;
pub mod id;
pub mod status;

pub use cause::{Cause, Defect, Interrupted};
pub use exit::{ErasedExit, Exit};
pub(crate) use id::FiberIdAllocator;
pub use id::{FiberId, FiberRefId, ScopeId, Time};
pub use status::{FiberStatus, InterruptStatus};

use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
