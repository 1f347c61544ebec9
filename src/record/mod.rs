//! Internal records for runtime entities.
//!
//! This module contains the internal record types used by the runtime
//! to track fibers and scope finalizers.
//!
//! These are internal implementation details and not part of the public API,
//! except for [`FinalizerKey`], the handle scopes return for registered
//! finalizers.

pub(crate) mod fiber;
pub(crate) mod finalizer;

pub(crate) use fiber::{FiberRecord, FiberState, Inherited};
pub use finalizer::FinalizerKey;
