//! Synchronization primitives for fibers.
//!
//! - [`Promise`]: single-assignment variable; completion wakes every waiter
//!   with the same [`Exit`](crate::types::Exit)

mod promise;

pub use promise::{Promise, PromiseAwait};
