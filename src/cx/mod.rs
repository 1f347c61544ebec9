//! The fiber capability context.
//!
//! A [`Cx`] is handed to every fiber body. It is the only way to reach the
//! runtime: suspension points, forking, fiber-local values and the
//! interruption and fork-scope combinators are all methods on it.
//!
//! # Module Contents
//!
//! - [`Cx`]: the capability context, plus the [`YieldNow`] and [`Sleep`]
//!   suspension futures
//! - interruptibility regions and masks ([`InterruptRestore`])
//! - fork-scope overrides and grafting ([`ForkScopeRestore`], [`Grafter`])

#[allow(clippy::module_inception)]
mod cx;
mod fork_scope;
mod interrupt;
mod region;

pub use cx::{Cx, Sleep, YieldNow};
pub use fork_scope::{ForkScopeRestore, GraftedBody, Grafter};
pub use interrupt::InterruptRestore;
