//! Logging shim over `tracing`.
//!
//! - **With `tracing-integration`**: re-exports the `tracing` event macros.
//! - **Without it**: no-op macros with the same names, so call sites compile
//!   to nothing.
//!
//! Unobserved daemon failures under the `Log` response always go straight to
//! `tracing::error!`, with or without the feature.
//!
//! ```rust,ignore
//! use fiberscope::tracing_compat::debug;
//!
//! debug!(fiber = %id, "fiber forked");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    //! No-op event macros.

    /// No-op trace-level logging macro.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op debug-level logging macro.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// No-op info-level logging macro.
    #[macro_export]
    macro_rules! info {
        ($($arg:tt)*) => {};
    }

    /// No-op warn-level logging macro.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    /// No-op error-level logging macro.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    pub use crate::{debug, error, info, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub use noop::*;
