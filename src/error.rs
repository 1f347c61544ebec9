//! Runtime-level error types.
//!
//! Failures *inside* fibers are values of [`Cause`](crate::types::Cause) and never
//! appear here. This module covers the runtime itself: building it from a
//! configuration and driving it to completion.
//!
//! # Error Categories
//!
//! - **Configuration**: a setting (usually from the environment) could not be used
//! - **Scheduling**: the run loop could not make progress or hit its step budget

use core::fmt;
use thiserror::Error as ThisError;

/// The kind of runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Configuration ===
    /// A configuration value was malformed or out of range.
    InvalidConfig,

    // === Scheduling ===
    /// No fiber was runnable, no timer was pending, and the awaited fiber had not finished.
    Stalled,
    /// The configured step budget was exhausted.
    StepLimitExceeded,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidConfig => ErrorCategory::Configuration,
            Self::Stalled | Self::StepLimitExceeded => ErrorCategory::Scheduling,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidConfig => "invalid config",
            Self::Stalled => "stalled",
            Self::StepLimitExceeded => "step limit exceeded",
        };
        f.write_str(name)
    }
}

/// Broad grouping of [`ErrorKind`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Runtime configuration errors.
    Configuration,
    /// Run-loop errors.
    Scheduling,
}

/// A runtime error.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, message)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::new(ErrorKind::Stalled, "root fiber #1 is suspended");
        assert_eq!(err.to_string(), "stalled: root fiber #1 is suspended");
        assert_eq!(err.kind(), ErrorKind::Stalled);
        assert_eq!(err.message(), "root fiber #1 is suspended");
    }

    #[test]
    fn categories() {
        assert_eq!(
            ErrorKind::InvalidConfig.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(ErrorKind::Stalled.category(), ErrorCategory::Scheduling);
        assert_eq!(
            ErrorKind::StepLimitExceeded.category(),
            ErrorCategory::Scheduling
        );
    }
}
