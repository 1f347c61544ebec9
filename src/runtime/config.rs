//! Runtime configuration types.
//!
//! These types hold the concrete values that drive runtime behavior. In most
//! cases you should use [`RuntimeBuilder`](super::builder::RuntimeBuilder) to
//! construct a runtime rather than creating a [`RuntimeConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `max_steps` | `None` (unlimited) |
//! | `default_parallelism` | `None` (unbounded) |
//! | `unhandled_failure_response` | `Panic` |
//! | `start_time` | `Time::ZERO` |

use crate::types::Time;

/// Response when a daemon fiber fails and nobody observes it, and no
/// reporter hook is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhandledFailureResponse {
    /// Panic with the fiber id and cause.
    #[default]
    Panic,
    /// Log the failure at error level and continue.
    Log,
    /// Drop the failure.
    Silent,
}

impl UnhandledFailureResponse {
    /// Parses `panic`, `log` or `silent` (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "panic" => Some(Self::Panic),
            "log" => Some(Self::Log),
            "silent" => Some(Self::Silent),
            _ => None,
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Upper bound on executor steps (fiber polls) per drive call.
    pub max_steps: Option<u64>,
    /// Concurrency bound for parallel combinators when no fiber overrides it.
    pub default_parallelism: Option<usize>,
    /// What to do with unobserved daemon failures when no hook is set.
    pub unhandled_failure_response: UnhandledFailureResponse,
    /// Initial reading of the virtual clock.
    pub start_time: Time,
}

impl RuntimeConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.max_steps == Some(0) {
            self.max_steps = Some(1);
        }
        if self.default_parallelism == Some(0) {
            self.default_parallelism = Some(1);
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            default_parallelism: None,
            unhandled_failure_response: UnhandledFailureResponse::default(),
            start_time: Time::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn default_config_sane() {
        init_test("default_config_sane");
        let config = RuntimeConfig::default();
        crate::assert_with_log!(
            config.max_steps.is_none(),
            "no step limit by default",
            None::<u64>,
            config.max_steps
        );
        assert_eq!(config.default_parallelism, None);
        assert_eq!(
            config.unhandled_failure_response,
            UnhandledFailureResponse::Panic
        );
        assert_eq!(config.start_time, Time::ZERO);
        crate::test_complete!("default_config_sane");
    }

    #[test]
    fn normalize_enforces_minimums() {
        init_test("normalize_enforces_minimums");
        let mut config = RuntimeConfig {
            max_steps: Some(0),
            default_parallelism: Some(0),
            ..RuntimeConfig::default()
        };
        config.normalize();
        assert_eq!(config.max_steps, Some(1));
        assert_eq!(config.default_parallelism, Some(1));
        crate::test_complete!("normalize_enforces_minimums");
    }

    #[test]
    fn normalize_preserves_custom_values() {
        let mut config = RuntimeConfig {
            max_steps: Some(500),
            default_parallelism: Some(4),
            unhandled_failure_response: UnhandledFailureResponse::Log,
            start_time: Time::from_millis(7),
        };
        let before = config.clone();
        config.normalize();
        assert_eq!(config, before);
    }

    #[test]
    fn parses_failure_response() {
        assert_eq!(
            UnhandledFailureResponse::parse(" LOG "),
            Some(UnhandledFailureResponse::Log)
        );
        assert_eq!(
            UnhandledFailureResponse::parse("silent"),
            Some(UnhandledFailureResponse::Silent)
        );
        assert_eq!(UnhandledFailureResponse::parse("abort"), None);
    }
}
