//! Environment variable support for [`RuntimeBuilder`](super::builder::RuntimeBuilder).
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set via builder methods (`max_steps(10_000)`)
//! 2. **Environment variables**: values from `FIBERSCOPE_*` env vars
//! 3. **Defaults**: built-in defaults from [`RuntimeConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `FIBERSCOPE_MAX_STEPS` | `u64` | `max_steps` |
//! | `FIBERSCOPE_PARALLELISM` | `usize` or `unbounded` | `default_parallelism` |
//! | `FIBERSCOPE_UNHANDLED_FAILURE` | `panic`, `log`, `silent` | `unhandled_failure_response` |

use crate::error::Error;
use crate::runtime::config::{RuntimeConfig, UnhandledFailureResponse};

/// Environment variable name for the executor step budget.
pub const ENV_MAX_STEPS: &str = "FIBERSCOPE_MAX_STEPS";
/// Environment variable name for the default parallelism bound.
pub const ENV_PARALLELISM: &str = "FIBERSCOPE_PARALLELISM";
/// Environment variable name for the unhandled-failure response.
pub const ENV_UNHANDLED_FAILURE: &str = "FIBERSCOPE_UNHANDLED_FAILURE";

/// Apply environment variable overrides to a [`RuntimeConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), Error> {
    if let Some(val) = read_env(ENV_MAX_STEPS) {
        config.max_steps = Some(parse_u64(ENV_MAX_STEPS, &val)?);
    }
    if let Some(val) = read_env(ENV_PARALLELISM) {
        config.default_parallelism = parse_parallelism(ENV_PARALLELISM, &val)?;
    }
    if let Some(val) = read_env(ENV_UNHANDLED_FAILURE) {
        config.unhandled_failure_response = UnhandledFailureResponse::parse(&val)
            .ok_or_else(|| {
                Error::invalid_config(format!(
                    "invalid value for {ENV_UNHANDLED_FAILURE}: expected panic, log or silent, got {val:?}"
                ))
            })?;
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_u64(var_name: &str, val: &str) -> Result<u64, Error> {
    val.trim().parse::<u64>().map_err(|e| {
        Error::invalid_config(format!(
            "invalid value for {var_name}: expected unsigned integer, got {val:?} ({e})"
        ))
    })
}

fn parse_parallelism(var_name: &str, val: &str) -> Result<Option<usize>, Error> {
    let trimmed = val.trim();
    if trimmed.eq_ignore_ascii_case("unbounded") {
        return Ok(None);
    }
    match trimmed.parse::<usize>() {
        Ok(0) => Err(Error::invalid_config(format!(
            "invalid value for {var_name}: parallelism must be at least 1"
        ))),
        Ok(n) => Ok(Some(n)),
        Err(e) => Err(Error::invalid_config(format!(
            "invalid value for {var_name}: expected unsigned integer or \"unbounded\", got {val:?} ({e})"
        ))),
    }
}
