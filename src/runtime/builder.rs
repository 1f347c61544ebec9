//! Runtime builder and the runtime handle.

use crate::cx::Cx;
use crate::error::{Error, ErrorKind};
use crate::fiber::{FiberDump, RuntimeFiber};
use crate::runtime::config::{RuntimeConfig, UnhandledFailureResponse};
use crate::runtime::env_config::apply_env_overrides;
use crate::runtime::state::{RuntimeState, UnhandledFailure, UnhandledFailureHook};
use crate::scope::Scope;
use crate::tracing_compat::{info, warn};
use crate::types::{Cause, Exit, Time};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Which settings were chosen in code, so the environment does not override
/// them.
#[derive(Debug, Clone, Copy, Default)]
struct Explicit {
    max_steps: bool,
    parallelism: bool,
    unhandled_failure_response: bool,
}

/// Builder for constructing a runtime with custom configuration.
#[derive(Clone, Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    explicit: Explicit,
    hook: Option<UnhandledFailureHook>,
}

impl fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("config", &self.config)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl RuntimeBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of fiber polls per drive call.
    #[must_use]
    pub fn max_steps(mut self, steps: u64) -> Self {
        self.config.max_steps = Some(steps);
        self.explicit.max_steps = true;
        self
    }

    /// Set the default concurrency bound for parallel combinators
    /// (`None` is unbounded).
    #[must_use]
    pub fn default_parallelism(mut self, n: Option<usize>) -> Self {
        self.config.default_parallelism = n;
        self.explicit.parallelism = true;
        self
    }

    /// Set the response to unobserved daemon failures when no hook is
    /// installed.
    #[must_use]
    pub fn unhandled_failure_response(mut self, response: UnhandledFailureResponse) -> Self {
        self.config.unhandled_failure_response = response;
        self.explicit.unhandled_failure_response = true;
        self
    }

    /// Set the initial reading of the virtual clock.
    #[must_use]
    pub fn start_time(mut self, time: Time) -> Self {
        self.config.start_time = time;
        self
    }

    /// Install a reporter for unobserved daemon failures. It replaces the
    /// configured [`UnhandledFailureResponse`].
    #[must_use]
    pub fn on_unhandled_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&UnhandledFailure) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Fill every setting not chosen in code from `FIBERSCOPE_*` environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] if a variable is set to a value
    /// that cannot be parsed.
    pub fn with_env_overrides(mut self) -> Result<Self, Error> {
        let mut env = self.config.clone();
        apply_env_overrides(&mut env)?;
        if !self.explicit.max_steps {
            self.config.max_steps = env.max_steps;
        }
        if !self.explicit.parallelism {
            self.config.default_parallelism = env.default_parallelism;
        }
        if !self.explicit.unhandled_failure_response {
            self.config.unhandled_failure_response = env.unhandled_failure_response;
        }
        Ok(self)
    }

    /// Build a runtime from this configuration.
    pub fn build(self) -> Result<Runtime, Error> {
        let mut config = self.config;
        config.normalize();
        Ok(Runtime::from_parts(config, self.hook))
    }
}

/// A fiber runtime.
///
/// Each runtime owns its own id allocator, virtual clock, ready queue, timers,
/// global scope and failure reporter; runtimes never share state. Dropping the
/// runtime drops every fiber still stored in it.
pub struct Runtime {
    state: Arc<RuntimeState>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").field("state", &self.state).finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A runtime with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(RuntimeConfig::default(), None)
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Construct a runtime from the given configuration.
    pub fn with_config(mut config: RuntimeConfig) -> Result<Self, Error> {
        config.normalize();
        Ok(Self::from_parts(config, None))
    }

    fn from_parts(config: RuntimeConfig, hook: Option<UnhandledFailureHook>) -> Self {
        info!(
            max_steps = ?config.max_steps,
            parallelism = ?config.default_parallelism,
            "runtime created"
        );
        Self {
            state: RuntimeState::new(config, hook),
        }
    }

    /// Returns a reference to the runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        self.state.config()
    }

    /// The virtual clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.state.now()
    }

    /// The global (daemon) scope.
    #[must_use]
    pub fn global_scope(&self) -> Scope {
        self.state.global_scope().clone()
    }

    /// Number of fibers that have not finished.
    #[must_use]
    pub fn live_fibers(&self) -> usize {
        self.state.live_fibers()
    }

    /// Dumps every live fiber, ordered by id.
    #[must_use]
    pub fn dump_fibers(&self) -> Vec<FiberDump> {
        self.state.dump_fibers()
    }

    /// Forks a root fiber into the global scope without driving it.
    pub fn fork<E, A, F, Fut>(&self, f: F) -> RuntimeFiber<E, A>
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
        E: Clone + Send + 'static,
        A: Clone + Send + 'static,
    {
        self.state.spawn(None, self.state.global_scope(), f)
    }

    /// Runs `f` on a root fiber until it finishes.
    ///
    /// Other fibers run as needed; fibers still suspended when the root
    /// finishes stay in the runtime.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Stalled`] if every fiber is suspended with no timer pending
    /// before the root finishes, [`ErrorKind::StepLimitExceeded`] if the
    /// configured step budget runs out first.
    pub fn try_run<E, A, F, Fut>(&self, f: F) -> Result<Exit<E, A>, Error>
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
        E: Clone + Send + 'static,
        A: Clone + Send + 'static,
    {
        let root = self.fork(f);
        root.record().mark_observed();
        self.state.drive(|| root.poll().is_some())?;
        if let Some(exit) = root.poll() {
            return Ok(exit);
        }
        let dumps = self.dump_fibers();
        warn!(root = %root.id(), live = dumps.len(), "runtime stalled");
        let mut message = format!("root fiber {} cannot make progress", root.id());
        for dump in &dumps {
            message.push_str("\n  ");
            message.push_str(&dump.to_string());
        }
        Err(Error::new(ErrorKind::Stalled, message))
    }

    /// Runs `f` on a root fiber until it finishes and returns its exit.
    ///
    /// A stalled run or an exhausted step budget becomes a defect.
    pub fn run<E, A, F, Fut>(&self, f: F) -> Exit<E, A>
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
        E: Clone + Send + 'static,
        A: Clone + Send + 'static,
    {
        self.try_run(f).unwrap_or_else(|err| Exit::die(err.to_string()))
    }

    /// Drives every runnable fiber, advancing the clock through pending
    /// timers, until nothing is left to do.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::StepLimitExceeded`] if the step budget runs out first.
    pub fn run_until_quiescent(&self) -> Result<(), Error> {
        self.state.drive(|| false).map(|_| ())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.state.shutdown();
    }
}
