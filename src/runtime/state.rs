//! Runtime state and the cooperative executor.
//!
//! `RuntimeState` holds everything one runtime instance owns:
//!
//! - the fiber table (record plus stored driver future per live fiber)
//! - the ready queue fed by fiber wakers
//! - the timer heap and the virtual clock
//! - the global (daemon) scope
//! - the unhandled-failure reporter
//!
//! The executor is single-threaded: [`RuntimeState::step`] pops one ready
//! fiber and polls it with the table lock released, so the polled fiber can
//! fork, wake and interrupt others. When nothing is ready the clock jumps to
//! the next timer deadline.
//!
//! # Fiber lifecycle
//!
//! Every fiber runs inside a driver future that:
//!
//! 1. checks for an interruption that arrived before the first poll
//! 2. runs the body, turning a panic into a defect
//! 3. moves to `Finishing` and closes the fiber's own scope with its exit
//! 4. withdraws its supervision finalizer from the scope it was forked into
//! 5. moves to `Done`, completes its typed exit promise and then the erased
//!    completion signal
//! 6. reports an unobserved daemon failure

use crate::cx::Cx;
use crate::error::{Error, ErrorKind};
use crate::fiber::{FiberDump, RuntimeFiber};
use crate::record::{FiberRecord, FinalizerKey, Inherited};
use crate::runtime::config::{RuntimeConfig, UnhandledFailureResponse};
use crate::runtime::stored_fiber::{CatchUnwind, StoredFiber};
use crate::runtime::timer::Alarms;
use crate::runtime::waker::ReadyQueue;
use crate::scope::Scope;
use crate::sync::Promise;
use crate::tracing_compat::{debug, warn};
use crate::types::{Cause, ErasedExit, Exit, FiberId, FiberIdAllocator, Time};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

/// A failure nobody was around to observe.
///
/// Raised when a fiber forked into the global scope ends with a typed failure
/// or a defect and no one ever awaited, joined, polled or interrupted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhandledFailure {
    /// The failed daemon fiber.
    pub fiber: FiberId,
    /// Its cause, with typed failures erased.
    pub cause: Cause<()>,
}

impl fmt::Display for UnhandledFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "daemon fiber {} failed unobserved: {}", self.fiber, self.cause)
    }
}

/// Reporter invoked with every [`UnhandledFailure`].
pub type UnhandledFailureHook = Arc<dyn Fn(&UnhandledFailure) + Send + Sync>;

struct FiberSlot {
    record: Arc<FiberRecord>,
    future: Option<StoredFiber>,
}

/// Shared state of one runtime.
pub(crate) struct RuntimeState {
    config: RuntimeConfig,
    ids: FiberIdAllocator,
    now: AtomicU64,
    fibers: Mutex<HashMap<FiberId, FiberSlot>>,
    ready: Arc<ReadyQueue>,
    timers: Mutex<Alarms>,
    global_scope: Scope,
    hook: Option<UnhandledFailureHook>,
}

impl fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeState")
            .field("config", &self.config)
            .field("now", &self.now())
            .field("fibers", &self.fibers.lock().len())
            .field("ready", &self.ready.len())
            .field("timers", &self.timers.lock().pending())
            .field("global_scope", &self.global_scope.id())
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl RuntimeState {
    pub(crate) fn new(config: RuntimeConfig, hook: Option<UnhandledFailureHook>) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicU64::new(config.start_time.as_nanos()),
            config,
            ids: FiberIdAllocator::new(),
            fibers: Mutex::new(HashMap::new()),
            ready: Arc::new(ReadyQueue::new()),
            timers: Mutex::new(Alarms::new()),
            global_scope: Scope::global(),
            hook,
        })
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Time {
        Time::from_nanos(self.now.load(Ordering::Acquire))
    }

    pub(crate) fn global_scope(&self) -> &Scope {
        &self.global_scope
    }

    pub(crate) fn live_fibers(&self) -> usize {
        self.fibers.lock().len()
    }

    /// Wakes `fiber` once the clock reaches `deadline`.
    pub(crate) fn register_timer(&self, fiber: FiberId, deadline: Time) {
        self.timers.lock().schedule(fiber, deadline);
    }

    /// Forks `f` as a new fiber supervised by `scope`.
    ///
    /// `parent` is the forking fiber, or `None` for a root fiber. The child
    /// inherits the parent's interrupt status, parallelism and forked
    /// fiber-local values.
    pub(crate) fn spawn<E, A, F, Fut>(
        self: &Arc<Self>,
        parent: Option<&FiberRecord>,
        scope: &Scope,
        f: F,
    ) -> RuntimeFiber<E, A>
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
        E: Clone + Send + 'static,
        A: Clone + Send + 'static,
    {
        let id = self.ids.next(self.now());
        let parent_id = parent.map_or(FiberId::NONE, FiberRecord::id);
        let inherited = parent.map_or_else(
            || Inherited {
                parallelism: self.config.default_parallelism,
                ..Inherited::default()
            },
            FiberRecord::inherited,
        );
        let daemon = scope.is_global();
        let record = Arc::new(FiberRecord::new(id, daemon, inherited));
        let exit = Promise::<E, A>::make_as(id);

        let supervision = if daemon {
            None
        } else {
            let key = scope.add_finalizer(interrupt_on_close(Arc::downgrade(&record)));
            if key.is_none() {
                record.request_interrupt(parent_id);
            }
            key.map(|key| (scope.clone(), key))
        };
        record
            .scope()
            .add_finalizer(interrupt_on_close(Arc::downgrade(&record)));

        let cx = Cx::new(Arc::clone(&record), Arc::clone(self));
        let driver = drive_fiber(cx, f, exit.clone(), supervision);
        self.fibers.lock().insert(
            id,
            FiberSlot {
                record: Arc::clone(&record),
                future: Some(StoredFiber::new(id, driver)),
            },
        );
        self.ready.wake(id);
        debug!(
            fiber = %id,
            parent = %parent_id,
            scope = %scope.id(),
            daemon,
            "fiber forked"
        );
        RuntimeFiber::new(record, exit)
    }

    /// Polls one ready fiber. Returns false if none was ready.
    pub(crate) fn step(&self) -> bool {
        let Some(id) = self.ready.pop() else {
            return false;
        };
        let taken = {
            let mut fibers = self.fibers.lock();
            fibers
                .get_mut(&id)
                .and_then(|slot| Some((Arc::clone(&slot.record), slot.future.take()?)))
        };
        // Finished fibers and stale timer wakes leave nothing to poll.
        let Some((record, mut future)) = taken else {
            return true;
        };
        let waker = self.ready.waker_for(id);
        record.resume(&waker);
        let mut task = Context::from_waker(&waker);
        match future.poll(&mut task) {
            Poll::Ready(()) => {
                self.fibers.lock().remove(&id);
            }
            Poll::Pending => {
                record.suspend();
                if let Some(slot) = self.fibers.lock().get_mut(&id) {
                    slot.future = Some(future);
                }
            }
        }
        true
    }

    /// Advances the virtual clock to the next deadline and wakes the fibers
    /// whose timers expired. Returns false if no timer is pending.
    fn advance_clock(&self) -> bool {
        let expired = {
            let mut timers = self.timers.lock();
            let Some(deadline) = timers.next_deadline() else {
                return false;
            };
            self.now.fetch_max(deadline.as_nanos(), Ordering::AcqRel);
            timers.take_due(self.now())
        };
        for fiber in expired {
            self.ready.wake(fiber);
        }
        true
    }

    /// Runs fibers until `done` holds or nothing can make progress.
    ///
    /// Returns `Ok(true)` once `done` holds and `Ok(false)` when every fiber
    /// is suspended with no pending timer.
    pub(crate) fn drive(&self, mut done: impl FnMut() -> bool) -> Result<bool, Error> {
        let mut steps: u64 = 0;
        loop {
            if done() {
                return Ok(true);
            }
            if let Some(max) = self.config.max_steps {
                if steps >= max {
                    warn!(steps, "step limit exceeded");
                    return Err(Error::new(
                        ErrorKind::StepLimitExceeded,
                        format!("{steps} fiber polls without completing"),
                    ));
                }
            }
            if self.step() {
                steps += 1;
                continue;
            }
            if !self.advance_clock() {
                return Ok(done());
            }
        }
    }

    /// Dumps every live fiber, ordered by id.
    pub(crate) fn dump_fibers(&self) -> Vec<FiberDump> {
        let mut dumps: Vec<FiberDump> = self
            .fibers
            .lock()
            .values()
            .map(|slot| FiberDump::capture(&slot.record))
            .collect();
        dumps.sort_by_key(|dump| dump.id);
        dumps
    }

    /// Delivers an unobserved daemon failure.
    pub(crate) fn report_unhandled(&self, failure: &UnhandledFailure) {
        if let Some(hook) = &self.hook {
            hook(failure);
            return;
        }
        match self.config.unhandled_failure_response {
            UnhandledFailureResponse::Panic => panic!("{failure}"),
            UnhandledFailureResponse::Log => {
                tracing::error!(
                    fiber = %failure.fiber,
                    cause = %failure.cause,
                    "unhandled daemon failure"
                );
            }
            UnhandledFailureResponse::Silent => {}
        }
    }

    /// Drops every stored fiber, breaking the runtime/fiber reference cycle.
    pub(crate) fn shutdown(&self) {
        let drained: Vec<FiberSlot> = self.fibers.lock().drain().map(|(_, slot)| slot).collect();
        self.timers.lock().clear();
        self.ready.clear();
        drop(drained);
    }
}

/// Finalizer that interrupts the fiber behind `record` when its scope closes.
fn interrupt_on_close(
    record: Weak<FiberRecord>,
) -> impl FnOnce(Cx, ErasedExit) -> crate::types::BoxFuture<'static, ()> + Send + 'static {
    move |cx, exit| {
        Box::pin(async move {
            if let Some(record) = record.upgrade() {
                record.interrupt_from_scope(&cx, &exit).await;
            }
        })
    }
}

async fn drive_fiber<E, A, F, Fut>(
    cx: Cx,
    f: F,
    exit_promise: Promise<E, A>,
    supervision: Option<(Scope, FinalizerKey)>,
) where
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    let record = Arc::clone(cx.record());
    let exit: Exit<E, A> = match cx.checkpoint() {
        Err(interrupted) => Exit::Failure(interrupted.into()),
        Ok(()) => match CatchUnwind::new(f(cx.clone())).await {
            Ok(result) => Exit::from(result),
            Err(defect) => Exit::halt(defect),
        },
    };

    record.begin_finishing();
    let erased = exit.erase();
    record.scope().close(&cx, erased.clone()).await;
    if let Some((scope, key)) = supervision {
        scope.remove_finalizer(key);
    }
    record.finish();

    let observed = record.is_observed() || exit_promise.joiner_count() > 0;
    exit_promise.done(exit);
    record.completion().done(erased.clone());
    debug!(
        fiber = %record.id(),
        success = erased.is_success(),
        interrupted = erased.is_interrupted(),
        "fiber finished"
    );

    if record.is_daemon() && !observed {
        if let Exit::Failure(cause) = erased {
            if cause.is_failure() {
                cx.runtime().report_unhandled(&UnhandledFailure {
                    fiber: record.id(),
                    cause,
                });
            }
        }
    }
}
