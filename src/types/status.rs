//! Fiber lifecycle and interruptibility.

use crate::types::FiberId;
use core::fmt;
use serde::Serialize;

/// Whether interruption may be delivered to a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum InterruptStatus {
    /// Interruption is delivered at the next checkpoint.
    #[default]
    Interruptible,
    /// Interruption is queued until the fiber becomes interruptible again.
    Uninterruptible,
}

impl InterruptStatus {
    /// Converts from a boolean "is interruptible" flag.
    #[must_use]
    pub const fn from_bool(interruptible: bool) -> Self {
        if interruptible {
            Self::Interruptible
        } else {
            Self::Uninterruptible
        }
    }

    /// Returns true for [`InterruptStatus::Interruptible`].
    #[must_use]
    pub const fn is_interruptible(self) -> bool {
        matches!(self, Self::Interruptible)
    }
}

/// Lifecycle status of a runtime fiber.
///
/// `Suspended` frames form a strictly nested chain: `previous` is owned, so the
/// chain can never be cyclic and always ends in `Done`, `Finishing` or
/// `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FiberStatus {
    /// The fiber has completed and its exit is available.
    Done,
    /// The fiber's body has finished; its scope is being closed.
    Finishing {
        /// An interruption request has been recorded.
        interrupting: bool,
    },
    /// The fiber is runnable or being polled.
    Running {
        /// An interruption request has been recorded.
        interrupting: bool,
    },
    /// The fiber is waiting on a suspension point.
    Suspended {
        /// The status the fiber resumes into.
        previous: Box<FiberStatus>,
        /// Whether an interruption request wakes the fiber.
        interruptible: bool,
        /// Number of suspensions before this one.
        epoch: u64,
        /// Fibers this suspension is waiting on.
        blocking_on: Vec<FiberId>,
    },
}

impl FiberStatus {
    /// The status of a freshly forked fiber.
    pub const INITIAL: Self = Self::Running {
        interrupting: false,
    };

    /// Returns true for [`FiberStatus::Done`].
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if an interruption request has been recorded.
    #[must_use]
    pub fn is_interrupting(&self) -> bool {
        match self {
            Self::Done => false,
            Self::Finishing { interrupting } | Self::Running { interrupting } => *interrupting,
            Self::Suspended { previous, .. } => previous.is_interrupting(),
        }
    }

    /// Returns the status with the interrupting flag of the base frame set.
    #[must_use]
    pub fn with_interrupting(self, flag: bool) -> Self {
        match self {
            Self::Done => Self::Done,
            Self::Finishing { .. } => Self::Finishing { interrupting: flag },
            Self::Running { .. } => Self::Running { interrupting: flag },
            Self::Suspended {
                previous,
                interruptible,
                epoch,
                blocking_on,
            } => Self::Suspended {
                previous: Box::new(previous.with_interrupting(flag)),
                interruptible,
                epoch,
                blocking_on,
            },
        }
    }

    /// Returns the status a fiber moves to once its body has finished.
    #[must_use]
    pub fn to_finishing(self) -> Self {
        match self {
            Self::Done => Self::Done,
            Self::Finishing { interrupting } | Self::Running { interrupting } => {
                Self::Finishing { interrupting }
            }
            Self::Suspended { previous, .. } => previous.to_finishing(),
        }
    }

    /// Pushes a suspension frame on top of this status.
    #[must_use]
    pub fn suspend(self, interruptible: bool, epoch: u64, blocking_on: Vec<FiberId>) -> Self {
        Self::Suspended {
            previous: Box::new(self),
            interruptible,
            epoch,
            blocking_on,
        }
    }

    /// Pops the topmost suspension frame, if any.
    #[must_use]
    pub fn resume(self) -> Self {
        match self {
            Self::Suspended { previous, .. } => *previous,
            other => other,
        }
    }

    /// Returns true if the fiber is suspended interruptibly.
    #[must_use]
    pub const fn is_interruptibly_suspended(&self) -> bool {
        matches!(
            self,
            Self::Suspended {
                interruptible: true,
                ..
            }
        )
    }

    /// Depth of the suspension chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Suspended { previous, .. } => 1 + previous.depth(),
            _ => 0,
        }
    }
}

impl fmt::Display for FiberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "Done"),
            Self::Finishing { interrupting } => write!(f, "Finishing(interrupting={interrupting})"),
            Self::Running { interrupting } => write!(f, "Running(interrupting={interrupting})"),
            Self::Suspended {
                previous,
                interruptible,
                epoch,
                blocking_on,
            } => {
                write!(
                    f,
                    "Suspended(interruptible={interruptible}, epoch={epoch}, blocking_on=["
                )?;
                for (i, id) in blocking_on.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{id}")?;
                }
                write!(f, "]) <- {previous}")
            }
        }
    }
}
