//! Identifier types for runtime entities.
//!
//! Fibers are identified by a [`FiberId`]: a sequence number allocated by the
//! owning runtime plus the virtual time at which the fiber was forked. Scopes and
//! fiber-local references carry their own opaque identifiers.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static SCOPE_COUNTER: AtomicU64 = AtomicU64::new(1);
static FIBER_REF_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of a fiber, used to attribute interruption.
///
/// Two ids are equal iff both the sequence number and the start time match.
/// [`FiberId::NONE`] is the distinguished "no fiber" value; real fibers are
/// numbered from 1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FiberId {
    seq: u64,
    start_time: Time,
}

impl FiberId {
    /// The distinguished id that names no fiber.
    pub const NONE: Self = Self {
        seq: 0,
        start_time: Time::ZERO,
    };

    /// Creates a fiber id from its parts.
    #[must_use]
    pub const fn new(seq: u64, start_time: Time) -> Self {
        Self { seq, start_time }
    }

    /// Returns the sequence number.
    #[must_use]
    pub const fn seq(self) -> u64 {
        self.seq
    }

    /// Returns the virtual time at which the fiber was forked.
    #[must_use]
    pub const fn start_time(self) -> Time {
        self.start_time
    }

    /// Returns true for [`FiberId::NONE`].
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.seq == 0 && self.start_time.as_nanos() == 0
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "FiberId(none)")
        } else {
            write!(f, "FiberId(#{}@{})", self.seq, self.start_time)
        }
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "#none")
        } else {
            write!(f, "#{}", self.seq)
        }
    }
}

/// Monotonic allocator for fiber sequence numbers, owned by one runtime.
#[derive(Debug)]
pub(crate) struct FiberIdAllocator {
    next: AtomicU64,
}

impl FiberIdAllocator {
    pub(crate) const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn next(&self, now: Time) -> FiberId {
        FiberId::new(self.next.fetch_add(1, Ordering::Relaxed), now)
    }
}

/// Identifier of a [`Scope`](crate::scope::Scope).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(u64);

impl ScopeId {
    pub(crate) fn next() -> Self {
        Self(SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({})", self.0)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Identifier of a [`FiberRef`](crate::fiber::FiberRef).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct FiberRefId(u64);

impl FiberRefId {
    pub(crate) fn next() -> Self {
        Self(FIBER_REF_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A logical timestamp.
///
/// The runtime clock is virtual: it only advances when every fiber is
/// suspended and a timer is due.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Time(u64);

impl Time {
    /// The zero instant (epoch).
    pub const ZERO: Self = Self(0);

    /// The maximum representable instant.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a new time from nanoseconds since epoch.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a new time from milliseconds since epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Returns the time as nanoseconds since epoch.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time as milliseconds since epoch (truncated).
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Adds a duration in nanoseconds, saturating on overflow.
    #[must_use]
    pub const fn saturating_add_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    /// Returns the nanoseconds elapsed since `earlier`, or 0 if `self` is before it.
    #[must_use]
    pub const fn duration_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let nanos = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        self.saturating_add_nanos(nanos)
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time({}ns)", self.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000_000 {
            write!(
                f,
                "{}.{:03}s",
                self.0 / 1_000_000_000,
                (self.0 / 1_000_000) % 1000
            )
        } else if self.0 >= 1_000_000 {
            write!(f, "{}ms", self.0 / 1_000_000)
        } else if self.0 >= 1_000 {
            write!(f, "{}us", self.0 / 1_000)
        } else {
            write!(f, "{}ns", self.0)
        }
    }
}
