//! Point-in-time fiber snapshots for diagnostics.

use crate::record::FiberRecord;
use crate::types::{FiberId, FiberStatus, InterruptStatus, ScopeId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// What a fiber knows about itself, as returned by
/// [`Cx::descriptor`](crate::cx::Cx::descriptor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiberDescriptor {
    /// The fiber's id.
    pub id: FiberId,
    /// Lifecycle status at the time of the snapshot.
    pub status: FiberStatus,
    /// Ambient interruptibility at the time of the snapshot.
    pub interrupt_status: InterruptStatus,
    /// Fibers that have requested its interruption.
    pub interruptors: BTreeSet<FiberId>,
    /// The fiber's own scope, which supervises its children.
    pub scope: ScopeId,
}

impl FiberDescriptor {
    pub(crate) fn capture(record: &FiberRecord) -> Self {
        let (status, interrupt_status, interruptors) = record.with_state(|state| {
            (
                state.status.clone(),
                state.interrupt_status,
                state.interruptors.clone(),
            )
        });
        Self {
            id: record.id(),
            status,
            interrupt_status,
            interruptors,
            scope: record.scope().id(),
        }
    }
}

impl fmt::Display for FiberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fiber {} [{:?}] in scope {}: {}",
            self.id, self.interrupt_status, self.scope, self.status
        )?;
        write_interruptors(f, &self.interruptors)
    }
}

/// A diagnostic dump of one runtime fiber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiberDump {
    /// The fiber's id.
    pub id: FiberId,
    /// Lifecycle status at the time of the dump.
    pub status: FiberStatus,
    /// Fibers that have requested its interruption.
    pub interruptors: BTreeSet<FiberId>,
    /// The fiber's own scope.
    pub scope: ScopeId,
    /// Whether the fiber was forked into the global scope.
    pub daemon: bool,
}

impl FiberDump {
    pub(crate) fn capture(record: &FiberRecord) -> Self {
        let (status, interruptors) =
            record.with_state(|state| (state.status.clone(), state.interruptors.clone()));
        Self {
            id: record.id(),
            status,
            interruptors,
            scope: record.scope().id(),
            daemon: record.is_daemon(),
        }
    }
}

impl fmt::Display for FiberDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.daemon { "daemon" } else { "fiber" };
        write!(f, "{kind} {} (scope {}): {}", self.id, self.scope, self.status)?;
        write_interruptors(f, &self.interruptors)
    }
}

fn write_interruptors(f: &mut fmt::Formatter<'_>, ids: &BTreeSet<FiberId>) -> fmt::Result {
    if ids.is_empty() {
        return Ok(());
    }
    write!(f, ", interrupted by")?;
    for id in ids {
        write!(f, " {id}")?;
    }
    Ok(())
}
