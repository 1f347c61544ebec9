//! Failure causes.
//!
//! A [`Cause`] is a tree describing *why* an effect did not succeed. Leaves are
//! typed failures ([`Cause::Fail`]), untyped defects ([`Cause::Halt`]) and
//! interruptions ([`Cause::Interrupt`]). Inner nodes record whether two causes
//! happened one after the other ([`Cause::Then`]) or concurrently
//! ([`Cause::Both`]).
//!
//! # Composition
//!
//! `then` is associative but not commutative; `both` is commutative. Both smart
//! constructors drop [`Cause::Empty`] operands, so `Empty` is their identity.
//!
//! # Interruption
//!
//! Interruption is never a typed `E`. Code that must react to it inspects the
//! cause tree ([`Cause::interrupted`], [`Cause::interruptors`]).

use crate::types::FiberId;
use core::fmt;
use serde::Serialize;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::BTreeSet;

/// An unexpected, untyped failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Defect {
    message: String,
}

impl Defect {
    /// Creates a defect with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Builds a defect from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self::new(format!("panic: {message}"))
    }

    /// Returns the defect message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The reason an effect failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause<E> {
    /// No failure. Identity of [`Cause::then`] and [`Cause::both`].
    Empty,
    /// An expected, typed failure.
    Fail(E),
    /// An unexpected defect.
    Halt(Defect),
    /// Interruption attributed to the given fiber.
    Interrupt(FiberId),
    /// The left cause happened, then the right one.
    Then(Box<Self>, Box<Self>),
    /// Both causes happened concurrently.
    Both(Box<Self>, Box<Self>),
}

impl<E> Default for Cause<E> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<E> Cause<E> {
    /// A typed failure.
    #[must_use]
    pub const fn fail(error: E) -> Self {
        Self::Fail(error)
    }

    /// A defect.
    #[must_use]
    pub const fn halt(defect: Defect) -> Self {
        Self::Halt(defect)
    }

    /// A defect with the given message.
    #[must_use]
    pub fn die(message: impl Into<String>) -> Self {
        Self::Halt(Defect::new(message))
    }

    /// An interruption attributed to `id`.
    #[must_use]
    pub const fn interrupt(id: FiberId) -> Self {
        Self::Interrupt(id)
    }

    /// Sequential composition: `self` happened, then `next`.
    #[must_use]
    pub fn then(self, next: Self) -> Self {
        match (self.is_empty(), next.is_empty()) {
            (true, _) => next,
            (_, true) => self,
            _ => Self::Then(Box::new(self), Box::new(next)),
        }
    }

    /// Parallel composition: `self` and `other` happened concurrently.
    #[must_use]
    pub fn both(self, other: Self) -> Self {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => other,
            (_, true) => self,
            _ => Self::Both(Box::new(self), Box::new(other)),
        }
    }

    /// Returns true if the tree contains no failure of any kind.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Fail(_) | Self::Halt(_) | Self::Interrupt(_) => false,
            Self::Then(l, r) | Self::Both(l, r) => l.is_empty() && r.is_empty(),
        }
    }

    /// Typed failures, left to right.
    #[must_use]
    pub fn failures(&self) -> Vec<&E> {
        let mut out = Vec::new();
        self.visit(&mut |node| {
            if let Self::Fail(e) = node {
                out.push(e);
            }
        });
        out
    }

    /// The first typed failure, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<&E> {
        self.failures().into_iter().next()
    }

    /// Defects, left to right.
    #[must_use]
    pub fn defects(&self) -> Vec<&Defect> {
        let mut out = Vec::new();
        self.visit(&mut |node| {
            if let Self::Halt(d) = node {
                out.push(d);
            }
        });
        out
    }

    /// Every fiber that contributed an interruption.
    #[must_use]
    pub fn interruptors(&self) -> BTreeSet<FiberId> {
        let mut out = BTreeSet::new();
        self.visit(&mut |node| {
            if let Self::Interrupt(id) = node {
                out.insert(*id);
            }
        });
        out
    }

    /// Returns true if the tree contains an `Interrupt` node.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        let mut found = false;
        self.visit(&mut |node| found |= matches!(node, Self::Interrupt(_)));
        found
    }

    /// Returns true if the tree contains a typed failure or a defect.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        let mut found = false;
        self.visit(&mut |node| found |= matches!(node, Self::Fail(_) | Self::Halt(_)));
        found
    }

    /// Returns true if interruption is the only thing in the tree.
    #[must_use]
    pub fn interrupted_only(&self) -> bool {
        self.interrupted() && !self.is_failure()
    }

    /// Removes typed failures, keeping defects and interruptions.
    #[must_use]
    pub fn strip_failures<E2>(self) -> Cause<E2> {
        self.filter_map(&mut |leaf| match leaf {
            Self::Fail(_) => Cause::Empty,
            Self::Halt(d) => Cause::Halt(d),
            Self::Interrupt(id) => Cause::Interrupt(id),
            _ => Cause::Empty,
        })
    }

    /// Removes interruptions attributed to `id`.
    #[must_use]
    pub fn strip_interrupts_by(self, id: FiberId) -> Self {
        self.filter_map(&mut |leaf| match leaf {
            Self::Interrupt(by) if by == id => Self::Empty,
            other => other,
        })
    }

    /// Maps the typed failures.
    #[must_use]
    pub fn map<E2, F>(self, mut f: F) -> Cause<E2>
    where
        F: FnMut(E) -> E2,
    {
        self.filter_map(&mut |leaf| match leaf {
            Self::Fail(e) => Cause::Fail(f(e)),
            Self::Halt(d) => Cause::Halt(d),
            Self::Interrupt(id) => Cause::Interrupt(id),
            _ => Cause::Empty,
        })
    }

    /// Forgets the failure type while keeping the tree's shape.
    #[must_use]
    pub fn erase(&self) -> Cause<()> {
        match self {
            Self::Empty => Cause::Empty,
            Self::Fail(_) => Cause::Fail(()),
            Self::Halt(d) => Cause::Halt(d.clone()),
            Self::Interrupt(id) => Cause::Interrupt(*id),
            Self::Then(l, r) => Cause::Then(Box::new(l.erase()), Box::new(r.erase())),
            Self::Both(l, r) => Cause::Both(Box::new(l.erase()), Box::new(r.erase())),
        }
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Self)) {
        f(self);
        if let Self::Then(l, r) | Self::Both(l, r) = self {
            l.visit(f);
            r.visit(f);
        }
    }

    /// Rebuilds the tree bottom-up, replacing every leaf and re-normalizing
    /// empties through the smart constructors.
    fn filter_map<E2>(self, f: &mut impl FnMut(Self) -> Cause<E2>) -> Cause<E2> {
        match self {
            Self::Then(l, r) => {
                let l = l.filter_map(f);
                l.then(r.filter_map(f))
            }
            Self::Both(l, r) => {
                let l = l.filter_map(f);
                l.both(r.filter_map(f))
            }
            leaf => f(leaf),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for Cause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Fail(e) => write!(f, "Fail({e:?})"),
            Self::Halt(d) => write!(f, "Halt({d})"),
            Self::Interrupt(id) => write!(f, "Interrupt({id})"),
            Self::Then(l, r) => write!(f, "({l} ++ {r})"),
            Self::Both(l, r) => write!(f, "({l} && {r})"),
        }
    }
}

/// Signal returned by a suspension point when the calling fiber was interrupted.
///
/// Converts into a [`Cause`] so `?` propagates it out of an effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interrupted {
    by: SmallVec<[FiberId; 2]>,
}

impl Interrupted {
    pub(crate) fn new(by: impl IntoIterator<Item = FiberId>) -> Self {
        Self {
            by: by.into_iter().collect(),
        }
    }

    /// The fibers that requested the interruption, in id order.
    #[must_use]
    pub fn interruptors(&self) -> &[FiberId] {
        &self.by
    }
}

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interrupted by ")?;
        for (i, id) in self.by.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Interrupted {}

impl<E> From<Interrupted> for Cause<E> {
    fn from(interrupted: Interrupted) -> Self {
        if interrupted.by.is_empty() {
            return Self::Interrupt(FiberId::NONE);
        }
        interrupted
            .by
            .into_iter()
            .fold(Self::Empty, |acc, id| acc.both(Self::Interrupt(id)))
    }
}
