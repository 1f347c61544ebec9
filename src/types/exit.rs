//! Terminal outcome of a fiber or effect.

use crate::types::{Cause, Defect, FiberId};
use std::collections::BTreeSet;

/// The terminal outcome of an effect: a value or a [`Cause`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit<E, A> {
    /// The effect produced a value.
    Success(A),
    /// The effect failed.
    Failure(Cause<E>),
}

/// An exit whose failure and success types have been forgotten.
///
/// Scope finalizers receive this: they can see *how* a scope ended (value,
/// typed failure, defect, interruption and by whom) without being generic over
/// every fiber that closes it.
pub type ErasedExit = Exit<(), ()>;

impl<E, A> Exit<E, A> {
    /// A successful exit.
    #[must_use]
    pub const fn succeed(value: A) -> Self {
        Self::Success(value)
    }

    /// A typed failure.
    #[must_use]
    pub const fn fail(error: E) -> Self {
        Self::Failure(Cause::Fail(error))
    }

    /// A defect.
    #[must_use]
    pub const fn halt(defect: Defect) -> Self {
        Self::Failure(Cause::Halt(defect))
    }

    /// A defect with the given message.
    #[must_use]
    pub fn die(message: impl Into<String>) -> Self {
        Self::Failure(Cause::die(message))
    }

    /// An interruption attributed to `id`.
    #[must_use]
    pub const fn interrupt(id: FiberId) -> Self {
        Self::Failure(Cause::Interrupt(id))
    }

    /// Returns true for [`Exit::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for [`Exit::Failure`].
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns true if the failure cause contains an interruption.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Failure(cause) if cause.interrupted())
    }

    /// The interruptors recorded in the cause, if any.
    #[must_use]
    pub fn interruptors(&self) -> BTreeSet<FiberId> {
        match self {
            Self::Success(_) => BTreeSet::new(),
            Self::Failure(cause) => cause.interruptors(),
        }
    }

    /// The success value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&A> {
        match self {
            Self::Success(a) => Some(a),
            Self::Failure(_) => None,
        }
    }

    /// The failure cause, if any.
    #[must_use]
    pub const fn cause(&self) -> Option<&Cause<E>> {
        match self {
            Self::Success(_) => None,
            Self::Failure(cause) => Some(cause),
        }
    }

    /// Maps the success value.
    #[must_use]
    pub fn map<B>(self, f: impl FnOnce(A) -> B) -> Exit<E, B> {
        match self {
            Self::Success(a) => Exit::Success(f(a)),
            Self::Failure(cause) => Exit::Failure(cause),
        }
    }

    /// Maps the typed failures.
    #[must_use]
    pub fn map_error<E2>(self, f: impl FnMut(E) -> E2) -> Exit<E2, A> {
        match self {
            Self::Success(a) => Exit::Success(a),
            Self::Failure(cause) => Exit::Failure(cause.map(f)),
        }
    }

    /// Combines two exits. Values are merged with `f`; when both sides failed
    /// their causes are merged with `g`.
    #[must_use]
    pub fn zip_with<B, C>(
        self,
        other: Exit<E, B>,
        f: impl FnOnce(A, B) -> C,
        g: impl FnOnce(Cause<E>, Cause<E>) -> Cause<E>,
    ) -> Exit<E, C> {
        match (self, other) {
            (Self::Success(a), Exit::Success(b)) => Exit::Success(f(a, b)),
            (Self::Failure(l), Exit::Failure(r)) => Exit::Failure(g(l, r)),
            (Self::Failure(l), Exit::Success(_)) => Exit::Failure(l),
            (Self::Success(_), Exit::Failure(r)) => Exit::Failure(r),
        }
    }

    /// Combines two exits produced one after the other.
    #[must_use]
    pub fn zip<B>(self, other: Exit<E, B>) -> Exit<E, (A, B)> {
        self.zip_with(other, |a, b| (a, b), Cause::then)
    }

    /// Combines two exits produced concurrently.
    #[must_use]
    pub fn zip_par<B>(self, other: Exit<E, B>) -> Exit<E, (A, B)> {
        self.zip_with(other, |a, b| (a, b), Cause::both)
    }

    /// Collects concurrent exits in order; failures are merged with `Both`.
    ///
    /// Returns `None` for an empty input.
    #[must_use]
    pub fn collect_all_par(exits: impl IntoIterator<Item = Self>) -> Option<Exit<E, Vec<A>>> {
        let mut exits = exits.into_iter();
        let first = exits.next()?.map(|a| vec![a]);
        Some(exits.fold(first, |acc, exit| {
            acc.zip_with(
                exit,
                |mut values, a| {
                    values.push(a);
                    values
                },
                Cause::both,
            )
        }))
    }

    /// Forgets both type parameters.
    #[must_use]
    pub fn erase(&self) -> ErasedExit {
        match self {
            Self::Success(_) => Exit::Success(()),
            Self::Failure(cause) => Exit::Failure(cause.erase()),
        }
    }

    /// Converts into a `Result`.
    pub fn into_result(self) -> Result<A, Cause<E>> {
        match self {
            Self::Success(a) => Ok(a),
            Self::Failure(cause) => Err(cause),
        }
    }
}

impl<E, A> From<Result<A, Cause<E>>> for Exit<E, A> {
    fn from(result: Result<A, Cause<E>>) -> Self {
        match result {
            Ok(a) => Self::Success(a),
            Err(cause) => Self::Failure(cause),
        }
    }
}
