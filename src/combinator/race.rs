//! Race combinator: run multiple effects, first success wins.
//!
//! Every contender runs on its own interruptible fiber. One arbiter fiber per
//! contender waits for it and settles the race:
//!
//! ```text
//! race_all([f1, f2, ...]):
//!   fi ← fork(interruptible(fi))         for each contender
//!   arbiter(fi):
//!     Success(a) → if first winner: interrupt every other contender
//!     Failure(c) → if last one standing: fail the race with c
//!   await winner
//! ```
//!
//! # Critical Invariant: Losers Are Interrupted
//!
//! Once a winner is installed, each losing contender receives exactly one
//! interruption attributed to the fiber that called the race. With
//! [`InterruptStrategy::Wait`] the caller also waits until every loser has
//! finished before returning; with [`InterruptStrategy::Background`] the
//! losers unwind on their own while the caller carries on.
//!
//! # Outcome Semantics
//!
//! - The first success wins, whatever fails before it.
//! - The race fails only when every contender fails. The reported cause is
//!   the one of the contender that failed last.
//! - If the caller is interrupted, every contender is interrupted and awaited.
//!
//! # Algebraic Laws
//!
//! - Commutativity: `race(a, b) ≃ race(b, a)` up to which of two simultaneous
//!   winners is chosen
//! - Identity: `race(a, never) ≃ a` when `a` succeeds

use super::{effect, Effect};
use crate::cx::Cx;
use crate::fiber::RuntimeFiber;
use crate::sync::Promise;
use crate::tracing_compat::{debug, trace};
use crate::types::{Cause, Exit, FiberId};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What the caller of a race does with the losers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterruptStrategy {
    /// Return as soon as there is a winner; losers unwind in the background.
    #[default]
    Background,
    /// Return only after every loser has finished unwinding.
    Wait,
}

/// Settles the race for one contender.
struct Arbiter<E, A> {
    index: usize,
    contenders: Arc<[RuntimeFiber<E, A>]>,
    winner: Promise<E, (A, usize)>,
    remaining: Arc<AtomicUsize>,
    by: FiberId,
}

impl<E, A> Arbiter<E, A>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    async fn run(self, cx: Cx) -> Result<(), Cause<()>> {
        let contender = &self.contenders[self.index];
        match cx.shielded(contender.await_exit(&cx)).await {
            Ok(Exit::Success(value)) => {
                if self.winner.succeed((value, self.index)) {
                    trace!(winner = %contender.id(), "race winner installed");
                    for (index, loser) in self.contenders.iter().enumerate() {
                        if index != self.index {
                            loser.record().request_interrupt(self.by);
                        }
                    }
                }
            }
            Ok(Exit::Failure(cause)) => {
                if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    self.winner.fail_cause(cause);
                }
            }
            Err(_) => {}
        }
        Ok(())
    }
}

/// Races `effects` and returns the first success.
///
/// An empty race dies, since it could never produce a value.
pub async fn race_all<E, A, Eff, Fut>(
    cx: &Cx,
    effects: impl IntoIterator<Item = Eff>,
    strategy: InterruptStrategy,
) -> Result<A, Cause<E>>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
    Eff: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
{
    let effects: Vec<Eff> = effects.into_iter().collect();
    if effects.is_empty() {
        return Err(Cause::die("race_all needs at least one contender"));
    }
    let cx = cx.clone();
    cx.clone()
        .uninterruptible_mask(move |restore| async move {
            let parent = cx.id();
            debug!(fiber = %parent, contenders = effects.len(), ?strategy, "race starting");
            let contenders: Arc<[RuntimeFiber<E, A>]> = effects
                .into_iter()
                .map(|effect| {
                    cx.fork(move |cx: Cx| async move {
                        let body = effect(cx.clone());
                        cx.interruptible(body).await
                    })
                })
                .collect();

            let winner: Promise<E, (A, usize)> = Promise::make();
            let remaining = Arc::new(AtomicUsize::new(contenders.len()));
            for index in 0..contenders.len() {
                let arbiter = Arbiter {
                    index,
                    contenders: Arc::clone(&contenders),
                    winner: winner.clone(),
                    remaining: Arc::clone(&remaining),
                    by: parent,
                };
                let _arbiter: RuntimeFiber<(), ()> = cx.fork(move |cx: Cx| arbiter.run(cx));
            }

            match restore.run(&cx, winner.await_exit(&cx)).await {
                Ok(Exit::Success((value, index))) => {
                    contenders[index].inherit_refs(&cx);
                    if strategy == InterruptStrategy::Wait {
                        drain(&cx, &contenders).await;
                    }
                    Ok(value)
                }
                Ok(Exit::Failure(cause)) => Err(cause),
                Err(interrupted) => {
                    for contender in contenders.iter() {
                        contender.record().request_interrupt(parent);
                    }
                    drain(&cx, &contenders).await;
                    Err(interrupted.into())
                }
            }
        })
        .await
}

async fn drain<E, A>(cx: &Cx, contenders: &[RuntimeFiber<E, A>])
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    for contender in contenders {
        let _exit = cx.shielded(contender.await_exit(cx)).await;
    }
}

/// Races two effects, waiting for the loser to finish before returning.
pub async fn race<E, A, L, LFut, R, RFut>(cx: &Cx, left: L, right: R) -> Result<A, Cause<E>>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
    L: FnOnce(Cx) -> LFut + Send + 'static,
    LFut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
    R: FnOnce(Cx) -> RFut + Send + 'static,
    RFut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
{
    let contenders: [Effect<E, A>; 2] = [effect(left), effect(right)];
    race_all(cx, contenders, InterruptStrategy::Wait).await
}
