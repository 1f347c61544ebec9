//! Timeout combinator: give an effect a deadline.
//!
//! `timeout` races the effect against a sleep on the virtual clock. Whichever
//! finishes first decides the result; the other side is interrupted and
//! drained before `timeout` returns.
//!
//! ```text
//! timeout(d, f):
//!   f finishes first      -> Ok(Some(a)) or Err(cause)
//!   deadline passes first -> f interrupted and drained, Ok(None)
//! ```
//!
//! A failure of `f` before the deadline is reported as-is rather than waiting
//! out the deadline.

use super::race::{race_all, InterruptStrategy};
use super::{effect, Effect};
use crate::cx::Cx;
use crate::types::Cause;
use std::future::Future;
use std::time::Duration;

/// Runs `f` with a deadline of `duration` from now.
///
/// Returns `Ok(None)` if the deadline passed first.
pub async fn timeout<E, A, F, Fut>(cx: &Cx, duration: Duration, f: F) -> Result<Option<A>, Cause<E>>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
{
    // The effect's own outcome travels inside the value, so the first side
    // to finish settles the race.
    let contenders: [Effect<E, Option<Result<A, Cause<E>>>>; 2] = [
        effect(move |cx: Cx| async move { Ok(Some(f(cx).await)) }),
        effect(move |cx: Cx| async move {
            cx.sleep(duration).await?;
            Ok::<_, Cause<E>>(None)
        }),
    ];
    match race_all(cx, contenders, InterruptStrategy::Wait).await? {
        Some(outcome) => outcome.map(Some),
        None => Ok(None),
    }
}
