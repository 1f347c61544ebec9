//! Parallel zip: run two effects at once and keep both values.
//!
//! `zip_par` is fail-fast. It rides on the unbounded parallel traversal, so
//! the first failure interrupts the other side and the caller sees that
//! failure, combined with any failure the other side produced concurrently.

use super::{effect, foreach_par_unbounded, Effect};
use crate::cx::Cx;
use crate::types::Cause;
use std::future::Future;

#[derive(Clone)]
enum Side<A, B> {
    Left(A),
    Right(B),
}

/// Runs `left` and `right` in parallel and combines their values with `f`.
pub async fn zip_with_par<E, A, B, C, L, LFut, R, RFut, F>(
    cx: &Cx,
    left: L,
    right: R,
    f: F,
) -> Result<C, Cause<E>>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    L: FnOnce(Cx) -> LFut + Send + 'static,
    LFut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
    R: FnOnce(Cx) -> RFut + Send + 'static,
    RFut: Future<Output = Result<B, Cause<E>>> + Send + 'static,
    F: FnOnce(A, B) -> C,
{
    let sides: [Effect<E, Side<A, B>>; 2] = [
        effect(move |cx: Cx| async move { left(cx).await.map(Side::Left) }),
        effect(move |cx: Cx| async move { right(cx).await.map(Side::Right) }),
    ];
    let values = foreach_par_unbounded(cx, sides, |cx: Cx, side: Effect<E, Side<A, B>>| side(cx))
        .await?;
    match <[Side<A, B>; 2]>::try_from(values) {
        Ok([Side::Left(a), Side::Right(b)]) => Ok(f(a, b)),
        _ => Err(Cause::die("zip_par lost track of a side")),
    }
}

/// Runs `left` and `right` in parallel and pairs their values.
pub async fn zip_par<E, A, B, L, LFut, R, RFut>(
    cx: &Cx,
    left: L,
    right: R,
) -> Result<(A, B), Cause<E>>
where
    E: Clone + Send + 'static,
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    L: FnOnce(Cx) -> LFut + Send + 'static,
    LFut: Future<Output = Result<A, Cause<E>>> + Send + 'static,
    R: FnOnce(Cx) -> RFut + Send + 'static,
    RFut: Future<Output = Result<B, Cause<E>>> + Send + 'static,
{
    zip_with_par(cx, left, right, |a, b| (a, b)).await
}
