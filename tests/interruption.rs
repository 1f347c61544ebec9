//! Interruption semantics tests.
//!
//! # Masks
//! - Nested masks restore to the flag in force at their own entry
//! - A mask entered under an uninterruptible ambient restores to uninterruptible
//!
//! # Delivery
//! - A fiber interrupted before it starts never runs its body
//! - An interruption queued in an uninterruptible region lands at region exit
//! - Exits record who asked for the interruption
//!
//! # Combinators
//! - `on_interrupt` sees the interruptors and re-raises the cause
//! - `disconnect` lets the caller leave before the child unwinds

#[macro_use]
mod common;

use common::*;
use fiberscope::{Cause, Cx, Exit, FiberId, InterruptStatus, Time};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_test(name: &str) {
    init_test_logging();
    test_phase!(name);
}

fn ids(ids: impl IntoIterator<Item = FiberId>) -> BTreeSet<FiberId> {
    ids.into_iter().collect()
}

#[test]
fn nested_masks_restore_to_the_outer_flag() {
    init_test("nested_masks_restore_to_the_outer_flag");
    let rt = test_runtime();
    let exit = rt.run(|cx: Cx| async move {
        let outer = cx.clone();
        let seen = cx
            .uninterruptible_mask(move |restore| async move {
                let masked = outer.interrupt_status();
                let inner = outer.clone();
                let nested = outer.uninterruptible_mask(move |restore2| async move {
                    restore2
                        .run(&inner, async { Ok::<_, Cause<()>>(inner.interrupt_status()) })
                        .await
                });
                let restored = restore.run(&outer, nested).await?;
                Ok::<_, Cause<()>>((masked, restored))
            })
            .await?;
        Ok::<_, Cause<()>>((seen, cx.interrupt_status()))
    });
    assert_eq!(
        exit,
        Exit::succeed((
            (InterruptStatus::Uninterruptible, InterruptStatus::Interruptible),
            InterruptStatus::Interruptible,
        ))
    );
    test_complete!("nested_masks_restore_to_the_outer_flag");
}

#[test]
fn mask_under_uninterruptible_ambient_stays_shielded() {
    init_test("mask_under_uninterruptible_ambient_stays_shielded");
    let rt = test_runtime();
    let exit = rt.run(|cx: Cx| async move {
        let inner = cx.clone();
        cx.uninterruptible(async move {
            let cx = inner.clone();
            inner
                .uninterruptible_mask(move |restore| async move {
                    restore
                        .run(&cx, async { Ok::<_, Cause<()>>(cx.interrupt_status()) })
                        .await
                })
                .await
        })
        .await
    });
    assert_eq!(exit, Exit::succeed(InterruptStatus::Uninterruptible));
    test_complete!("mask_under_uninterruptible_ambient_stays_shielded");
}

#[test]
fn interrupted_before_start_never_runs() {
    init_test("interrupted_before_start_never_runs");
    let rt = test_runtime();
    let ran = Arc::new(AtomicBool::new(false));
    let ran_in = Arc::clone(&ran);
    let exit = rt.run(move |cx: Cx| async move {
        let child = cx.fork(move |_cx: Cx| async move {
            ran_in.store(true, Ordering::SeqCst);
            Ok::<_, Cause<()>>(())
        });
        let exit = child.interrupt(&cx).await;
        Ok::<_, Cause<()>>((exit.interruptors(), cx.id()))
    });
    let (interruptors, caller) = exit.into_result().expect("caller succeeds");
    assert_eq!(interruptors, ids([caller]));
    assert!(!ran.load(Ordering::SeqCst), "body must not run");
    test_complete!("interrupted_before_start_never_runs");
}

#[test]
fn queued_interrupt_lands_when_the_region_ends() {
    init_test("queued_interrupt_lands_when_the_region_ends");
    let rt = test_runtime();
    let steps = Arc::new(Mutex::new(Vec::new()));
    let steps_in = Arc::clone(&steps);
    let exit = rt.run(move |cx: Cx| async move {
        let child = cx.fork(move |cx: Cx| async move {
            let inner = cx.clone();
            let log = Arc::clone(&steps_in);
            cx.uninterruptible(async move {
                inner.sleep(Duration::from_millis(10)).await?;
                log.lock().push("shielded work done");
                Ok::<_, Cause<()>>(())
            })
            .await?;
            steps_in.lock().push("after region");
            Ok::<_, Cause<()>>(())
        });
        cx.yield_now().await?;
        let exit = child.interrupt(&cx).await;
        Ok::<_, Cause<()>>((exit.is_interrupted(), cx.now()))
    });
    assert_eq!(exit, Exit::succeed((true, Time::from_millis(10))));
    assert_eq!(*steps.lock(), vec!["shielded work done"]);
    test_complete!("queued_interrupt_lands_when_the_region_ends");
}

#[test]
fn exits_record_every_interruptor() {
    init_test("exits_record_every_interruptor");
    let rt = test_runtime();
    let exit = rt.run(|cx: Cx| async move {
        let first = FiberId::new(901, Time::ZERO);
        let second = FiberId::new(902, Time::ZERO);
        let child = cx.fork(|cx: Cx| async move {
            let inner = cx.clone();
            cx.uninterruptible(async move { inner.sleep(Duration::from_millis(5)).await })
                .await?;
            Ok::<_, Cause<()>>(())
        });
        cx.yield_now().await?;
        child.interrupt_fork(&cx, first);
        let exit = child.interrupt_as(&cx, second).await;
        Ok::<_, Cause<()>>((exit.interruptors(), child.interruptors()))
    });
    let (from_exit, from_fiber) = exit.into_result().expect("caller succeeds");
    assert_eq!(from_exit, from_fiber);
    assert!(from_exit.contains(&FiberId::new(902, Time::ZERO)));
    test_complete!("exits_record_every_interruptor");
}

#[test]
fn on_interrupt_sees_the_interruptors() {
    init_test("on_interrupt_sees_the_interruptors");
    let rt = test_runtime();
    let seen = Arc::new(Mutex::new(None));
    let seen_in = Arc::clone(&seen);
    let culprit = FiberId::new(404, Time::ZERO);
    let exit = rt.run(move |cx: Cx| async move {
        let child = cx.fork(move |cx: Cx| {
            let sleeper = cx.clone();
            async move {
                cx.on_interrupt(
                    async move {
                        sleeper.sleep(Duration::from_secs(60)).await?;
                        Ok::<_, Cause<()>>(())
                    },
                    move |ids| async move {
                        *seen_in.lock() = Some(ids);
                    },
                )
                .await
            }
        });
        cx.yield_now().await?;
        let exit = child.interrupt_as(&cx, culprit).await;
        Ok::<_, Cause<()>>((exit, cx.now()))
    });
    assert_eq!(exit, Exit::succeed((Exit::interrupt(culprit), Time::ZERO)));
    assert_eq!(*seen.lock(), Some(ids([culprit])));
    test_complete!("on_interrupt_sees_the_interruptors");
}

#[test]
fn on_interrupt_skips_cleanup_on_failure() {
    init_test("on_interrupt_skips_cleanup_on_failure");
    let rt = test_runtime();
    let cleaned = Arc::new(AtomicBool::new(false));
    let cleaned_in = Arc::clone(&cleaned);
    let exit = rt.run(move |cx: Cx| async move {
        cx.on_interrupt(async { Err::<(), _>(Cause::fail("plain")) }, move |_| async move {
            cleaned_in.store(true, Ordering::SeqCst);
        })
        .await
    });
    assert_eq!(exit, Exit::fail("plain"));
    assert!(!cleaned.load(Ordering::SeqCst));
    test_complete!("on_interrupt_skips_cleanup_on_failure");
}

#[test]
fn disconnect_returns_before_the_child_unwinds() {
    init_test("disconnect_returns_before_the_child_unwinds");
    let rt = test_runtime();
    let exit = rt.run(|cx: Cx| async move {
        let waiter = cx.fork(|cx: Cx| async move {
            cx.disconnect(|cx: Cx| async move {
                let inner = cx.clone();
                cx.uninterruptible(async move { inner.sleep(Duration::from_millis(50)).await })
                    .await?;
                Ok::<_, Cause<()>>("slow")
            })
            .await
        });
        cx.yield_now().await?;
        let exit = waiter.interrupt(&cx).await;
        Ok::<_, Cause<()>>((exit.is_interrupted(), cx.now()))
    });
    assert_eq!(exit, Exit::succeed((true, Time::ZERO)));
    test_complete!("disconnect_returns_before_the_child_unwinds");
}

#[test]
fn disconnect_passes_through_the_child_outcome() {
    init_test("disconnect_passes_through_the_child_outcome");
    let rt = test_runtime();
    let exit = rt.run(|cx: Cx| async move {
        cx.disconnect(|cx: Cx| async move {
            cx.sleep(Duration::from_millis(3)).await?;
            Err::<u8, _>(Cause::fail("child failed"))
        })
        .await
    });
    assert_eq!(exit, Exit::fail("child failed"));
    test_complete!("disconnect_passes_through_the_child_outcome");
}
