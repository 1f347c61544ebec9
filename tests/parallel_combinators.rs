//! Parallel combinator tests.
//!
//! # Race
//! - The first success wins and every loser is interrupted exactly once,
//!   whether the caller waits for the losers or leaves them in the background
//!
//! # Parallel Traversal
//! - Results come back in input order for any bound and any finish order
//! - Bounded traversal keeps input order over twenty thousand elements
//! - The first failure interrupts the siblings still running
//! - `with_parallelism` bounds how many elements are in flight
//!
//! # Resource Safety
//! - `bracket_exit` releases on interruption and `timeout` gives up cleanly

#[macro_use]
mod common;

use common::*;
use fiberscope::{
    bracket_exit, collect_all_par_n, effect, foreach_par, foreach_par_n, race_all, timeout,
    zip_par, Cause, Cx, Effect, Exit, FiberId, InterruptStrategy, Time,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_test(name: &str) {
    init_test_logging();
    test_phase!(name);
}

type Interrupts = Arc<Mutex<Vec<(u32, BTreeSet<FiberId>)>>>;

/// Sleeps `ms` then succeeds with `value`, logging any interruption.
fn tracked(value: u32, ms: u64, interrupts: Interrupts) -> Effect<&'static str, u32> {
    effect(move |cx: Cx| async move {
        let sleeper = cx.clone();
        cx.on_interrupt(
            async move {
                sleeper.sleep(Duration::from_millis(ms)).await?;
                Ok::<_, Cause<&'static str>>(value)
            },
            move |ids| async move {
                interrupts.lock().push((value, ids));
            },
        )
        .await
    })
}

proptest! {
    #![proptest_config(test_proptest_config(48))]

    #[test]
    fn bounded_traversal_preserves_input_order(
        n in 1_usize..6,
        delays in proptest::collection::vec(0_u64..20, 0..12),
    ) {
        let rt = test_runtime();
        let expected: Vec<u64> = delays.iter().map(|ms| ms * 10).collect();
        let exit = rt.run(move |cx: Cx| async move {
            foreach_par_n(&cx, n, delays, |cx: Cx, ms: u64| async move {
                cx.sleep(Duration::from_millis(ms)).await?;
                Ok::<_, Cause<()>>(ms * 10)
            })
            .await
        });
        prop_assert_eq!(exit, Exit::succeed(expected));
    }
}

#[test]
fn race_all_returns_the_fastest_and_interrupts_the_rest_once() {
    init_test("race_all_returns_the_fastest_and_interrupts_the_rest_once");
    let rt = test_runtime();
    let interrupts: Interrupts = Arc::default();
    let contenders = vec![
        tracked(1, 10, Arc::clone(&interrupts)),
        tracked(2, 5, Arc::clone(&interrupts)),
    ];
    let exit = rt.run(move |cx: Cx| async move {
        let winner = race_all(&cx, contenders, InterruptStrategy::Wait).await?;
        Ok::<_, Cause<&str>>((winner, cx.id(), cx.now()))
    });
    let (winner, caller, now) = exit.into_result().expect("race succeeds");
    assert_eq!(winner, 2);
    assert_eq!(now, Time::from_millis(5));
    assert_eq!(
        *interrupts.lock(),
        vec![(1, [caller].into_iter().collect())]
    );
    test_complete!("race_all_returns_the_fastest_and_interrupts_the_rest_once");
}

#[test]
fn background_race_interrupts_each_loser_once() {
    init_test("background_race_interrupts_each_loser_once");
    let rt = test_runtime();
    let interrupts: Interrupts = Arc::default();
    let contenders = vec![
        tracked(1, 30, Arc::clone(&interrupts)),
        tracked(2, 20, Arc::clone(&interrupts)),
        tracked(3, 5, Arc::clone(&interrupts)),
        tracked(4, 40, Arc::clone(&interrupts)),
    ];
    let exit = rt.run(move |cx: Cx| async move {
        let winner = race_all(&cx, contenders, InterruptStrategy::Background).await?;
        let returned_at = cx.now();
        cx.sleep(Duration::from_millis(100)).await?;
        Ok::<_, Cause<&str>>((winner, cx.id(), returned_at))
    });
    let (winner, caller, returned_at) = exit.into_result().expect("race succeeds");
    assert_eq!(winner, 3);
    assert_eq!(returned_at, Time::from_millis(5));
    let mut seen = interrupts.lock().clone();
    seen.sort();
    let by_caller: BTreeSet<FiberId> = [caller].into_iter().collect();
    assert_eq!(
        seen,
        vec![
            (1, by_caller.clone()),
            (2, by_caller.clone()),
            (4, by_caller),
        ]
    );
    test_complete!("background_race_interrupts_each_loser_once");
}

#[test]
fn bounded_traversal_keeps_order_over_many_elements() {
    init_test("bounded_traversal_keeps_order_over_many_elements");
    const ELEMENTS: u64 = 20_000;
    let rt = test_runtime();
    let exit = rt.run(|cx: Cx| async move {
        foreach_par_n(&cx, 7, 0..ELEMENTS, |cx: Cx, n: u64| async move {
            if n % 3 == 0 {
                cx.yield_now().await?;
            }
            Ok::<_, Cause<()>>(n * 2)
        })
        .await
    });
    let values = exit.into_result().expect("traversal succeeds");
    assert_eq!(values.len(), ELEMENTS as usize);
    assert!(
        values.iter().copied().eq((0..ELEMENTS).map(|n| n * 2)),
        "values out of order"
    );
    test_complete!("bounded_traversal_keeps_order_over_many_elements");
}

#[test]
fn unbounded_traversal_doubles_in_order() {
    init_test("unbounded_traversal_doubles_in_order");
    let rt = test_runtime();
    let exit = rt.run(|cx: Cx| async move {
        foreach_par(&cx, [1_u32, 2, 3], |_cx: Cx, n: u32| async move {
            Ok::<_, Cause<()>>(n * 2)
        })
        .await
    });
    assert_eq!(exit, Exit::succeed(vec![2, 4, 6]));
    test_complete!("unbounded_traversal_doubles_in_order");
}

#[test]
fn first_failure_interrupts_pending_siblings() {
    init_test("first_failure_interrupts_pending_siblings");
    let rt = test_runtime();
    let interrupts: Interrupts = Arc::default();
    let interrupts_in = Arc::clone(&interrupts);
    let exit = rt.run(move |cx: Cx| async move {
        let outcome = foreach_par(&cx, [1_i32, 2, -1], move |cx: Cx, n: i32| {
            let interrupts = Arc::clone(&interrupts_in);
            async move {
                if n < 0 {
                    return Err(Cause::fail("neg"));
                }
                let value = n.unsigned_abs();
                tracked(value, u64::from(value) * 10, interrupts)(cx).await
            }
        })
        .await;
        Ok::<_, Cause<()>>((outcome, cx.now()))
    });
    let (outcome, now) = exit.into_result().expect("caller succeeds");
    let cause = outcome.expect_err("traversal fails");
    assert_eq!(cause.failures(), vec![&"neg"]);
    assert_eq!(now, Time::ZERO);
    let interrupted: Vec<u32> = interrupts.lock().iter().map(|(value, _)| *value).collect();
    assert!(interrupted.contains(&2), "pending sibling 2 was not interrupted: {interrupted:?}");
    test_complete!("first_failure_interrupts_pending_siblings");
}

#[test]
fn with_parallelism_bounds_in_flight_work() {
    init_test("with_parallelism_bounds_in_flight_work");
    let rt = test_runtime();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (active_in, peak_in) = (Arc::clone(&active), Arc::clone(&peak));
    let exit = rt.run(move |cx: Cx| async move {
        let work = foreach_par(&cx, 0..9_u64, move |cx: Cx, n: u64| {
            let (active, peak) = (Arc::clone(&active_in), Arc::clone(&peak_in));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                cx.sleep(Duration::from_millis(10)).await?;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, Cause<()>>(n)
            }
        });
        let values = cx.with_parallelism(Some(3), work).await?;
        Ok::<_, Cause<()>>((values, cx.now()))
    });
    assert_eq!(
        exit,
        Exit::succeed(((0..9).collect(), Time::from_millis(30)))
    );
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    test_complete!("with_parallelism_bounds_in_flight_work");
}

#[test]
fn collect_all_par_n_runs_effects_in_batches() {
    init_test("collect_all_par_n_runs_effects_in_batches");
    let rt = test_runtime();
    let exit = rt.run(|cx: Cx| async move {
        let effects: Vec<Effect<(), u64>> = (1..=4_u64)
            .map(|n| {
                effect(move |cx: Cx| async move {
                    cx.sleep(Duration::from_millis(n)).await?;
                    Ok::<_, Cause<()>>(n)
                })
            })
            .collect();
        let values = collect_all_par_n(&cx, 2, effects).await?;
        Ok::<_, Cause<()>>((values, cx.now()))
    });
    // Workers pull 1 and 2, then 3 at 1ms and 4 at 2ms.
    assert_eq!(exit, Exit::succeed((vec![1, 2, 3, 4], Time::from_millis(6))));
    test_complete!("collect_all_par_n_runs_effects_in_batches");
}

#[test]
fn zip_par_runs_both_sides_together() {
    init_test("zip_par_runs_both_sides_together");
    let rt = test_runtime();
    let exit = rt.run(|cx: Cx| async move {
        let pair = zip_par(
            &cx,
            |cx: Cx| async move {
                cx.sleep(Duration::from_millis(12)).await?;
                Ok::<_, Cause<()>>('a')
            },
            |cx: Cx| async move {
                cx.sleep(Duration::from_millis(12)).await?;
                Ok::<_, Cause<()>>(1_u8)
            },
        )
        .await?;
        Ok::<_, Cause<()>>((pair, cx.now()))
    });
    assert_eq!(exit, Exit::succeed((('a', 1), Time::from_millis(12))));
    test_complete!("zip_par_runs_both_sides_together");
}

#[test]
fn bracket_releases_when_the_use_is_interrupted() {
    init_test("bracket_releases_when_the_use_is_interrupted");
    let rt = test_runtime();
    let released = Arc::new(Mutex::new(None));
    let released_in = Arc::clone(&released);
    let exit = rt.run(move |cx: Cx| async move {
        let user = cx.fork(move |cx: Cx| async move {
            bracket_exit(
                &cx,
                |_cx: Cx| async move { Ok::<_, Cause<()>>("handle") },
                |cx: Cx, _handle: &'static str| async move {
                    cx.sleep(Duration::from_secs(60)).await?;
                    Ok::<_, Cause<()>>(())
                },
                move |cx: Cx, handle: &'static str, exit: Exit<(), ()>| async move {
                    *released_in.lock() = Some((handle, exit.is_interrupted(), cx.now()));
                    Ok::<_, Cause<()>>(())
                },
            )
            .await
        });
        cx.sleep(Duration::from_millis(3)).await?;
        let exit = user.interrupt(&cx).await;
        Ok::<_, Cause<()>>(exit.is_interrupted())
    });
    assert_eq!(exit, Exit::succeed(true));
    assert_eq!(*released.lock(), Some(("handle", true, Time::from_millis(3))));
    test_complete!("bracket_releases_when_the_use_is_interrupted");
}

#[test]
fn timeout_gives_up_on_slow_work() {
    init_test("timeout_gives_up_on_slow_work");
    let rt = test_runtime();
    let exit = rt.run(|cx: Cx| async move {
        let slow = timeout(&cx, Duration::from_millis(15), |cx: Cx| async move {
            cx.sleep(Duration::from_secs(5)).await?;
            Ok::<_, Cause<()>>("slow")
        })
        .await?;
        let fast = timeout(&cx, Duration::from_millis(15), |cx: Cx| async move {
            cx.sleep(Duration::from_millis(2)).await?;
            Ok::<_, Cause<()>>("fast")
        })
        .await?;
        Ok::<_, Cause<()>>((slow, fast, cx.now()))
    });
    assert_eq!(
        exit,
        Exit::succeed((None, Some("fast"), Time::from_millis(17)))
    );
    test_complete!("timeout_gives_up_on_slow_work");
}
