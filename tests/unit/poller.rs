//! Tests for the poll controller, including the stop-vs-tick race

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use kafka_rebalance_operator::controller::lock::ResourceKey;
use kafka_rebalance_operator::controller::poller::{PollController, PollEnd};

fn key() -> ResourceKey {
    ResourceKey::new("ns", "my-rebalance")
}

#[test]
fn at_most_one_timer_per_key() {
    let controller = PollController::new(Duration::from_millis(10));
    let guard = controller.try_begin(&key()).unwrap();
    assert!(controller.is_active(&key()));
    assert!(controller.try_begin(&key()).is_none());

    // Different keys do not interfere
    let other = controller.try_begin(&ResourceKey::new("ns", "other"));
    assert!(other.is_some());

    drop(guard);
    assert!(!controller.is_active(&key()));
}

/// A `stop` request set while a tick is in flight must be honored by the
/// next tick: every tick re-reads the shared state before issuing a request,
/// so the update cannot be lost.
#[tokio::test(start_paused = true)]
async fn stop_set_mid_flight_is_observed_by_the_next_tick() {
    let controller = PollController::new(Duration::from_millis(100));
    let mut guard = controller.try_begin(&key()).unwrap();

    // Stands in for the stored resource: the user flips the annotation to
    // stop while a tick is already past its re-read
    let stop_annotation = Arc::new(AtomicBool::new(false));
    let ticks = Arc::new(AtomicU32::new(0));

    let end = {
        let stop_annotation = stop_annotation.clone();
        let ticks = ticks.clone();
        controller
            .run(&mut guard, || Box::pin(async {
                let tick = ticks.fetch_add(1, Ordering::SeqCst);
                // The re-read happens first, mirroring the real tick
                let stop_requested = stop_annotation.load(Ordering::SeqCst);
                if stop_requested {
                    return Ok(ControlFlow::Break("Stopped"));
                }
                if tick == 0 {
                    // The user sets the annotation while this tick's
                    // (pretend) REST request is still in flight
                    stop_annotation.store(true, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Ok(ControlFlow::Continue(()))
            }))
            .await
            .unwrap()
    };

    assert_eq!(end, PollEnd::Completed("Stopped"));
    assert_eq!(ticks.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn deleted_resource_self_cancels() {
    let controller = PollController::new(Duration::from_millis(50));
    let mut guard = controller.try_begin(&key()).unwrap();

    // A tick that observes a deleted resource completes with no status
    let deleted_after = 2u32;
    let mut seen = 0u32;
    let end: PollEnd<Option<&str>> = controller
        .run(&mut guard, || Box::pin(async {
            seen += 1;
            if seen > deleted_after {
                Ok(ControlFlow::Break(None))
            } else {
                Ok(ControlFlow::Continue(()))
            }
        }))
        .await
        .unwrap();

    assert_eq!(end, PollEnd::Completed(None));
}

#[tokio::test(start_paused = true)]
async fn cancellation_beats_a_long_period() {
    let controller = Arc::new(PollController::new(Duration::from_secs(300)));
    let mut guard = controller.try_begin(&key()).unwrap();

    let canceller = controller.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        canceller.cancel(&key());
    });

    let end: PollEnd<()> = controller
        .run(&mut guard, || Box::pin(async { Ok(ControlFlow::Continue(())) }))
        .await
        .unwrap();
    assert_eq!(end, PollEnd::Cancelled);
}
