//! Scenario: a burst of events against a slow subscriber. The durable log
//! gets every row; the subscriber misses some and never blocks producers.

use crate::prelude::*;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tq_core::{Event, TaskId};

#[tokio::test]
async fn burst_reaches_log_while_slow_subscriber_lags() {
    let h = harness().await;
    let mut rx = h.subscribe();

    let burst = 5_000;
    let start = std::time::Instant::now();
    for i in 0..burst {
        h.bus
            .emit_sync(Event::TaskProcessing {
                task_id: TaskId::new(i),
            })
            .await;
    }
    // Producers were never blocked by the idle subscriber
    assert!(start.elapsed() < Duration::from_secs(30));

    // The durable log is complete
    assert_eq!(h.store.event_count().await.unwrap(), burst);

    // The subscriber sees a prefix/suffix with an explicit lag marker
    let mut received = 0u32;
    let mut lagged = false;
    loop {
        match rx.try_recv() {
            Ok(_) => received += 1,
            Err(TryRecvError::Lagged(_)) => lagged = true,
            Err(_) => break,
        }
    }
    assert!(lagged, "slow subscriber must observe a lag");
    assert!(u64::from(received) < burst as u64);

    // Catch-up path: the log can replay what the live stream dropped
    let replayed = h.store.events_after(0, burst as u32).await.unwrap();
    assert_eq!(replayed.len(), burst as usize);
}

#[tokio::test]
async fn async_overflow_is_counted_not_blocking() {
    let h = harness().await;
    // Saturate the queue faster than the worker can drain; some events
    // may drop, but emit never blocks and the counter explains the gap.
    let burst = 20_000i64;
    let start = std::time::Instant::now();
    for i in 0..burst {
        h.bus.emit(Event::TaskProcessing {
            task_id: TaskId::new(i),
        });
    }
    assert!(start.elapsed() < Duration::from_secs(5), "emit must not block");

    // Everything not dropped eventually lands in the log
    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    loop {
        let logged = h.store.event_count().await.unwrap() as u64;
        let dropped = h.bus.dropped_count();
        if logged + dropped == burst as u64 {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "logged {logged} + dropped {dropped} != {burst}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
