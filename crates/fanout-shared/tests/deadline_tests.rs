//! Tests for deadline.rs
//!
//! Uses a paused tokio clock so elapsed time is exact.

use fanout_shared::deadline::{DeadlineSpec, DeadlineTracker};
use std::sync::Arc;
use std::time::Duration;

/// xorshift64, enough for randomized step sizes
struct TestRng {
    state: u64,
}

impl TestRng {
    fn new(seed: u64) -> Self {
        Self { state: if seed == 0 { 1 } else { seed } }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_range(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        min + (self.next_u64() % (max - min))
    }
}

fn spec() -> DeadlineSpec {
    DeadlineSpec {
        global_deadline_ms: 2_000,
        orchestrator_reserve_ms: 100,
        ttft_target_ms: 500,
    }
}

#[tokio::test(start_paused = true)]
async fn test_remaining_never_increases_and_slack_never_decreases() {
    for seed in 1..=20u64 {
        let mut rng = TestRng::new(seed);
        let tracker = DeadlineTracker::start(spec());
        let mut last_remaining = tracker.remaining();
        let mut last_slack = tracker.slack_pool_ms();

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(rng.next_range(0, 80))).await;
            tracker.add_to_slack_pool(rng.next_range(0, 300));

            let remaining = tracker.remaining();
            let slack = tracker.slack_pool_ms();
            assert!(remaining <= last_remaining, "seed {}: remaining went up", seed);
            assert!(slack >= last_slack, "seed {}: slack went down", seed);
            last_remaining = remaining;
            last_slack = slack;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_can_allocate_matches_definition() {
    let mut rng = TestRng::new(7);
    let tracker = DeadlineTracker::start(spec());
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(rng.next_range(0, 100))).await;
        let request = rng.next_range(0, 2_500);
        assert_eq!(
            tracker.can_allocate(request),
            tracker.remaining() >= request + tracker.orchestrator_reserve_ms()
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_slack_appends() {
    let tracker = Arc::new(DeadlineTracker::start(spec()));
    let mut handles = Vec::new();
    for i in 0..16u64 {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                tracker.add_to_slack_pool(i + 1);
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    // 100 * (1 + 2 + ... + 16)
    assert_eq!(tracker.slack_pool_ms(), 100 * 136);
}

#[tokio::test(start_paused = true)]
async fn test_remaining_reaches_zero_at_deadline() {
    let tracker = DeadlineTracker::start(spec());
    tokio::time::sleep(Duration::from_millis(1_999)).await;
    assert_eq!(tracker.remaining(), 1);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(tracker.remaining(), 0);
    assert!(!tracker.can_allocate(0));
}
