//! Property-based tests for the async engine.
//!
//! Uses a std-only xorshift generator rather than an external crate.
//!
//! ## Invariants Tested
//!
//! - The runner never waits longer than min(timeout, budget, remaining)
//! - A lane finishes as Completed iff its latency is below that bound
//! - RRF output is sorted by fused score, and extra support never hurts
//! - A breaker opens exactly at its threshold

use fanout_engine::fusion::{fuse, RankedList};
use fanout_engine::lanes::RegisteredLane;
use fanout_engine::{CircuitBreakerRegistry, FakeLane, LaneRunner};
use fanout_shared::{DeadlineSpec, DeadlineTracker, LaneConfig, LaneStatus, RankedItem, SharedContext};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Simple pseudo-random number generator for test inputs
/// Uses xorshift64 algorithm
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

    /// Value in [lo, hi]
    fn range(&mut self, lo: u64, hi: u64) -> u64 {
        lo + self.next_u64() % (hi - lo + 1)
    }
}

fn ranked_list(rng: &mut TestRng, source: &str, pool: u64, len: usize) -> Vec<RankedItem> {
    let mut ids: Vec<String> = Vec::new();
    while ids.len() < len {
        let id = format!("doc-{}", rng.range(0, pool - 1));
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids.iter().map(|id| RankedItem::new(id, id, source)).collect()
}

// ============================================================================
// Runner timeout bound
// ============================================================================

#[tokio::test(start_paused = true)]
async fn prop_runner_respects_effective_timeout() {
    let mut rng = TestRng::new(0x5EED_0001);

    for case in 0..60 {
        let timeout_ms = rng.range(1, 400);
        let allocated_ms = rng.range(1, 400);
        let deadline_ms = rng.range(1, 400);
        let latency_ms = rng.range(0, 500);

        let tracker = DeadlineTracker::start(DeadlineSpec {
            global_deadline_ms: deadline_ms,
            orchestrator_reserve_ms: 0,
            ttft_target_ms: deadline_ms,
        });
        let effective = timeout_ms.min(allocated_ms).min(deadline_ms);
        if latency_ms == effective {
            continue;
        }

        let fake = FakeLane::slow("web", Duration::from_millis(latency_ms), 1);
        let lane = RegisteredLane {
            config: LaneConfig::new("web", timeout_ms),
            lane: fake.clone(),
        };
        let runner = LaneRunner::new(Arc::new(CircuitBreakerRegistry::default()));

        let start = tokio::time::Instant::now();
        let result = runner
            .run(&lane, "q", Arc::new(SharedContext::new()), allocated_ms, &tracker)
            .await;
        let waited = start.elapsed();

        assert_eq!(result.effective_timeout_ms, effective, "case {}", case);
        assert!(
            waited <= Duration::from_millis(effective + 1),
            "case {}: waited {:?} for effective {}ms",
            case,
            waited,
            effective
        );
        if latency_ms < effective {
            assert_eq!(result.status, LaneStatus::Completed, "case {}", case);
        } else {
            assert_eq!(result.status, LaneStatus::Timeout, "case {}", case);
            assert_eq!(result.elapsed_ms, effective);
        }
        assert_eq!(fake.calls(), 1);
    }
}

// ============================================================================
// RRF monotonicity
// ============================================================================

#[test]
fn prop_rrf_sorted_by_score() {
    let mut rng = TestRng::new(0xF0_5E);

    for _ in 0..100 {
        let lists: Vec<Vec<RankedItem>> = (0..rng.range(1, 4))
            .map(|i| {
                let len = rng.range(1, 8) as usize;
                ranked_list(&mut rng, &format!("lane{}", i), 12, len)
            })
            .collect();
        let names: Vec<String> = (0..lists.len()).map(|i| format!("lane{}", i)).collect();
        let ranked: Vec<RankedList<'_>> = lists
            .iter()
            .zip(&names)
            .map(|(items, name)| RankedList { lane: name, items })
            .collect();

        let fused = fuse(&ranked, 60, 20, 50);
        for pair in fused.windows(2) {
            assert!(pair[0].fused_score >= pair[1].fused_score);
        }
        for item in &fused {
            assert!(item.fused_score > 0.0);
            assert!(item.contributing_lanes.len() <= lists.len());
        }
    }
}

#[test]
fn prop_rrf_extra_support_never_hurts() {
    let mut rng = TestRng::new(0xBEEF);

    for _ in 0..100 {
        let a_len = rng.range(1, 6) as usize;
        let b_len = rng.range(1, 6) as usize;
        let a = ranked_list(&mut rng, "a", 10, a_len);
        let b = ranked_list(&mut rng, "b", 10, b_len);
        let target = a[rng.range(0, a.len() as u64 - 1) as usize].clone();
        let support = vec![target.clone()];

        let base_lists = [
            RankedList { lane: "a", items: &a },
            RankedList { lane: "b", items: &b },
        ];
        let boosted_lists = [
            RankedList { lane: "a", items: &a },
            RankedList { lane: "b", items: &b },
            RankedList { lane: "c", items: &support },
        ];

        let key = target.id.clone().unwrap();
        let base = fuse(&base_lists, 60, 20, 50);
        let boosted = fuse(&boosted_lists, 60, 20, 50);

        let base_pos = base.iter().position(|f| f.key == key).unwrap();
        let boosted_pos = boosted.iter().position(|f| f.key == key).unwrap();
        assert!(boosted[boosted_pos].fused_score > base[base_pos].fused_score);
        assert!(boosted_pos <= base_pos);
    }
}

// ============================================================================
// Breaker threshold
// ============================================================================

#[tokio::test]
async fn prop_breaker_opens_at_threshold() {
    let mut rng = TestRng::new(0xC1C1);

    for _ in 0..40 {
        let threshold = rng.range(1, 8) as u32;
        let registry = CircuitBreakerRegistry::new(threshold, Duration::from_secs(60));

        for i in 1..=threshold {
            registry.record_outcome("lane", LaneStatus::Failed).await;
            assert_eq!(registry.should_skip("lane").await, i >= threshold);
        }

        // A success closes it, one more failure re-opens it
        registry.record_outcome("lane", LaneStatus::Completed).await;
        assert!(!registry.should_skip("lane").await);
        registry.record_outcome("lane", LaneStatus::Timeout).await;
        assert!(registry.should_skip("lane").await);
    }
}
