//! Fake lanes for deterministic tests and the lane simulator
//!
//! A [`FakeLane`] sleeps for a configured latency and then plays back scripted
//! outcomes, counting every invocation. No network, no shell.

use super::Lane;
use async_trait::async_trait;
use fanout_shared::{LaneError, LanePayload, RankedItem, SharedContext};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a fake lane does on one invocation
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// Return this payload
    Succeed(LanePayload),
    /// Return `LaneError::Failed`
    Fail(String),
    /// Panic inside the lane task
    Panic(String),
    /// Never return (must be cancelled)
    Hang,
}

/// Scripted lane with a call counter
#[derive(Debug)]
pub struct FakeLane {
    name: String,
    latency: Duration,
    script: Mutex<VecDeque<FakeOutcome>>,
    fallback: FakeOutcome,
    calls: Arc<AtomicUsize>,
    seen_context: Mutex<Vec<Vec<String>>>,
}

impl FakeLane {
    pub fn builder(name: &str) -> FakeLaneBuilder {
        FakeLaneBuilder::new(name)
    }

    /// Lane returning `n` ranked items immediately
    pub fn ok(name: &str, n: usize) -> Arc<Self> {
        Arc::new(Self::builder(name).items(n).build())
    }

    /// Lane that always fails immediately
    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self::builder(name).always(FakeOutcome::Fail(format!("{} unavailable", name))).build())
    }

    /// Lane that sleeps then succeeds with `n` items
    pub fn slow(name: &str, latency: Duration, n: usize) -> Arc<Self> {
        Arc::new(Self::builder(name).latency(latency).items(n).build())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of times `run` was entered
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared handle to the call counter
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Context slot names seen on each call
    pub fn seen_context(&self) -> Vec<Vec<String>> {
        self.seen_context
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    fn next_outcome(&self) -> FakeOutcome {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Lane for FakeLane {
    async fn run(&self, _query: &str, ctx: &SharedContext) -> Result<LanePayload, LaneError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen_context.lock() {
            seen.push(ctx.lanes().map(str::to_string).collect());
        }

        let outcome = self.next_outcome();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match outcome {
            FakeOutcome::Succeed(payload) => Ok(payload),
            FakeOutcome::Fail(msg) => Err(LaneError::Failed(msg)),
            FakeOutcome::Panic(msg) => panic!("{}", msg),
            FakeOutcome::Hang => {
                std::future::pending::<()>().await;
                Err(LaneError::Cancelled)
            }
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`FakeLane`]
#[derive(Debug)]
pub struct FakeLaneBuilder {
    name: String,
    latency: Duration,
    script: VecDeque<FakeOutcome>,
    fallback: FakeOutcome,
}

impl FakeLaneBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            latency: Duration::ZERO,
            script: VecDeque::new(),
            fallback: FakeOutcome::Succeed(LanePayload::default()),
        }
    }

    /// Sleep before every outcome
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Default outcome: `n` items named `<lane>-<i>`
    pub fn items(mut self, n: usize) -> Self {
        self.fallback = FakeOutcome::Succeed(ranked_items(&self.name, n));
        self
    }

    /// Default outcome: a synthesis answer
    pub fn answer(mut self, text: &str) -> Self {
        self.fallback = FakeOutcome::Succeed(LanePayload::answer(text));
        self
    }

    /// Default outcome once the script is exhausted
    pub fn always(mut self, outcome: FakeOutcome) -> Self {
        self.fallback = outcome;
        self
    }

    /// Queue an outcome for the next unscripted call
    pub fn then(mut self, outcome: FakeOutcome) -> Self {
        self.script.push_back(outcome);
        self
    }

    pub fn build(self) -> FakeLane {
        FakeLane {
            name: self.name,
            latency: self.latency,
            script: Mutex::new(self.script),
            fallback: self.fallback,
            calls: Arc::new(AtomicUsize::new(0)),
            seen_context: Mutex::new(Vec::new()),
        }
    }
}

/// `n` ranked items with ids `<source>-0 .. <source>-(n-1)`
pub fn ranked_items(source: &str, n: usize) -> LanePayload {
    let items = (0..n)
        .map(|i| {
            RankedItem::new(&format!("{}-{}", source, i), &format!("{} result {}", source, i), source)
                .with_score(1.0 / (i as f64 + 1.0))
        })
        .collect();
    LanePayload::items(items)
}
