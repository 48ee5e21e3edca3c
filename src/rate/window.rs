// SPDX-License-Identifier: MIT
//! Sliding-window limiter over a shared counting store.
//!
//! Classic two-bucket approximation: events are counted in fixed windows and
//! the trailing window's count is weighted by how much of it still overlaps
//! the sliding window. The store is the cross-instance coordination point —
//! in production a shared key-value table with TTL expiry, in tests and
//! single-instance deployments [`InMemoryCounters`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Keyed fixed-window counters with TTL-based expiry.
#[async_trait]
pub trait CountingStore: Send + Sync {
    /// Record one event for `key` in the window starting at `curr_start` and
    /// return `(previous window count, current window count)` including this
    /// event. `ttl` bounds how long the buckets must be retained.
    async fn incr(
        &self,
        key: &str,
        curr_start: DateTime<Utc>,
        prev_start: DateTime<Utc>,
        ttl: Duration,
    ) -> anyhow::Result<(u64, u64)>;
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, PartialEq)]
pub enum LimitOutcome {
    Allowed,
    /// Capacity exhausted; retry after the given wait.
    Exhausted { retry_after: Duration },
}

/// Per-key sliding window limiter.
pub struct SlidingWindow {
    key: String,
    capacity: u64,
    window: Duration,
    store: Arc<dyn CountingStore>,
}

impl SlidingWindow {
    pub fn new(
        key: impl Into<String>,
        capacity: u64,
        window: Duration,
        store: Arc<dyn CountingStore>,
    ) -> Self {
        Self {
            key: key.into(),
            capacity,
            window,
            store,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an event at `now` and report whether it fit the limit.
    ///
    /// The event is counted even when the outcome is `Exhausted`; retried
    /// over-limit traffic keeps the window saturated rather than sneaking
    /// through between buckets.
    pub async fn limit(&self, now: DateTime<Utc>) -> anyhow::Result<LimitOutcome> {
        let window_ms = self.window.as_millis() as i64;
        let now_ms = now.timestamp_millis();
        let curr_start_ms = now_ms - now_ms.rem_euclid(window_ms);
        let curr_start = DateTime::<Utc>::from_timestamp_millis(curr_start_ms)
            .ok_or_else(|| anyhow::anyhow!("window start out of range"))?;
        let prev_start = DateTime::<Utc>::from_timestamp_millis(curr_start_ms - window_ms)
            .ok_or_else(|| anyhow::anyhow!("window start out of range"))?;

        let (prev, curr) = self
            .store
            .incr(&self.key, curr_start, prev_start, 2 * self.window)
            .await?;

        let elapsed_ms = now_ms - curr_start_ms;
        let prev_weight = (window_ms - elapsed_ms) as f64 / window_ms as f64;
        let total = prev as f64 * prev_weight + curr as f64;

        if total > self.capacity as f64 {
            let retry_after = Duration::from_millis((window_ms - elapsed_ms).max(1) as u64);
            Ok(LimitOutcome::Exhausted { retry_after })
        } else {
            Ok(LimitOutcome::Allowed)
        }
    }
}

/// In-process counting store. Buckets older than the TTL horizon are pruned
/// opportunistically on each increment.
#[derive(Default)]
pub struct InMemoryCounters {
    // key -> window start (ms) -> count
    buckets: Mutex<HashMap<String, HashMap<i64, u64>>>,
}

impl InMemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CountingStore for InMemoryCounters {
    async fn incr(
        &self,
        key: &str,
        curr_start: DateTime<Utc>,
        prev_start: DateTime<Utc>,
        _ttl: Duration,
    ) -> anyhow::Result<(u64, u64)> {
        let curr_ms = curr_start.timestamp_millis();
        let prev_ms = prev_start.timestamp_millis();

        let mut buckets = self.buckets.lock().await;
        let windows = buckets.entry(key.to_string()).or_default();
        windows.retain(|start, _| *start >= prev_ms);

        let curr = windows.entry(curr_ms).or_insert(0);
        *curr += 1;
        let curr = *curr;
        let prev = windows.get(&prev_ms).copied().unwrap_or(0);
        Ok((prev, curr))
    }
}
