// SPDX-License-Identifier: MIT
//! Lazy per-key limiter registry.
//!
//! Limiter instances are created on first use for a derived throttle key and
//! cached. A background sweep evicts instances idle longer than twice their
//! window so per-author/per-repo cardinality stays bounded. If the configured
//! limit for a key changes (hot reload), the cached instance is replaced on
//! the next lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use super::config::Limit;
use super::window::{CountingStore, SlidingWindow};

struct Entry {
    limiter: Arc<SlidingWindow>,
    expires_at: DateTime<Utc>,
}

/// Named registry of sliding-window limiters sharing one counting store.
pub struct Registry {
    name: String,
    store: Arc<dyn CountingStore>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new(name: impl Into<String>, store: Arc<dyn CountingStore>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            store,
            entries: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch the limiter for `key`, creating it if absent or if the limit
    /// configuration changed since it was cached. Each lookup pushes the
    /// entry's idle expiry out to `2 * window`.
    pub async fn get_or_create(&self, key: &str, limit: &Limit) -> Arc<SlidingWindow> {
        let now = Utc::now();
        let idle_ttl = 2 * limit.window_duration;
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get_mut(key) {
            let cached = &entry.limiter;
            if cached.capacity() == limit.count && cached.window() == limit.window_duration {
                entry.expires_at = now + chrono_duration(idle_ttl);
                return Arc::clone(&entry.limiter);
            }
        }

        let limiter = Arc::new(SlidingWindow::new(
            key,
            limit.count,
            limit.window_duration,
            Arc::clone(&self.store),
        ));
        entries.insert(
            key.to_string(),
            Entry {
                limiter: Arc::clone(&limiter),
                expires_at: now + chrono_duration(idle_ttl),
            },
        );
        limiter
    }

    /// Number of cached limiter instances.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drop entries idle past their expiry. Returns the eviction count.
    pub async fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Spawn the idle-sweep loop. Abort the returned handle to stop it.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = self.remove_expired(Utc::now()).await;
                if evicted > 0 {
                    info!(registry = %self.name, evicted, "evicted idle limiters");
                }
            }
        })
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(d.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::config::parse_window;
    use crate::rate::window::InMemoryCounters;

    fn limit(count: u64, window: &str) -> Limit {
        let mut l = Limit::new(count, window);
        l.window_duration = parse_window(window).expect("window");
        l
    }

    #[tokio::test]
    async fn reuses_cached_instance() {
        let reg = Registry::new("author", Arc::new(InMemoryCounters::new()));
        let l = limit(5, "10s");
        let a = reg.get_or_create("Author/alice", &l).await;
        let b = reg.get_or_create("Author/alice", &l).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn limit_change_replaces_instance() {
        let reg = Registry::new("author", Arc::new(InMemoryCounters::new()));
        let a = reg.get_or_create("Author/alice", &limit(5, "10s")).await;
        let b = reg.get_or_create("Author/alice", &limit(10, "10s")).await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.capacity(), 10);
    }

    #[tokio::test]
    async fn sweep_evicts_idle_entries() {
        let reg = Registry::new("author", Arc::new(InMemoryCounters::new()));
        let l = limit(5, "10s");
        reg.get_or_create("Author/alice", &l).await;
        reg.get_or_create("Author/bob", &l).await;

        // Nothing is idle past 2x window yet.
        assert_eq!(reg.remove_expired(Utc::now()).await, 0);

        let later = Utc::now() + chrono::Duration::seconds(21);
        assert_eq!(reg.remove_expired(later).await, 2);
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn spawned_sweeper_evicts_in_the_background() {
        let reg = Registry::new("author", Arc::new(InMemoryCounters::new()));
        // 100ms window puts the idle expiry at 200ms.
        reg.get_or_create("Author/alice", &limit(5, "100ms")).await;
        assert_eq!(reg.len().await, 1);

        let sweeper = Arc::clone(&reg).spawn_sweeper(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(reg.is_empty().await);
        sweeper.abort();
    }
}
