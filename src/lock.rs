// SPDX-License-Identifier: MIT
//! Lease-based distributed locking.
//!
//! [`Locker`] is the narrow contract the mutex reviewer serializes on. The
//! production implementation sits on a shared lock table with lease expiry
//! and heartbeat refresh; [`InProcessLocker`] provides the same semantics
//! inside one process for tests and single-instance deployments. Leases are
//! the correctness backstop everywhere: a holder that disappears without
//! releasing loses the lock when its lease expires.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::LockConfig;

/// How many lease durations to keep polling before giving up on acquisition.
const ACQUIRE_PATIENCE: u32 = 2;

/// Lock acquisition parameters.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Lease duration; the lock auto-expires if not refreshed.
    pub lease: Duration,
    /// Heartbeat period for refreshing a held lease.
    pub heartbeat: Duration,
    /// Polling period while waiting for a held lock.
    pub refresh_period: Duration,
}

impl From<&LockConfig> for LockOptions {
    fn from(cfg: &LockConfig) -> Self {
        Self {
            lease: cfg.lease(),
            heartbeat: cfg.heartbeat(),
            refresh_period: cfg.refresh(),
        }
    }
}

/// A held lease. Opaque to callers; hand it back to [`Locker::release`].
#[derive(Debug, Clone)]
pub struct Lease {
    pub key: String,
    pub token: Uuid,
    pub acquired_at: DateTime<Utc>,
}

/// Distributed lock collaborator.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Poll until the lock for `key` is acquired or patience runs out.
    /// Failure means no mutation may be attempted (fail closed).
    async fn acquire(&self, key: &str, opts: &LockOptions) -> anyhow::Result<Lease>;

    /// Extend a held lease by another full lease duration. `Ok(false)` means
    /// the lease is no longer held (it expired and was taken over, or was
    /// released) and the holder must stop assuming exclusivity.
    async fn refresh(&self, lease: &Lease, lease_duration: Duration) -> anyhow::Result<bool>;

    /// Release a held lease. `Ok(false)` means the lease had already expired
    /// or been released — harmless, lease expiry covered it.
    async fn release(&self, lease: Lease) -> anyhow::Result<bool>;
}

struct HeldLock {
    token: Uuid,
    expires_at: DateTime<Utc>,
}

/// Single-process locker with lease expiry.
#[derive(Default)]
pub struct InProcessLocker {
    locks: Mutex<HashMap<String, HeldLock>>,
}

impl InProcessLocker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn try_acquire(&self, key: &str, lease: Duration) -> Option<Lease> {
        let now = Utc::now();
        let mut locks = self.locks.lock().await;
        match locks.get(key) {
            Some(held) if held.expires_at > now => None,
            _ => {
                let token = Uuid::new_v4();
                locks.insert(
                    key.to_string(),
                    HeldLock {
                        token,
                        expires_at: now
                            + chrono::Duration::milliseconds(lease.as_millis() as i64),
                    },
                );
                Some(Lease {
                    key: key.to_string(),
                    token,
                    acquired_at: now,
                })
            }
        }
    }
}

#[async_trait]
impl Locker for InProcessLocker {
    async fn acquire(&self, key: &str, opts: &LockOptions) -> anyhow::Result<Lease> {
        let deadline = tokio::time::Instant::now() + ACQUIRE_PATIENCE * opts.lease;
        loop {
            if let Some(lease) = self.try_acquire(key, opts.lease).await {
                return Ok(lease);
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("timed out acquiring lock for {key}");
            }
            tokio::time::sleep(opts.refresh_period).await;
        }
    }

    async fn refresh(&self, lease: &Lease, lease_duration: Duration) -> anyhow::Result<bool> {
        let mut locks = self.locks.lock().await;
        match locks.get_mut(&lease.key) {
            Some(held) if held.token == lease.token => {
                held.expires_at = Utc::now()
                    + chrono::Duration::milliseconds(lease_duration.as_millis() as i64);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, lease: Lease) -> anyhow::Result<bool> {
        let mut locks = self.locks.lock().await;
        match locks.get(&lease.key) {
            Some(held) if held.token == lease.token => {
                locks.remove(&lease.key);
                Ok(true)
            }
            // Expired and taken over, or already released.
            _ => Ok(false),
        }
    }
}
