// SPDX-License-Identifier: MIT
//! Keyed throttlers.
//!
//! A throttler binds a key derivation (author / org / repo) to limits from a
//! hot-reloadable [`LimiterConfig`] and a limiter [`Registry`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::configstore::ConfigGetter;
use crate::error::Error;
use crate::id::PrId;

use super::config::LimiterConfig;
use super::registry::Registry;
use super::window::LimitOutcome;

/// Derives the throttle key from a PR identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyer {
    Author,
    Org,
    Repo,
}

impl Keyer {
    pub fn key(&self, id: &PrId) -> String {
        match self {
            Keyer::Author => format!("Author/{}", id.author),
            Keyer::Org => format!("Org/{}", id.owner),
            Keyer::Repo => format!("Repo/{}", id.repo_full_name),
        }
    }
}

/// Decision point consulted before a throttled action is applied.
#[async_trait]
pub trait Throttle: Send + Sync {
    /// Ok(()) when the action may proceed; `Error::TooManyRequests` with the
    /// suggested wait when throttled.
    async fn should_throttle(&self, id: &PrId) -> Result<(), Error>;

    fn name(&self) -> &str;

    fn key(&self, id: &PrId) -> String;
}

/// Sliding-window throttler for one key dimension.
pub struct SlidingWindowThrottler {
    keyer: Keyer,
    registry: Arc<Registry>,
    cfg: Arc<dyn ConfigGetter<LimiterConfig>>,
}

impl SlidingWindowThrottler {
    pub fn new(
        keyer: Keyer,
        registry: Arc<Registry>,
        cfg: Arc<dyn ConfigGetter<LimiterConfig>>,
    ) -> Self {
        Self {
            keyer,
            registry,
            cfg,
        }
    }
}

#[async_trait]
impl Throttle for SlidingWindowThrottler {
    async fn should_throttle(&self, id: &PrId) -> Result<(), Error> {
        let key = self.keyer.key(id);
        let cfg = self.cfg.get().await?;
        let limit = cfg.limit_for(&key);

        let limiter = self.registry.get_or_create(&key, limit).await;
        match limiter.limit(Utc::now()).await {
            Ok(LimitOutcome::Allowed) => Ok(()),
            Ok(LimitOutcome::Exhausted { retry_after }) => Err(Error::TooManyRequests {
                message: format!("{} throttled request for key {key}", self.name()),
                retry_after,
            }),
            Err(err) => Err(Error::fault("rate limiter backend failure", err)),
        }
    }

    fn name(&self) -> &str {
        self.registry.name()
    }

    fn key(&self, id: &PrId) -> String {
        self.keyer.key(id)
    }
}
