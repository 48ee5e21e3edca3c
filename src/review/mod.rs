// SPDX-License-Identifier: MIT
//! The reviewer pipeline.
//!
//! [`Reviewer`] turns a coalesced decision into platform actions. The
//! production reviewer is a decorator chain, outermost first:
//!
//!   Mutex → Dedup → Precondition → RateLimited → Base
//!
//! Each layer owns the next and adds one concern: per-PR mutual exclusion,
//! duplicate-review suppression, approve preconditions, approve throttling.
//! The base reviewer at the bottom is the only layer that calls the
//! platform's write APIs.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::CiGateConfig;
use crate::error::Error;
use crate::github::{GithubApi, MergeMethod};
use crate::id::PrId;
use crate::lock::{LockOptions, Locker};
use crate::metrics::SharedEmitter;
use crate::rate::Throttle;

pub(crate) mod base;
mod dedup;
mod mutex;
mod precondition;
mod rate_limited;

pub use base::BaseReviewer;
pub use dedup::DedupReviewer;
pub use mutex::MutexReviewer;
pub use precondition::PreconditionReviewer;
pub use rate_limited::RateLimitedReviewer;

/// How an approve should be applied.
#[derive(Debug, Clone)]
pub struct ApproveOptions {
    /// Whether the repository allows auto-merge; when false the approve is
    /// rejected before any review is posted.
    pub auto_merge_enabled: bool,
    /// Default branch of the repository, used for precondition lookups.
    pub default_branch: String,
    /// Merge method to enable auto-merge with.
    pub merge_method: MergeMethod,
}

/// Applies review actions to a pull request.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn approve(&self, id: &PrId, body: &str, opts: &ApproveOptions) -> Result<(), Error>;

    async fn comment(&self, id: &PrId, body: &str) -> Result<(), Error>;

    async fn request_changes(&self, id: &PrId, body: &str) -> Result<(), Error>;

    /// Dismiss this service's stale request-changes reviews.
    async fn dismiss(&self, id: &PrId, message: &str) -> Result<(), Error>;
}

/// Assemble the full decorator chain.
#[allow(clippy::too_many_arguments)]
pub fn build_pipeline(
    api: Arc<dyn GithubApi>,
    service_account: String,
    ci_gate: Option<CiGateConfig>,
    throttle: Arc<dyn Throttle>,
    locker: Arc<dyn Locker>,
    lock_opts: LockOptions,
    metrics: SharedEmitter,
) -> Arc<dyn Reviewer> {
    let base = Arc::new(BaseReviewer::new(
        api.clone(),
        service_account.clone(),
        metrics.clone(),
    ));
    let rate_limited = Arc::new(RateLimitedReviewer::new(base, throttle));
    let precondition = Arc::new(PreconditionReviewer::new(
        rate_limited,
        api.clone(),
        ci_gate,
        metrics.clone(),
    ));
    let dedup = Arc::new(DedupReviewer::new(
        precondition,
        api,
        service_account,
        metrics,
    ));
    Arc::new(MutexReviewer::new(dedup, locker, lock_opts))
}
