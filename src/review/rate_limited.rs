// SPDX-License-Identifier: MIT
//! Approve throttling decorator.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::id::PrId;
use crate::rate::Throttle;

use super::{ApproveOptions, Reviewer};

/// Consults the throttler before approving. Only approves are throttled:
/// comments and change requests never merge code, and dismissals only undo
/// our own reviews, so capping them would just delay cleanup.
pub struct RateLimitedReviewer {
    next: Arc<dyn Reviewer>,
    throttle: Arc<dyn Throttle>,
}

impl RateLimitedReviewer {
    pub fn new(next: Arc<dyn Reviewer>, throttle: Arc<dyn Throttle>) -> Self {
        Self { next, throttle }
    }
}

#[async_trait]
impl Reviewer for RateLimitedReviewer {
    async fn approve(&self, id: &PrId, body: &str, opts: &ApproveOptions) -> Result<(), Error> {
        self.throttle.should_throttle(id).await?;
        self.next.approve(id, body, opts).await
    }

    async fn comment(&self, id: &PrId, body: &str) -> Result<(), Error> {
        self.next.comment(id, body).await
    }

    async fn request_changes(&self, id: &PrId, body: &str) -> Result<(), Error> {
        self.next.request_changes(id, body).await
    }

    async fn dismiss(&self, id: &PrId, message: &str) -> Result<(), Error> {
        self.next.dismiss(id, message).await
    }
}
