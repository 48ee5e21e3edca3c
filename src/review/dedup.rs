// SPDX-License-Identifier: MIT
//! Duplicate-review suppression.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Error;
use crate::github::GithubApi;
use crate::id::PrId;
use crate::metrics::SharedEmitter;
use crate::policy::ReviewType;

use super::{ApproveOptions, Reviewer};

/// Skips a review when this service already holds one of equal or higher
/// precedence on the PR. Webhook deliveries are redelivered at-least-once,
/// so without this layer every redelivery would stack another identical
/// review.
pub struct DedupReviewer {
    next: Arc<dyn Reviewer>,
    api: Arc<dyn GithubApi>,
    service_account: String,
    metrics: SharedEmitter,
}

impl DedupReviewer {
    pub fn new(
        next: Arc<dyn Reviewer>,
        api: Arc<dyn GithubApi>,
        service_account: String,
        metrics: SharedEmitter,
    ) -> Self {
        Self {
            next,
            api,
            service_account,
            metrics,
        }
    }

    /// Highest-precedence verdict this service has already posted.
    /// States we cannot map (PENDING, DISMISSED, …) are ignored.
    async fn existing_verdict(&self, id: &PrId) -> Result<ReviewType, Error> {
        let reviews = self
            .api
            .list_reviews(id)
            .await
            .map_err(|err| Error::fault("listing reviews for deduplication", err))?;

        let mut highest = ReviewType::Skip;
        for review in reviews {
            if review.user_login != self.service_account {
                continue;
            }
            match ReviewType::parse_state(&review.state) {
                Some(verdict) if verdict > highest => highest = verdict,
                Some(_) => {}
                None => debug!(pr = %id, state = %review.state, "ignoring unmapped review state"),
            }
        }
        Ok(highest)
    }

    async fn is_duplicate(&self, id: &PrId, action: ReviewType) -> Result<bool, Error> {
        let existing = self.existing_verdict(id).await?;
        if existing >= action {
            info!(pr = %id, %existing, requested = %action, "review already present, skipping");
            self.metrics
                .emit_dist("duplicateReviewsSkipped", 1.0, &id.to_tags());
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl Reviewer for DedupReviewer {
    async fn approve(&self, id: &PrId, body: &str, opts: &ApproveOptions) -> Result<(), Error> {
        if self.is_duplicate(id, ReviewType::Approve).await? {
            return Ok(());
        }
        self.next.approve(id, body, opts).await
    }

    async fn comment(&self, id: &PrId, body: &str) -> Result<(), Error> {
        if self.is_duplicate(id, ReviewType::Comment).await? {
            return Ok(());
        }
        self.next.comment(id, body).await
    }

    async fn request_changes(&self, id: &PrId, body: &str) -> Result<(), Error> {
        if self.is_duplicate(id, ReviewType::RequestChanges).await? {
            return Ok(());
        }
        self.next.request_changes(id, body).await
    }

    async fn dismiss(&self, id: &PrId, message: &str) -> Result<(), Error> {
        self.next.dismiss(id, message).await
    }
}
