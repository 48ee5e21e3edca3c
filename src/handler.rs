// SPDX-License-Identifier: MIT
//! Delivery handling: evaluate, then act.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Error;
use crate::github::{GhEvent, MergeMethod, RepositoryDetails};
use crate::id::PrId;
use crate::policy::types::Decision;
use crate::policy::{Evaluator, ReviewType};
use crate::review::{ApproveOptions, Reviewer};
use crate::ReqCtx;

const DISMISS_MESSAGE: &str = "Requested changes have been resolved.";

/// Pick the merge method for auto-merge when the policy states no
/// preference. Rebase keeps linear history but the platform rejects it for
/// empty PRs, so those fall through to squash, then plain merge.
fn select_merge_method(repo: &RepositoryDetails, changed_files: u64) -> MergeMethod {
    if repo.allow_rebase_merge && changed_files > 0 {
        MergeMethod::Rebase
    } else if repo.allow_squash_merge {
        MergeMethod::Squash
    } else {
        MergeMethod::Merge
    }
}

/// Drives one delivery end to end: evaluate the policy modules, coalesce,
/// and apply the verdict through the reviewer pipeline.
pub struct EventHandler {
    evaluator: Evaluator,
    reviewer: Arc<dyn Reviewer>,
}

impl EventHandler {
    pub fn new(evaluator: Evaluator, reviewer: Arc<dyn Reviewer>) -> Self {
        Self {
            evaluator,
            reviewer,
        }
    }

    pub async fn handle(&self, ctx: &ReqCtx, event: &GhEvent) -> Result<(), Error> {
        let id = event.to_id();
        let decision = self.evaluator.evaluate(ctx, &id, event).await?;
        self.apply(ctx, &id, event, decision).await
    }

    async fn apply(
        &self,
        _ctx: &ReqCtx,
        id: &PrId,
        event: &GhEvent,
        decision: Decision,
    ) -> Result<(), Error> {
        if !decision.track || decision.review.review_type == ReviewType::Skip {
            info!(pr = %id, "no review to apply");
            return Ok(());
        }

        let review = decision.review;
        match review.review_type {
            ReviewType::Skip => Ok(()),
            ReviewType::Approve => {
                let opts = ApproveOptions {
                    auto_merge_enabled: event.repository.allow_auto_merge,
                    default_branch: event.repository.default_branch.clone(),
                    merge_method: review.merge_preference.unwrap_or_else(|| {
                        select_merge_method(&event.repository, event.pull_request.changed_files)
                    }),
                };
                self.reviewer.approve(id, &review.body, &opts).await?;
                // Clear our own stale change requests so the approval can
                // actually merge. Best effort: the approve already landed.
                if let Err(err) = self.reviewer.dismiss(id, DISMISS_MESSAGE).await {
                    warn!(pr = %id, error = %err, "failed to dismiss stale reviews");
                }
                Ok(())
            }
            ReviewType::Comment => self.reviewer.comment(id, &review.body).await,
            ReviewType::RequestChanges => {
                self.reviewer.request_changes(id, &review.body).await
            }
        }
    }
}
