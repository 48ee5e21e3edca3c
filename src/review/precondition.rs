// SPDX-License-Identifier: MIT
//! Approve preconditions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::CiGateConfig;
use crate::error::Error;
use crate::github::GithubApi;
use crate::id::PrId;
use crate::metrics::SharedEmitter;

use super::{ApproveOptions, Reviewer};

/// Gates approves on repository readiness.
///
/// Two checks run before an approve is forwarded:
/// - the repository must have auto-merge enabled, otherwise an approve
///   would merge nothing and the author gets a misleading green review;
/// - when a CI gate is configured and the repository carries the gate's
///   marker file, the gate's status check must be required on the default
///   branch. A repo that fails the gate is skipped quietly rather than
///   errored: the gap is the repo owner's to fix and a retry will not help.
pub struct PreconditionReviewer {
    next: Arc<dyn Reviewer>,
    api: Arc<dyn GithubApi>,
    ci_gate: Option<CiGateConfig>,
    metrics: SharedEmitter,
}

impl PreconditionReviewer {
    pub fn new(
        next: Arc<dyn Reviewer>,
        api: Arc<dyn GithubApi>,
        ci_gate: Option<CiGateConfig>,
        metrics: SharedEmitter,
    ) -> Self {
        Self {
            next,
            api,
            ci_gate,
            metrics,
        }
    }

    /// True when the approve may proceed past the CI gate.
    async fn ci_gate_passes(&self, id: &PrId, branch: &str) -> Result<bool, Error> {
        let Some(gate) = &self.ci_gate else {
            return Ok(true);
        };

        let files = self
            .api
            .list_root_files(id, branch)
            .await
            .map_err(|err| Error::fault("listing repository root files", err))?;
        if !files.iter().any(|f| f == &gate.marker_file) {
            return Ok(true);
        }

        let checks = self
            .api
            .list_required_status_checks(id, branch)
            .await
            .map_err(|err| Error::fault("listing required status checks", err))?;
        if checks.iter().any(|c| c == &gate.required_check) {
            return Ok(true);
        }

        warn!(
            pr = %id,
            marker = %gate.marker_file,
            check = %gate.required_check,
            "CI gate check not required on default branch, skipping approve"
        );
        self.metrics
            .emit_dist("requiredCheckMissing", 1.0, &id.to_tags());
        Ok(false)
    }
}

#[async_trait]
impl Reviewer for PreconditionReviewer {
    async fn approve(&self, id: &PrId, body: &str, opts: &ApproveOptions) -> Result<(), Error> {
        if !opts.auto_merge_enabled {
            self.metrics
                .emit_dist("autoMergeDisabled", 1.0, &id.to_tags());
            return Err(Error::user(
                format!("auto-merge is not enabled on {}", id.repo_full_name),
                anyhow::anyhow!("repository setting allow_auto_merge is off"),
            ));
        }

        if !self.ci_gate_passes(id, &opts.default_branch).await? {
            info!(pr = %id, "approve skipped by CI gate");
            return Ok(());
        }

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
