// SPDX-License-Identifier: MIT
//! Coalescing policy evaluator.
//!
//! Runs every configured module against one PR event and folds the
//! per-module decisions into a single verdict by precedence:
//!
//!   Skip < Approve < Comment < RequestChanges
//!
//! Ties go to the later module in the configured order. A module error
//! aborts the run immediately and is surfaced verbatim; modules after it
//! are not evaluated and the report's outcome records the error. Every
//! run, aborted or not, leaves a report behind —
//! report persistence failures are logged, never raised, so the audit
//! trail cannot take down reviewing.

use std::sync::Arc;

use crate::error::Error;
use crate::github::GhEvent;
use crate::id::PrId;
use crate::metrics::SharedEmitter;
use crate::ReqCtx;

use super::input::InputFactory;
use super::report::{ReportBuilder, ReportStore};
use super::types::Decision;
use super::Policy;

pub struct Evaluator {
    policy: Arc<dyn Policy>,
    input_factory: Arc<dyn InputFactory>,
    reports: Arc<dyn ReportStore>,
    modules: Vec<String>,
    report_ttl_days: i64,
    policy_version: String,
    metrics: SharedEmitter,
}

impl Evaluator {
    pub fn new(
        policy: Arc<dyn Policy>,
        input_factory: Arc<dyn InputFactory>,
        reports: Arc<dyn ReportStore>,
        modules: Vec<String>,
        report_ttl_days: i64,
        policy_version: impl Into<String>,
        metrics: SharedEmitter,
    ) -> Self {
        Self {
            policy,
            input_factory,
            reports,
            modules,
            report_ttl_days,
            policy_version: policy_version.into(),
            metrics,
        }
    }

    /// Evaluate all modules for one delivery and coalesce their decisions.
    pub async fn evaluate(
        &self,
        ctx: &ReqCtx,
        id: &PrId,
        event: &GhEvent,
    ) -> Result<Decision, Error> {
        let mut builder = ReportBuilder::new(
            id.clone(),
            ctx.delivery_id.as_str(),
            self.report_ttl_days,
            self.policy_version.as_str(),
        );

        let input = self
            .input_factory
            .create_input(event)
            .await
            .map_err(|err| Error::fault("building decision input", err))?;
        builder.set_input(input.clone());

        let mut coalesced = Decision::default();
        for module in &self.modules {
            match self.policy.evaluate(ctx, module, &input).await {
                Ok(decision) => {
                    builder.add_decision(module, decision.clone());
                    if decision.track {
                        coalesced.track = true;
                        // >= : the later module wins a precedence tie.
                        if decision.review.review_type >= coalesced.review.review_type {
                            coalesced.review = decision.review;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(pr = %id, module, error = %err, "module evaluation failed");
                    builder.add_error(module, &err);
                    builder.set_outcome_error(&err);
                    self.store_report(id, builder).await;
                    return Err(err);
                }
            }
        }

        builder.set_outcome(coalesced.clone());
        self.store_report(id, builder).await;
        self.metrics.emit_dist("evaluatedPRs", 1.0, &id.to_tags());
        Ok(coalesced)
    }

    async fn store_report(&self, id: &PrId, builder: ReportBuilder) {
        if let Err(err) = self.reports.store(builder.build()).await {
            tracing::error!(pr = %id, error = %err, "failed to store evaluation report");
        }
    }
}
