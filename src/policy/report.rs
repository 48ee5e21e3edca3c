// SPDX-License-Identifier: MIT
//! Evaluation reports: the audit trail of every policy run.
//!
//! A report captures the input the engine saw, each module's decision (or
//! error), and the coalesced outcome. Reports are keyed by PR id plus
//! delivery id so replayed webhook deliveries overwrite rather than
//! accumulate, and carry a TTL timestamp so a backing store can expire
//! them.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::id::PrId;

use super::input::DecisionInput;
use super::types::Decision;

/// Outcome of evaluating one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleResult {
    Decision(Decision),
    Error { message: String },
}

/// Summary fields of a report, the shape returned by listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub pr: PrId,
    pub delivery_id: String,
    /// Title of the pull request at evaluation time.
    pub title: String,
    pub author: String,
    pub event: String,
    pub action: String,
    /// Policy schema label the service was configured with.
    pub policy_version: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One policy run over a PR event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(flatten)]
    pub meta: ReportMetadata,
    pub input: Option<DecisionInput>,
    /// Module name -> result, in a stable order for rendering.
    pub modules: BTreeMap<String, ModuleResult>,
    /// Coalesced decision, or the error that aborted the run.
    pub outcome: Option<ModuleResult>,
}

/// Accumulates a report while the evaluator walks the module list.
pub struct ReportBuilder {
    report: Report,
}

impl ReportBuilder {
    pub fn new(
        pr: PrId,
        delivery_id: impl Into<String>,
        ttl_days: i64,
        policy_version: impl Into<String>,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            report: Report {
                meta: ReportMetadata {
                    pr,
                    delivery_id: delivery_id.into(),
                    title: String::new(),
                    author: String::new(),
                    event: String::new(),
                    action: String::new(),
                    policy_version: policy_version.into(),
                    created_at,
                    expires_at: created_at + Duration::days(ttl_days),
                },
                input: None,
                modules: BTreeMap::new(),
                outcome: None,
            },
        }
    }

    /// Record the evaluated input and lift its summary fields into the
    /// report metadata.
    pub fn set_input(&mut self, input: DecisionInput) {
        self.report.meta.title = input.pull_request.title.clone();
        self.report.meta.author = input.pull_request.author.clone();
        self.report.meta.event = input.event.clone();
        self.report.meta.action = input.action.clone();
        self.report.input = Some(input);
    }

    pub fn add_decision(&mut self, module: &str, decision: Decision) {
        self.report
            .modules
            .insert(module.to_string(), ModuleResult::Decision(decision));
    }

    pub fn add_error(&mut self, module: &str, err: &Error) {
        self.report.modules.insert(
            module.to_string(),
            ModuleResult::Error {
                message: err.to_string(),
            },
        );
    }

    pub fn set_outcome(&mut self, outcome: Decision) {
        self.report.outcome = Some(ModuleResult::Decision(outcome));
    }

    /// Record the error that aborted the run as the report outcome, so the
    /// audit trail shows why no decision was coalesced.
    pub fn set_outcome_error(&mut self, err: &Error) {
        self.report.outcome = Some(ModuleResult::Error {
            message: err.to_string(),
        });
    }

    pub fn build(self) -> Report {
        self.report
    }
}

/// Persistence for evaluation reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn store(&self, report: Report) -> Result<(), Error>;

    /// Fetch the report for one delivery of one PR.
    async fn get(&self, pr: &PrId, delivery_id: &str) -> Result<Report, Error>;

    /// Metadata of all reports for a PR, oldest first.
    async fn list(&self, pr: &PrId) -> Result<Vec<ReportMetadata>, Error>;
}

/// Map-backed store for tests and single-node deployments. Expired reports
/// are filtered on read rather than swept.
#[derive(Default)]
pub struct InMemoryReportStore {
    reports: Mutex<Vec<Report>>,
}

impl InMemoryReportStore {
    fn key_eq(report: &Report, pr: &PrId, delivery_id: &str) -> bool {
        report.meta.pr.lock_key() == pr.lock_key() && report.meta.delivery_id == delivery_id
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn store(&self, report: Report) -> Result<(), Error> {
        let mut reports = self.reports.lock().expect("reports poisoned");
        reports.retain(|r| !Self::key_eq(r, &report.meta.pr, &report.meta.delivery_id));
        reports.push(report);
        Ok(())
    }

    async fn get(&self, pr: &PrId, delivery_id: &str) -> Result<Report, Error> {
        let now = Utc::now();
        let reports = self.reports.lock().expect("reports poisoned");
        reports
            .iter()
            .find(|r| Self::key_eq(r, pr, delivery_id) && r.meta.expires_at > now)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("report for {} delivery {delivery_id}", pr))
            })
    }

    async fn list(&self, pr: &PrId) -> Result<Vec<ReportMetadata>, Error> {
        let now = Utc::now();
        let reports = self.reports.lock().expect("reports poisoned");
        let mut matched: Vec<ReportMetadata> = reports
            .iter()
            .filter(|r| r.meta.pr.lock_key() == pr.lock_key() && r.meta.expires_at > now)
            .map(|r| r.meta.clone())
            .collect();
        matched.sort_by_key(|m| m.created_at);
        Ok(matched)
    }
}
