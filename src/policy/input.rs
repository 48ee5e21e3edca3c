// SPDX-License-Identifier: MIT
//! Decision input assembly.
//!
//! [`DecisionInput`] is the snapshot handed verbatim to the decision service.
//! Enrichment plugins (changed files, branch protection, requested reviewers,
//! …) live outside the core behind [`InputFactory`]; their fragments land in
//! the `plugins` map keyed by plugin name.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::github::{GhEvent, PullRequestDetails, RepositoryDetails};

/// Input document for policy rule evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionInput {
    pub event: String,
    pub action: String,
    pub pull_request: PullRequestDetails,
    pub repository: RepositoryDetails,
    #[serde(default)]
    pub organization: Option<String>,
    /// Plugin-contributed input fragments, keyed by plugin name.
    #[serde(default)]
    pub plugins: BTreeMap<String, serde_json::Value>,
}

/// Assembles a [`DecisionInput`] from a parsed event, running whatever
/// enrichment plugins are configured.
#[async_trait]
pub trait InputFactory: Send + Sync {
    async fn create_input(&self, event: &GhEvent) -> anyhow::Result<DecisionInput>;
}

/// Factory that snapshots the event with no plugin enrichment.
#[derive(Debug, Default)]
pub struct BareInputFactory;

#[async_trait]
impl InputFactory for BareInputFactory {
    async fn create_input(&self, event: &GhEvent) -> anyhow::Result<DecisionInput> {
        Ok(DecisionInput {
            event: event.event.clone(),
            action: event.action.clone(),
            pull_request: event.pull_request.clone(),
            repository: event.repository.clone(),
            organization: event.organization.clone(),
            plugins: BTreeMap::new(),
        })
    }
}
