// SPDX-License-Identifier: MIT
//! Collaboration-platform collaborator contract and event data.
//!
//! The service core never talks HTTP; everything it needs from the platform
//! goes through [`GithubApi`], keyed by [`PrId`]. Webhook payloads arrive
//! already parsed as [`GhEvent`] — signature verification and JSON parsing
//! are the transport layer's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::id::PrId;

/// Merge method used when auto-merge fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeMethod {
    Merge,
    Rebase,
    Squash,
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MergeMethod::Merge => "MERGE",
            MergeMethod::Rebase => "REBASE",
            MergeMethod::Squash => "SQUASH",
        };
        f.write_str(s)
    }
}

impl MergeMethod {
    /// Parse a merge preference, case-insensitive and trimmed.
    pub fn parse(raw: &str) -> Option<MergeMethod> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MERGE" => Some(MergeMethod::Merge),
            "REBASE" => Some(MergeMethod::Rebase),
            "SQUASH" => Some(MergeMethod::Squash),
            _ => None,
        }
    }
}

/// Kind of review posted through [`GithubApi::add_review`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Comment,
    RequestChanges,
}

/// An existing review on a pull request, as listed by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub id: u64,
    pub user_login: String,
    /// Raw platform state, e.g. `APPROVED`, `CHANGES_REQUESTED`.
    pub state: String,
}

/// Platform operations the reviewer pipeline depends on.
#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn list_reviews(&self, id: &PrId) -> anyhow::Result<Vec<ReviewSummary>>;

    async fn add_review(&self, id: &PrId, body: &str, action: ReviewAction)
        -> anyhow::Result<()>;

    async fn dismiss_review(&self, id: &PrId, review_id: u64, message: &str)
        -> anyhow::Result<()>;

    async fn enable_auto_merge(&self, id: &PrId, method: MergeMethod) -> anyhow::Result<()>;

    /// Names of status checks required on the given branch.
    async fn list_required_status_checks(
        &self,
        id: &PrId,
        branch: &str,
    ) -> anyhow::Result<Vec<String>>;

    /// File names in the repository root on the given branch.
    async fn list_root_files(&self, id: &PrId, branch: &str) -> anyhow::Result<Vec<String>>;

    /// All topics set on the repository.
    async fn list_topics(&self, id: &PrId) -> anyhow::Result<Vec<String>>;
}

// ─── Parsed webhook event ─────────────────────────────────────────────────────

/// Pull request fields the core consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequestDetails {
    pub number: u64,
    pub node_id: String,
    pub title: String,
    pub author: String,
    pub html_url: String,
    pub changed_files: u64,
    #[serde(default)]
    pub draft: bool,
}

/// Repository fields the core consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryDetails {
    pub name: String,
    pub owner: String,
    pub full_name: String,
    pub default_branch: String,
    /// `public`, `private` or `internal`.
    pub visibility: String,
    #[serde(default)]
    pub allow_auto_merge: bool,
    #[serde(default)]
    pub allow_rebase_merge: bool,
    #[serde(default)]
    pub allow_squash_merge: bool,
}

/// A parsed pull-request webhook delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GhEvent {
    /// Event name, e.g. `pull_request`.
    pub event: String,
    /// Event action, e.g. `opened`, `synchronize`.
    pub action: String,
    pub pull_request: PullRequestDetails,
    pub repository: RepositoryDetails,
    /// Organization login when the repository belongs to one.
    #[serde(default)]
    pub organization: Option<String>,
}

impl GhEvent {
    /// Build the correlation identity for this delivery.
    pub fn to_id(&self) -> PrId {
        PrId {
            owner: self.repository.owner.clone(),
            repo: self.repository.name.clone(),
            number: self.pull_request.number,
            node_id: self.pull_request.node_id.clone(),
            repo_full_name: self.repository.full_name.clone(),
            author: self.pull_request.author.clone(),
            url: self.pull_request.html_url.clone(),
        }
    }
}
