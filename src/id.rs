// SPDX-License-Identifier: MIT
//! Pull-request identity.
//!
//! `PrId` is the correlation key used across locking, deduplication,
//! throttling and metric tagging. It is built once per delivery from the
//! parsed event and owned by that evaluation/action call.

use serde::{Deserialize, Serialize};

/// Identity of a single pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrId {
    /// Repository owner (user or organization login).
    pub owner: String,
    /// Repository name without the owner prefix.
    pub repo: String,
    /// Pull request number within the repository.
    pub number: u64,
    /// Platform node id of the pull request.
    pub node_id: String,
    /// `owner/repo`.
    pub repo_full_name: String,
    /// Login of the pull request author.
    pub author: String,
    /// Browser URL of the pull request.
    pub url: String,
}

impl PrId {
    /// Lock key for the write-side mutex: one lock per PR system-wide.
    pub fn lock_key(&self) -> String {
        format!("{}/{}", self.repo_full_name, self.number)
    }

    /// Metric tags identifying this PR.
    ///
    /// Authors with the `svc-` prefix are tagged as service accounts so that
    /// bot-driven PR volume can be split out in dashboards.
    pub fn to_tags(&self) -> Vec<String> {
        let acct_type = if self.author.starts_with("svc-") {
            "service-account"
        } else {
            "user"
        };
        vec![
            format!("owner:{}", self.owner),
            format!("repo:{}", self.repo),
            format!("repoFullName:{}", self.repo_full_name),
            format!("pr:{}", self.number),
            format!("authorType:{acct_type}"),
            format!("author:{}", self.author),
        ]
    }
}

impl std::fmt::Display for PrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repo_full_name, self.number)
    }
}
