// SPDX-License-Identifier: MIT
//! Repository event filter.
//!
//! Decides whether a delivery for a repository should be handled at all:
//! deny patterns first, then an ignore topic check against the live
//! repository topics, then allow patterns. Anything unmatched is dropped.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::configstore::{ConfigGetter, DynamicConfig};
use crate::error::Error;
use crate::github::GithubApi;
use crate::id::PrId;

/// Hot-reloadable filter rules. Patterns are anchored regexes matched
/// against `owner/repo`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RepoFilterCfg {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    /// Repositories carrying any of these topics are never handled.
    #[serde(default)]
    pub ignore_topics: Vec<String>,

    #[serde(skip)]
    allow_res: Vec<Regex>,
    #[serde(skip)]
    deny_res: Vec<Regex>,
    #[serde(skip)]
    ignore_set: HashSet<String>,
}

fn compile_anchored(patterns: &[String]) -> anyhow::Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("^(?:{p})$")).map_err(Into::into))
        .collect()
}

impl DynamicConfig for RepoFilterCfg {
    fn on_update(&mut self) -> anyhow::Result<()> {
        self.allow_res = compile_anchored(&self.allow)?;
        self.deny_res = compile_anchored(&self.deny)?;
        self.ignore_set = self
            .ignore_topics
            .iter()
            .map(|t| t.trim().to_lowercase())
            .collect();
        Ok(())
    }
}

impl RepoFilterCfg {
    pub fn new(allow: Vec<String>, deny: Vec<String>, ignore_topics: Vec<String>) -> Self {
        Self {
            allow,
            deny,
            ignore_topics,
            ..Default::default()
        }
    }

    fn denied(&self, full_name: &str) -> bool {
        self.deny_res.iter().any(|re| re.is_match(full_name))
    }

    fn allowed(&self, full_name: &str) -> bool {
        self.allow_res.iter().any(|re| re.is_match(full_name))
    }

    fn ignored_topic<'a>(&self, topics: impl Iterator<Item = &'a str>) -> Option<String> {
        topics
            .map(|t| t.trim().to_lowercase())
            .find(|t| self.ignore_set.contains(t))
    }
}

/// Filter seam the dispatcher consults per delivery.
#[async_trait]
pub trait EventFilter: Send + Sync {
    async fn should_handle(&self, id: &PrId) -> Result<bool, Error>;
}

pub struct RepoFilter {
    cfg: Arc<dyn ConfigGetter<RepoFilterCfg>>,
    api: Arc<dyn GithubApi>,
}

impl RepoFilter {
    pub fn new(cfg: Arc<dyn ConfigGetter<RepoFilterCfg>>, api: Arc<dyn GithubApi>) -> Self {
        Self { cfg, api }
    }
}

#[async_trait]
impl EventFilter for RepoFilter {
    async fn should_handle(&self, id: &PrId) -> Result<bool, Error> {
        let cfg = self.cfg.get().await?;

        if cfg.denied(&id.repo_full_name) {
            debug!(pr = %id, "repository denied by filter");
            return Ok(false);
        }

        // Topics are read live so an owner can opt a repo out without a
        // config deploy. A lookup failure fails closed.
        let topics = self
            .api
            .list_topics(id)
            .await
            .map_err(|err| Error::fault("listing repository topics", err))?;
        if let Some(topic) = cfg.ignored_topic(topics.iter().map(String::as_str)) {
            debug!(pr = %id, topic, "repository opted out by topic");
            return Ok(false);
        }

        Ok(cfg.allowed(&id.repo_full_name))
    }
}
