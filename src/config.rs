// SPDX-License-Identifier: MIT
//! Static service configuration (`revbot.toml`).
//!
//! This is the boot-time configuration: policy module list, bot service
//! account, lock/lease timings and refresh intervals. Dynamic, hot-reloadable
//! configuration (rate limits, repo filters) lives behind
//! [`crate::configstore`] instead.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_POLICY_VERSION: &str = "v1";
const DEFAULT_REPORT_TTL_DAYS: u32 = 30;
const DEFAULT_CONFIG_REFRESH_SECS: u64 = 60;
const DEFAULT_REGISTRY_SWEEP_SECS: u64 = 300;

/// Distributed lock timings (`[lock]` in revbot.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lease duration in seconds; the lock expires if not refreshed.
    pub lease_secs: u64,
    /// Heartbeat period in seconds used to refresh a held lease.
    pub heartbeat_secs: u64,
    /// Polling period in seconds while waiting to acquire a held lock.
    pub refresh_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_secs: 10,
            heartbeat_secs: 3,
            refresh_secs: 2,
        }
    }
}

/// Build-system CI gate (`[ci_gate]` in revbot.toml).
///
/// Repositories carrying `marker_file` in the default branch root must have
/// `required_check` configured as a required status check before auto-merge
/// is allowed; otherwise the approve is skipped.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CiGateConfig {
    /// Marker file identifying repos built by the gated build system.
    pub marker_file: String,
    /// Status check that must be required on the default branch.
    pub required_check: String,
}

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Ordered policy modules evaluated per pull request. Order matters:
    /// equal-precedence verdicts are won by the later module.
    pub modules: Vec<String>,
    /// Login of the bot's service account; used for dedup and dismiss.
    pub service_account: String,
    /// Version label stamped on evaluation reports.
    pub policy_version: String,
    /// Days an evaluation report is retained before TTL expiry.
    pub report_ttl_days: u32,
    /// Seconds between dynamic-config refresh loads.
    pub config_refresh_secs: u64,
    /// Seconds between rate-limiter registry idle sweeps.
    pub registry_sweep_secs: u64,
    /// Lock/lease timings.
    pub lock: LockConfig,
    /// Optional build-system CI gate enforced before auto-merge.
    pub ci_gate: Option<CiGateConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            service_account: String::new(),
            policy_version: DEFAULT_POLICY_VERSION.to_string(),
            report_ttl_days: DEFAULT_REPORT_TTL_DAYS,
            config_refresh_secs: DEFAULT_CONFIG_REFRESH_SECS,
            registry_sweep_secs: DEFAULT_REGISTRY_SWEEP_SECS,
            lock: LockConfig::default(),
            ci_gate: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: ServiceConfig = toml::from_str(&raw)?;
        info!(path = %path.display(), modules = cfg.modules.len(), "loaded service config");
        Ok(cfg)
    }

    pub fn config_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.config_refresh_secs)
    }

    pub fn registry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.registry_sweep_secs)
    }
}

impl LockConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.policy_version, "v1");
        assert_eq!(cfg.lock.lease_secs, 10);
        assert!(cfg.ci_gate.is_none());
        assert_eq!(cfg.config_refresh_interval(), Duration::from_secs(60));
        assert_eq!(cfg.registry_sweep_interval(), Duration::from_secs(300));
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: ServiceConfig = toml::from_str(
            r#"
            modules = ["terraform", "docs"]
            service_account = "svc-revbot"

            [ci_gate]
            marker_file = "pipeline.yaml"
            required_check = "pipeline-ci"
            "#,
        )
        .expect("parse");

        assert_eq!(cfg.modules, vec!["terraform", "docs"]);
        assert_eq!(cfg.service_account, "svc-revbot");
        let gate = cfg.ci_gate.expect("gate");
        assert_eq!(gate.marker_file, "pipeline.yaml");
        assert_eq!(gate.required_check, "pipeline-ci");
        // Unspecified sections fall back to defaults.
        assert_eq!(cfg.lock.heartbeat_secs, 3);
    }
}
