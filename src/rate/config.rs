// SPDX-License-Identifier: MIT
//! Rate-limit configuration record.
//!
//! Stored in the dynamic config table as a default limit plus named per-key
//! overrides. Windows are stored as raw duration strings ("10s", "5m") and
//! parsed by the [`DynamicConfig`] hook on every load; a parse failure aborts
//! that load so a half-valid limit set never becomes current.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::configstore::DynamicConfig;

/// One rate limit: `count` events per `window`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    /// Maximum number of events inside the window.
    pub count: u64,
    /// Raw window duration string, e.g. "10s", "5m", "1h".
    pub window: String,
    /// Parsed window; populated by the update hook.
    #[serde(skip, default)]
    pub window_duration: Duration,
}

impl Limit {
    pub fn new(count: u64, window: impl Into<String>) -> Self {
        Self {
            count,
            window: window.into(),
            window_duration: Duration::ZERO,
        }
    }
}

/// Default limit plus per-key overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub default: Limit,
    #[serde(default)]
    pub overrides: HashMap<String, Limit>,
}

impl Default for Limit {
    fn default() -> Self {
        // One approval per minute per key unless configured otherwise.
        Self {
            count: 1,
            window: "1m".to_string(),
            window_duration: Duration::ZERO,
        }
    }
}

impl LimiterConfig {
    /// Limit for a derived throttle key: the override if one exists, else
    /// the default.
    pub fn limit_for(&self, key: &str) -> &Limit {
        self.overrides.get(key).unwrap_or(&self.default)
    }
}

impl DynamicConfig for LimiterConfig {
    fn on_update(&mut self) -> anyhow::Result<()> {
        self.default.window_duration = parse_window(&self.default.window)?;
        for limit in self.overrides.values_mut() {
            limit.window_duration = parse_window(&limit.window)?;
        }
        Ok(())
    }
}

/// Parse a duration string of the form `<integer><unit>` where unit is one of
/// `ms`, `s`, `m`, `h`. No crate in our stack parses humanized durations and
/// the accepted grammar is deliberately small.
pub fn parse_window(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow::anyhow!("duration {raw:?} is missing a unit"))?;
    let (value, unit) = raw.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| anyhow::anyhow!("duration {raw:?} has no numeric value"))?;
    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        other => anyhow::bail!("duration {raw:?} has unknown unit {other:?}"),
    };
    if duration.is_zero() {
        anyhow::bail!("duration {raw:?} must be positive");
    }
    Ok(duration)
}
