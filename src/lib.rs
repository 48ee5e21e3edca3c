// SPDX-License-Identifier: MIT
//! revbot — policy-driven pull request review automation.
//!
//! Two halves, composed per webhook delivery:
//!
//! - **Evaluation** ([`policy`]): every configured policy module is asked
//!   for a decision through the external decision service, and the
//!   per-module verdicts are coalesced by precedence into one review.
//! - **Application** ([`review`]): the coalesced verdict is applied to the
//!   platform through a decorator chain that adds per-PR mutual exclusion,
//!   duplicate suppression, approve preconditions and approve throttling
//!   around the raw API calls.
//!
//! [`dispatch::Dispatcher`] is the entry point the transport layer calls
//! for each verified delivery.

pub mod config;
pub mod configstore;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod github;
pub mod handler;
pub mod id;
pub mod lock;
pub mod metrics;
pub mod policy;
pub mod rate;
pub mod review;

pub use error::Error;

/// Per-request correlation context, threaded through evaluation.
#[derive(Debug, Clone)]
pub struct ReqCtx {
    /// Internally generated request id; doubles as the decision id recorded
    /// against decision-service queries.
    pub request_id: String,
    /// Delivery id assigned by the platform; stable across redeliveries.
    pub delivery_id: String,
}

impl ReqCtx {
    /// Context for a fresh delivery, with a generated request id.
    pub fn for_delivery(delivery_id: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            delivery_id: delivery_id.into(),
        }
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}
