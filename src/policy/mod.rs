// SPDX-License-Identifier: MIT
//! Policy evaluation.
//!
//! A pull request is evaluated against an ordered list of policy modules.
//! Each module is dispatched through [`versioned::VersionedPolicy`] (which
//! resolves the module's schema version) to a concrete [`Policy`] such as
//! [`v1::V1Policy`], which issues typed rule queries to the external decision
//! service. [`evaluator::Evaluator`] coalesces the per-module verdicts by
//! precedence and persists an audit report per evaluation.

pub mod evaluator;
pub mod input;
pub mod report;
pub mod rules;
pub mod types;
pub mod v1;
pub mod versioned;

use async_trait::async_trait;

use crate::error::Error;
use crate::ReqCtx;

use input::DecisionInput;
use types::Decision;

pub use evaluator::Evaluator;
pub use types::{Review, ReviewType};

/// A policy evaluates one module against a decision input.
#[async_trait]
pub trait Policy: Send + Sync {
    async fn evaluate(
        &self,
        ctx: &ReqCtx,
        module: &str,
        input: &DecisionInput,
    ) -> Result<Decision, Error>;
}
