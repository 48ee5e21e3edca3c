// SPDX-License-Identifier: MIT
//! Schema-v1 policy: a track gate followed by a review verdict.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::ReqCtx;

use super::input::DecisionInput;
use super::rules::{DecisionClient, ReviewRule, Rule, TrackRule};
use super::types::Decision;
use super::Policy;

pub const TRACK_RULE: &str = "track";
pub const REVIEW_RULE: &str = "review";

/// V1 policy modules expose two rules: `track` answers whether the module
/// cares about this PR, `review` produces the verdict. When `track` is
/// false the review rule is never consulted.
pub struct V1Policy {
    track: TrackRule,
    review: ReviewRule,
}

impl V1Policy {
    pub fn new(client: Arc<dyn DecisionClient>) -> Self {
        Self {
            track: TrackRule::new(TRACK_RULE, client.clone()),
            review: ReviewRule::new(REVIEW_RULE, client),
        }
    }
}

#[async_trait]
impl Policy for V1Policy {
    async fn evaluate(
        &self,
        ctx: &ReqCtx,
        module: &str,
        input: &DecisionInput,
    ) -> Result<Decision, Error> {
        let track = self.track.evaluate(ctx, module, input).await?;
        if !track {
            return Ok(Decision::default());
        }
        let review = self.review.evaluate(ctx, module, input).await?;
        Ok(Decision {
            track: true,
            review,
        })
    }
}
