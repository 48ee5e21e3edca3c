// SPDX-License-Identifier: MIT
//! Typed rule evaluation against the decision service.
//!
//! Rules compose a query path from `module/rule[/subfield]` and a decision id
//! from the current request for tracing, then coerce the service's untyped
//! result into the rule's value type. A result of the wrong shape is an
//! [`Error::InvalidReturnType`] — never a silent default.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::github::MergeMethod;
use crate::ReqCtx;

use super::input::DecisionInput;
use super::types::{Review, ReviewType};

/// One decision query issued to the external decision service.
pub struct DecisionQuery<'a> {
    /// `module/rule` or `module/rule/subfield`.
    pub path: String,
    pub input: &'a DecisionInput,
    /// Correlation id recorded against the decision for tracing.
    pub decision_id: &'a str,
}

/// External decision service collaborator.
#[async_trait]
pub trait DecisionClient: Send + Sync {
    async fn decision(&self, query: DecisionQuery<'_>) -> anyhow::Result<serde_json::Value>;
}

/// Compose the query path for a module's rule.
pub fn rule_path(module: &str, rule: &str) -> String {
    format!("{module}/{rule}")
}

/// A typed rule: evaluates one value of type `T` for a module.
#[async_trait]
pub trait Rule<T>: Send + Sync {
    async fn evaluate(
        &self,
        ctx: &ReqCtx,
        module: &str,
        input: &DecisionInput,
    ) -> Result<T, Error>;
}

fn value_kind(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
    .to_string()
}

async fn query(
    client: &Arc<dyn DecisionClient>,
    ctx: &ReqCtx,
    path: String,
    input: &DecisionInput,
) -> Result<serde_json::Value, Error> {
    client
        .decision(DecisionQuery {
            path,
            input,
            decision_id: &ctx.request_id,
        })
        .await
        .map_err(|err| Error::fault("decision service query failed", err))
}

// ─── Track ────────────────────────────────────────────────────────────────────

/// Boolean rule deciding whether a module tracks this PR at all.
pub struct TrackRule {
    rule_name: String,
    client: Arc<dyn DecisionClient>,
}

impl TrackRule {
    pub fn new(rule_name: impl Into<String>, client: Arc<dyn DecisionClient>) -> Self {
        Self {
            rule_name: rule_name.into(),
            client,
        }
    }
}

#[async_trait]
impl Rule<bool> for TrackRule {
    async fn evaluate(
        &self,
        ctx: &ReqCtx,
        module: &str,
        input: &DecisionInput,
    ) -> Result<bool, Error> {
        let path = rule_path(module, &self.rule_name);
        let result = query(&self.client, ctx, path, input).await?;
        result.as_bool().ok_or_else(|| Error::InvalidReturnType {
            rule: "track".to_string(),
            expected: "bool",
            got: value_kind(&result),
        })
    }
}

// ─── Schema ───────────────────────────────────────────────────────────────────

/// String rule naming the policy schema version a module is written for.
pub struct SchemaRule {
    rule_name: String,
    client: Arc<dyn DecisionClient>,
}

impl SchemaRule {
    pub fn new(rule_name: impl Into<String>, client: Arc<dyn DecisionClient>) -> Self {
        Self {
            rule_name: rule_name.into(),
            client,
        }
    }
}

#[async_trait]
impl Rule<String> for SchemaRule {
    async fn evaluate(
        &self,
        ctx: &ReqCtx,
        module: &str,
        input: &DecisionInput,
    ) -> Result<String, Error> {
        let path = rule_path(module, &self.rule_name);
        let result = query(&self.client, ctx, path, input).await?;
        match result.as_str() {
            Some(s) => Ok(s.to_string()),
            None => Err(Error::InvalidReturnType {
                rule: "schema".to_string(),
                expected: "string",
                got: value_kind(&result),
            }),
        }
    }
}

// ─── Review ───────────────────────────────────────────────────────────────────

/// Structured rule producing a module's review verdict.
///
/// Issues up to three sub-queries — `type`, `body`, `merge_preference` —
/// short-circuiting after `type` when the verdict is Skip. Parsing the
/// fields individually keeps the decision-service contract to plain
/// strings instead of a structured document.
pub struct ReviewRule {
    rule_name: String,
    client: Arc<dyn DecisionClient>,
}

impl ReviewRule {
    pub fn new(rule_name: impl Into<String>, client: Arc<dyn DecisionClient>) -> Self {
        Self {
            rule_name: rule_name.into(),
            client,
        }
    }

    fn sub_path(&self, module: &str, field: &str) -> String {
        format!("{}/{field}", rule_path(module, &self.rule_name))
    }
}

#[async_trait]
impl Rule<Review> for ReviewRule {
    async fn evaluate(
        &self,
        ctx: &ReqCtx,
        module: &str,
        input: &DecisionInput,
    ) -> Result<Review, Error> {
        let type_value = query(&self.client, ctx, self.sub_path(module, "type"), input).await?;
        let type_str = type_value.as_str().ok_or_else(|| Error::InvalidReturnType {
            rule: "review.type".to_string(),
            expected: "string",
            got: value_kind(&type_value),
        })?;
        let review_type =
            ReviewType::parse(type_str).ok_or_else(|| Error::InvalidReturnType {
                rule: "review.type".to_string(),
                expected: "review type name",
                got: type_str.to_string(),
            })?;

        if review_type == ReviewType::Skip {
            return Ok(Review {
                review_type,
                ..Review::default()
            });
        }

        let body_value = query(&self.client, ctx, self.sub_path(module, "body"), input).await?;
        let body = body_value.as_str().ok_or_else(|| Error::InvalidReturnType {
            rule: "review.body".to_string(),
            expected: "string",
            got: value_kind(&body_value),
        })?;

        let pref_value = query(
            &self.client,
            ctx,
            self.sub_path(module, "merge_preference"),
            input,
        )
        .await?;
        let merge_preference = match &pref_value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => {
                Some(MergeMethod::parse(s).ok_or_else(|| Error::InvalidReturnType {
                    rule: "review.merge_preference".to_string(),
                    expected: "merge method name",
                    got: s.clone(),
                })?)
            }
            other => {
                return Err(Error::InvalidReturnType {
                    rule: "review.merge_preference".to_string(),
                    expected: "string",
                    got: value_kind(other),
                })
            }
        };

        Ok(Review {
            review_type,
            body: body.to_string(),
            merge_preference,
        })
    }
}
