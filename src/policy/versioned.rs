// SPDX-License-Identifier: MIT
//! Schema-version dispatch across policy implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::ReqCtx;

use super::input::DecisionInput;
use super::rules::{DecisionClient, Rule, SchemaRule};
use super::types::Decision;
use super::Policy;

pub const SCHEMA_RULE: &str = "schema";

/// Asks each module which schema version it is written for, then delegates
/// evaluation to the matching registered policy. Version strings are
/// compared lowercased and trimmed so policy authors can write `V1 `.
pub struct VersionedPolicy {
    schema: SchemaRule,
    versions: HashMap<String, Arc<dyn Policy>>,
}

impl VersionedPolicy {
    pub fn new(client: Arc<dyn DecisionClient>) -> Self {
        Self {
            schema: SchemaRule::new(SCHEMA_RULE, client),
            versions: HashMap::new(),
        }
    }

    pub fn register(mut self, version: &str, policy: Arc<dyn Policy>) -> Self {
        self.versions
            .insert(version.trim().to_lowercase(), policy);
        self
    }
}

#[async_trait]
impl Policy for VersionedPolicy {
    async fn evaluate(
        &self,
        ctx: &ReqCtx,
        module: &str,
        input: &DecisionInput,
    ) -> Result<Decision, Error> {
        let raw = self.schema.evaluate(ctx, module, input).await?;
        let version = raw.trim().to_lowercase();
        let policy = self.versions.get(&version).ok_or_else(|| {
            Error::user(
                format!("module {module} declares unknown schema version {raw:?}"),
                anyhow::anyhow!("no policy registered for {version:?}"),
            )
        })?;
        policy.evaluate(ctx, module, input).await
    }
}
