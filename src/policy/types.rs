// SPDX-License-Identifier: MIT
//! Decision types.
//!
//! [`ReviewType`] variants are declared in ascending precedence order; the
//! derived `Ord` is the axis both coalescing and deduplication compare on.

use serde::{Deserialize, Serialize};

use crate::github::MergeMethod;

/// Review verdict kinds, ascending precedence.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewType {
    #[default]
    Skip,
    Approve,
    Comment,
    RequestChanges,
}

impl std::fmt::Display for ReviewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReviewType::Skip => "SKIP",
            ReviewType::Approve => "APPROVE",
            ReviewType::Comment => "COMMENT",
            ReviewType::RequestChanges => "REQUEST_CHANGES",
        };
        f.write_str(s)
    }
}

impl ReviewType {
    /// Parse a verdict name (`APPROVE`, `REQUEST_CHANGES`, …), trimmed and
    /// case-insensitive.
    pub fn parse(raw: &str) -> Option<ReviewType> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SKIP" => Some(ReviewType::Skip),
            "APPROVE" => Some(ReviewType::Approve),
            "COMMENT" => Some(ReviewType::Comment),
            "REQUEST_CHANGES" => Some(ReviewType::RequestChanges),
            _ => None,
        }
    }

    /// Parse a platform review state (`APPROVED`, `CHANGES_REQUESTED`, …)
    /// into the corresponding verdict. The platform spells states in the
    /// past tense; verdict names and states are otherwise the same order.
    pub fn parse_state(raw: &str) -> Option<ReviewType> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SKIP" => Some(ReviewType::Skip),
            "APPROVED" => Some(ReviewType::Approve),
            "COMMENTED" => Some(ReviewType::Comment),
            "CHANGES_REQUESTED" => Some(ReviewType::RequestChanges),
            _ => None,
        }
    }
}

/// A module's review verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "type")]
    pub review_type: ReviewType,
    #[serde(default)]
    pub body: String,
    /// Merge method preference, if the policy states one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_preference: Option<MergeMethod>,
}

/// A module's full decision: whether it tracks this PR at all, and if so the
/// review it wants. The coalesced pipeline output uses the same shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub track: bool,
    #[serde(default)]
    pub review: Review,
}
