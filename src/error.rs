// SPDX-License-Identifier: MIT
//! Service error taxonomy.
//!
//! Every failure that crosses a module boundary is one of these variants so
//! callers can map errors to an HTTP status without string inspection:
//!
//! - `User` — caller/config/policy precondition failures (4xx).
//! - `ServiceFault` — unexpected collaborator failure (5xx).
//! - `TooManyRequests` — throttled, carries the suggested wait (429).
//! - `InvalidReturnType` — the decision service returned a value in an
//!   unexpected shape; an internal contract violation, never silently
//!   defaulted.
//! - `NotFound` — report or config record absent (404).
//!
//! Collaborator traits (`GithubApi`, `DecisionClient`, `Locker`, …) return
//! `anyhow::Result`; classification into this taxonomy happens at the point
//! where the failure is understood.

use std::time::Duration;

/// Top-level error type for evaluation and review operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Precondition or configuration failure attributable to the caller's
    /// repository / policy setup.
    #[error("user error: {message}: {source}")]
    User {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// Unexpected failure from a downstream collaborator.
    #[error("service fault: {message}: {source}")]
    ServiceFault {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// Request was throttled; `retry_after` is the suggested wait time.
    #[error("too many requests: {message}, try again in {retry_after:?}")]
    TooManyRequests {
        message: String,
        retry_after: Duration,
    },

    /// The decision service returned a value of the wrong shape for a rule.
    #[error("invalid return type from rule {rule}: expected {expected}, got {got}")]
    InvalidReturnType {
        rule: String,
        expected: &'static str,
        got: String,
    },

    /// A requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Build a `User` error from a message and an underlying cause.
    pub fn user(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::User {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Build a `ServiceFault` from a message and an underlying cause.
    pub fn fault(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::ServiceFault {
            message: message.into(),
            source: source.into(),
        }
    }

    /// HTTP status code the transport layer should render for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::User { .. } => 400,
            Error::ServiceFault { .. } => 500,
            Error::TooManyRequests { .. } => 429,
            Error::InvalidReturnType { .. } => 500,
            Error::NotFound(_) => 404,
        }
    }

    /// 4xx errors are the caller's to fix; everything else pages us.
    pub fn is_user_error(&self) -> bool {
        let code = self.status_code();
        (400..500).contains(&code)
    }
}
