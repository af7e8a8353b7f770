//! Types for authentication token management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from token storage and generation.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token generator failed: {0}")]
    GeneratorFailed(String),

    #[error("Token generator timed out after {0}s")]
    GeneratorTimeout(u64),

    #[error("Token generator produced unparseable output: {0}")]
    InvalidGeneratorOutput(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Why a verification probe rejected the current token.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    /// The source rejected the token; it is dead.
    #[error("Token rejected by source: {0}")]
    Rejected(String),

    /// The probe itself could not run (network, timeout). Says nothing
    /// about token validity.
    #[error("Probe inconclusive: {0}")]
    Inconclusive(String),
}

/// Cached authentication material for the primary video source.
///
/// Every field is independently optional: running without any token is a
/// legitimate state, and callers decide whether to proceed unauthenticated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AuthContext {
    /// Proof-of-origin token demanded by the source's bot detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_token: Option<String>,
    /// Visitor identifier bound to the proof token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
    /// Optional OAuth token for authenticated requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token: Option<String>,
    /// When the token last passed a live verification probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<DateTime<Utc>>,
    /// Outcome of the last verification. A stale or missing timestamp
    /// makes this irrelevant; see [`AuthContext::is_fresh`].
    #[serde(default)]
    pub verified_valid: bool,
    /// Which caller last refreshed this context.
    #[serde(default)]
    pub source: String,
}

impl AuthContext {
    /// A context with no token material at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if there is any token material to present.
    pub fn has_token(&self) -> bool {
        self.proof_token.is_some() || self.oauth_token.is_some()
    }

    /// True if the context was verified valid within `ttl` of `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        if !self.verified_valid {
            return false;
        }
        match self.last_verified_at {
            Some(at) => now.signed_duration_since(at) <= ttl,
            None => false,
        }
    }
}

/// A freshly minted token pair from the external generator.
#[derive(Debug, Clone, Deserialize)]
pub struct MintedToken {
    pub proof_token: String,
    pub visitor_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_has_no_token() {
        let ctx = AuthContext::empty();
        assert!(!ctx.has_token());
        assert!(!ctx.verified_valid);
    }

    #[test]
    fn test_freshness_within_ttl() {
        let now = Utc::now();
        let ctx = AuthContext {
            proof_token: Some("tok".to_string()),
            verified_valid: true,
            last_verified_at: Some(now - chrono::Duration::minutes(2)),
            ..Default::default()
        };
        assert!(ctx.is_fresh(now, chrono::Duration::minutes(5)));
        assert!(!ctx.is_fresh(now, chrono::Duration::minutes(1)));
    }

    #[test]
    fn test_not_fresh_without_verification() {
        let now = Utc::now();
        let unverified = AuthContext {
            proof_token: Some("tok".to_string()),
            verified_valid: false,
            last_verified_at: Some(now),
            ..Default::default()
        };
        assert!(!unverified.is_fresh(now, chrono::Duration::minutes(5)));

        let no_timestamp = AuthContext {
            proof_token: Some("tok".to_string()),
            verified_valid: true,
            last_verified_at: None,
            ..Default::default()
        };
        assert!(!no_timestamp.is_fresh(now, chrono::Duration::minutes(5)));
    }
}
