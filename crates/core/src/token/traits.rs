//! Collaborator traits for token verification and generation.

use async_trait::async_trait;

use super::types::{AuthContext, MintedToken, ProbeFailure, TokenError};

/// Live verification of the current token against the source.
///
/// Implementations must route through the same outbound network path
/// (proxy) as the actual downloads, otherwise a passing probe says nothing
/// about what a download attempt will see.
#[async_trait]
pub trait TokenProbe: Send + Sync {
    /// Run a minimal extraction request using `auth`. Ok means the token
    /// was accepted.
    async fn probe(&self, auth: &AuthContext) -> Result<(), ProbeFailure>;
}

/// External token generator, typically a helper process.
#[async_trait]
pub trait TokenGenerator: Send + Sync {
    /// Mint a fresh proof-token/visitor-id pair.
    async fn generate(&self, caller_tag: &str) -> Result<MintedToken, TokenError>;
}
