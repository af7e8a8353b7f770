//! Token lifecycle management: verify-before-refresh with a TTL cache.
//!
//! The lifecycle never refreshes a token blindly. A cached context that was
//! verified within the TTL is returned without any network traffic; outside
//! the TTL it is probed first, and only a failed probe triggers the
//! (externally rate-limited) generator. Concurrent callers discovering a
//! stale token at the same time collapse into a single refresh.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::store::TokenStore;
use super::traits::{TokenGenerator, TokenProbe};
use super::types::{AuthContext, ProbeFailure};

/// Configuration for the token lifecycle.
#[derive(Debug, Clone)]
pub struct TokenLifecycleConfig {
    /// How long a successful verification stays trusted.
    pub freshness_ttl: chrono::Duration,
    /// Timeout for a single verification probe, independent of any job
    /// timeout.
    pub probe_timeout: Duration,
}

impl Default for TokenLifecycleConfig {
    fn default() -> Self {
        Self {
            freshness_ttl: chrono::Duration::minutes(5),
            probe_timeout: Duration::from_secs(30),
        }
    }
}

/// Owns the singleton [`AuthContext`]: cached in memory, persisted through
/// the injected store, verified and refreshed through the injected
/// collaborators.
pub struct TokenLifecycle {
    config: TokenLifecycleConfig,
    store: Arc<dyn TokenStore>,
    prober: Arc<dyn TokenProbe>,
    generator: Arc<dyn TokenGenerator>,
    // None until the first load; the inner Option distinguishes "never
    // saved" from "not yet loaded".
    cache: RwLock<Option<Option<AuthContext>>>,
    // Single-flight gate: at most one probe/refresh in flight.
    refresh_gate: Mutex<()>,
}

impl TokenLifecycle {
    pub fn new(
        config: TokenLifecycleConfig,
        store: Arc<dyn TokenStore>,
        prober: Arc<dyn TokenProbe>,
        generator: Arc<dyn TokenGenerator>,
    ) -> Self {
        Self {
            config,
            store,
            prober,
            generator,
            cache: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Return an auth context callers can present to the source.
    ///
    /// No token at all is a legitimate result (an empty context); callers
    /// proceed unauthenticated and fail naturally if the source insists.
    pub async fn get_valid(&self, caller_tag: &str) -> AuthContext {
        let now = Utc::now();

        // Fast path: cached and fresh.
        if let Some(ctx) = self.cached().await {
            if ctx.is_fresh(now, self.config.freshness_ttl) {
                return ctx;
            }
        } else {
            // Nothing stored anywhere: unauthenticated is a valid state.
            return AuthContext::empty();
        }

        // Slow path: serialize probe/refresh across callers.
        let _gate = self.refresh_gate.lock().await;

        // Another caller may have finished the refresh while we waited.
        let now = Utc::now();
        let current = match self.cached().await {
            Some(ctx) => {
                if ctx.is_fresh(now, self.config.freshness_ttl) {
                    return ctx;
                }
                ctx
            }
            None => return AuthContext::empty(),
        };

        debug!(caller = caller_tag, "Auth context stale, probing");

        let probe_result = tokio::time::timeout(
            self.config.probe_timeout,
            self.prober.probe(&current),
        )
        .await;

        match probe_result {
            Ok(Ok(())) => {
                let refreshed = AuthContext {
                    last_verified_at: Some(Utc::now()),
                    verified_valid: true,
                    source: caller_tag.to_string(),
                    ..current
                };
                self.persist(&refreshed).await;
                debug!(caller = caller_tag, "Token verified by probe");
                refreshed
            }
            Ok(Err(ProbeFailure::Rejected(reason))) => {
                info!(
                    caller = caller_tag,
                    reason = %reason,
                    "Token rejected by probe, minting a new one"
                );
                self.mint(caller_tag, current).await
            }
            Ok(Err(ProbeFailure::Inconclusive(reason))) => {
                // The probe could not reach the source; the token may still
                // be good. Hand it out unverified rather than burning a
                // rate-limited generator call.
                warn!(
                    caller = caller_tag,
                    reason = %reason,
                    "Token probe inconclusive, returning unverified context"
                );
                let unverified = AuthContext {
                    verified_valid: false,
                    ..current
                };
                self.persist(&unverified).await;
                unverified
            }
            Err(_) => {
                warn!(caller = caller_tag, "Token probe timed out");
                let unverified = AuthContext {
                    verified_valid: false,
                    ..current
                };
                self.persist(&unverified).await;
                unverified
            }
        }
    }

    /// Force the cached context invalid, immediately visible to all
    /// callers. Used on `AuthRejected` so a dead token is never silently
    /// reused by the next attempt.
    pub async fn invalidate(&self, caller_tag: &str) {
        info!(caller = caller_tag, "Invalidating auth context");
        if let Some(ctx) = self.cached().await {
            let invalid = AuthContext {
                verified_valid: false,
                last_verified_at: None,
                ..ctx
            };
            self.persist(&invalid).await;
        }
    }

    /// Snapshot of the current context without triggering verification.
    pub async fn current(&self) -> Option<AuthContext> {
        self.cached().await
    }

    async fn mint(&self, caller_tag: &str, old: AuthContext) -> AuthContext {
        match self.generator.generate(caller_tag).await {
            Ok(minted) => {
                let fresh = AuthContext {
                    proof_token: Some(minted.proof_token),
                    visitor_id: Some(minted.visitor_id),
                    oauth_token: old.oauth_token,
                    last_verified_at: Some(Utc::now()),
                    verified_valid: true,
                    source: caller_tag.to_string(),
                };
                self.persist(&fresh).await;
                info!(caller = caller_tag, "Minted fresh auth token");
                fresh
            }
            Err(e) => {
                // Generation failed too: return the old context explicitly
                // marked invalid so callers can decide whether to proceed
                // unauthenticated.
                warn!(caller = caller_tag, error = %e, "Token generation failed");
                let invalid = AuthContext {
                    verified_valid: false,
                    last_verified_at: None,
                    ..old
                };
                self.persist(&invalid).await;
                invalid
            }
        }
    }

    async fn cached(&self) -> Option<AuthContext> {
        {
            let cache = self.cache.read().await;
            if let Some(loaded) = cache.as_ref() {
                return loaded.clone();
            }
        }

        // First access: populate the cache from the store.
        let mut cache = self.cache.write().await;
        if let Some(loaded) = cache.as_ref() {
            return loaded.clone();
        }
        let loaded = match self.store.load() {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(error = %e, "Failed to load auth context from store");
                None
            }
        };
        *cache = Some(loaded.clone());
        loaded
    }

    async fn persist(&self, context: &AuthContext) {
        {
            let mut cache = self.cache.write().await;
            *cache = Some(Some(context.clone()));
        }
        if let Err(e) = self.store.save(context) {
            warn!(error = %e, "Failed to persist auth context");
        }
    }
}
