//! Mock token collaborators for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::token::{AuthContext, MintedToken, ProbeFailure, TokenError, TokenGenerator, TokenProbe};

/// Mock verification probe with scriptable outcomes and a call counter.
///
/// Queued outcomes are consumed one per call; once empty, calls succeed.
#[derive(Default)]
pub struct MockTokenProbe {
    calls: AtomicU32,
    outcomes: Mutex<VecDeque<Result<(), ProbeOutcome>>>,
    delay: Mutex<Duration>,
}

/// Cloneable stand-in for [`ProbeFailure`] (which is not Clone).
#[derive(Debug, Clone, Copy)]
pub enum ProbeOutcome {
    Rejected,
    Inconclusive,
}

impl MockTokenProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_rejected(&self) {
        self.outcomes
            .lock()
            .await
            .push_back(Err(ProbeOutcome::Rejected));
    }

    pub async fn push_inconclusive(&self) {
        self.outcomes
            .lock()
            .await
            .push_back(Err(ProbeOutcome::Inconclusive));
    }

    pub async fn push_ok(&self) {
        self.outcomes.lock().await.push_back(Ok(()));
    }

    /// Make every probe take this long (widens race windows in
    /// single-flight tests).
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = delay;
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProbe for MockTokenProbe {
    async fn probe(&self, _auth: &AuthContext) -> Result<(), ProbeFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().await;
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        match self.outcomes.lock().await.pop_front().unwrap_or(Ok(())) {
            Ok(()) => Ok(()),
            Err(ProbeOutcome::Rejected) => {
                Err(ProbeFailure::Rejected("scripted rejection".to_string()))
            }
            Err(ProbeOutcome::Inconclusive) => {
                Err(ProbeFailure::Inconclusive("scripted outage".to_string()))
            }
        }
    }
}

/// Mock token generator with a call counter.
///
/// Mints `proof-N`/`visitor-N` pairs by default; can be scripted to fail.
#[derive(Default)]
pub struct MockTokenGenerator {
    calls: AtomicU32,
    fail: Mutex<bool>,
    delay: Mutex<Duration>,
}

impl MockTokenGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail(&self, fail: bool) {
        *self.fail.lock().await = fail;
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = delay;
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenGenerator for MockTokenGenerator {
    async fn generate(&self, _caller_tag: &str) -> Result<MintedToken, TokenError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.delay.lock().await;
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        if *self.fail.lock().await {
            return Err(TokenError::GeneratorFailed("scripted failure".to_string()));
        }
        Ok(MintedToken {
            proof_token: format!("proof-{}", n),
            visitor_id: format!("visitor-{}", n),
        })
    }
}

/// In-memory token store for tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    context: std::sync::Mutex<Option<AuthContext>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a context.
    pub fn with_context(context: AuthContext) -> Self {
        Self {
            context: std::sync::Mutex::new(Some(context)),
        }
    }
}

impl crate::token::TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<AuthContext>, TokenError> {
        Ok(self.context.lock().unwrap().clone())
    }

    fn save(&self, context: &AuthContext) -> Result<(), TokenError> {
        *self.context.lock().unwrap() = Some(context.clone());
        Ok(())
    }
}
