//! Test doubles and fixtures for the core components.
//!
//! Exposed as a normal module (not cfg(test)) so integration tests and the
//! server crate's tests can reuse the same mocks.

mod mock_engine;
mod mock_notifier;
mod mock_token;

pub use mock_engine::{MockEngine, RecordedExtract};
pub use mock_notifier::MockNotifier;
pub use mock_token::{MemoryTokenStore, MockTokenGenerator, MockTokenProbe, ProbeOutcome};

/// Common test fixtures.
pub mod fixtures {
    use chrono::Utc;

    use crate::job::JobSpec;
    use crate::token::AuthContext;

    /// A plain extractor-style job spec.
    pub fn job_spec() -> JobSpec {
        JobSpec::new("https://example.com/watch?v=fixture")
    }

    /// A direct media link spec (claimed by the secondary engine).
    pub fn direct_spec() -> JobSpec {
        JobSpec::new("https://cdn.example.com/media/fixture.mp4")
    }

    /// An auth context verified `minutes_ago` minutes ago.
    pub fn verified_context(minutes_ago: i64) -> AuthContext {
        AuthContext {
            proof_token: Some("fixture-proof".to_string()),
            visitor_id: Some("fixture-visitor".to_string()),
            oauth_token: None,
            last_verified_at: Some(Utc::now() - chrono::Duration::minutes(minutes_ago)),
            verified_valid: true,
            source: "fixture".to_string(),
        }
    }
}
