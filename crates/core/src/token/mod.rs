//! Authentication token lifecycle.
//!
//! The primary video source rejects unauthenticated extraction with bot
//! detection unless requests carry a short-lived proof token. This module
//! owns that token: persistence, TTL-cached verification, single-flight
//! refresh through an external generator, and explicit invalidation.

mod generator;
mod lifecycle;
mod sqlite_store;
mod store;
mod traits;
mod types;

pub use generator::CommandTokenGenerator;
pub use lifecycle::{TokenLifecycle, TokenLifecycleConfig};
pub use sqlite_store::SqliteTokenStore;
pub use store::TokenStore;
pub use traits::{TokenGenerator, TokenProbe};
pub use types::{AuthContext, MintedToken, ProbeFailure, TokenError};
