//! Token storage trait.

use super::types::{AuthContext, TokenError};

/// Persistence for the singleton [`AuthContext`].
pub trait TokenStore: Send + Sync {
    /// Load the current context, if one has ever been saved.
    fn load(&self) -> Result<Option<AuthContext>, TokenError>;

    /// Persist the context, replacing whatever was there.
    fn save(&self, context: &AuthContext) -> Result<(), TokenError>;
}
