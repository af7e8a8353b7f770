use std::sync::Arc;

use vidley_core::{Config, DownloadManager, SanitizedConfig, StorageCleaner, TokenLifecycle};

/// Shared application state
pub struct AppState {
    config: Config,
    manager: Arc<DownloadManager>,
    cleaner: Arc<StorageCleaner>,
    tokens: Arc<TokenLifecycle>,
}

impl AppState {
    pub fn new(
        config: Config,
        manager: Arc<DownloadManager>,
        cleaner: Arc<StorageCleaner>,
        tokens: Arc<TokenLifecycle>,
    ) -> Self {
        Self {
            config,
            manager,
            cleaner,
            tokens,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn manager(&self) -> &DownloadManager {
        &self.manager
    }

    pub fn cleaner(&self) -> &StorageCleaner {
        &self.cleaner
    }

    pub fn tokens(&self) -> &TokenLifecycle {
        &self.tokens
    }
}
