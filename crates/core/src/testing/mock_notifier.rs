//! Mock notification sink for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::notify::{JobNotification, Notifier};

/// Mock implementation of the Notifier trait; records everything it is
/// handed.
#[derive(Default)]
pub struct MockNotifier {
    received: Arc<RwLock<Vec<JobNotification>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications received so far.
    pub async fn received(&self) -> Vec<JobNotification> {
        self.received.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.received.read().await.len()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, notification: JobNotification) {
        self.received.write().await.push(notification);
    }
}
