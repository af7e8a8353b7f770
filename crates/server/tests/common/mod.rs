//! Common test utilities for E2E testing with mocks.
//!
//! Provides a test fixture that builds the in-process router with mock
//! engines and token collaborators injected, so the full HTTP surface can
//! be exercised without external infrastructure.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vidley_core::{
    testing::{MemoryTokenStore, MockEngine, MockNotifier, MockTokenGenerator, MockTokenProbe},
    Config, DownloadManager, ManagerConfig, MediaEngine, Notifier, SqliteJobStore, StorageCleaner,
    StoragePolicy, TokenLifecycle, TokenLifecycleConfig,
};

/// Re-export fixtures for test convenience
#[allow(unused_imports)]
pub use vidley_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock primary engine - script outcomes
    pub primary: Arc<MockEngine>,
    /// Mock secondary engine
    pub secondary: Arc<MockEngine>,
    /// Mock notifier - inspect delivered notifications
    pub notifier: Arc<MockNotifier>,
    /// Temporary directory backing database and output dir
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default mocks and a running manager.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&output_dir).expect("Failed to create output dir");

        let mut config = Config::default();
        config.database.path = db_path.clone();
        config.storage.output_dir = output_dir.clone();

        let job_store =
            Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));

        let primary = Arc::new(MockEngine::primary());
        let secondary = Arc::new(MockEngine::secondary().with_supports(false));
        primary.set_output_dir(output_dir.clone()).await;
        secondary.set_output_dir(output_dir.clone()).await;

        let notifier = Arc::new(MockNotifier::new());

        let tokens = Arc::new(TokenLifecycle::new(
            TokenLifecycleConfig::default(),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(MockTokenProbe::new()),
            Arc::new(MockTokenGenerator::new()),
        ));

        let cleaner = Arc::new(StorageCleaner::new(
            StoragePolicy::default(),
            output_dir,
            job_store.clone(),
        ));

        let manager = Arc::new(
            DownloadManager::new(
                ManagerConfig {
                    max_concurrent: 2,
                    retry_ceiling: 2,
                    attempt_timeout_secs: 10,
                    backoff_base_ms: 10,
                    backoff_max_ms: 40,
                },
                job_store,
                Arc::clone(&primary) as Arc<dyn MediaEngine>,
                Arc::clone(&secondary) as Arc<dyn MediaEngine>,
                Arc::clone(&tokens),
                Arc::clone(&notifier) as Arc<dyn Notifier>,
            )
            .with_cleaner(Arc::clone(&cleaner)),
        );
        manager.start().await;

        let state = Arc::new(vidley_server::state::AppState::new(
            config, manager, cleaner, tokens,
        ));

        let router = vidley_server::api::create_router(state);

        Self {
            router,
            primary,
            secondary,
            notifier,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                builder.body(Body::from(json.to_string())).unwrap()
            }
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }

    /// Poll a job until it reaches the expected status.
    pub async fn wait_for_job_status(&self, job_id: &str, expected: &str, attempts: u32) -> bool {
        for _ in 0..attempts {
            let response = self.get(&format!("/api/v1/jobs/{}", job_id)).await;
            if response.body["status"] == expected {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        false
    }
}
