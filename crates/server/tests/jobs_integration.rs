//! Job API integration tests against the in-process router.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestFixture;
use vidley_core::EngineFailureKind;

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_endpoint_is_sanitized() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["proxy_configured"].is_boolean());
    assert!(response.body.get("proxy").is_none());
}

#[tokio::test]
async fn test_submit_and_complete_job() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({
                "source_url": "https://example.com/watch?v=abc123",
                "requested_quality": "p720"
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let job_id = response.body["id"].as_str().unwrap().to_string();
    assert_eq!(response.body["status"], "pending");
    assert_eq!(response.body["requested_quality"], "p720");

    assert!(
        fixture
            .wait_for_job_status(&job_id, "completed", 100)
            .await,
        "job should complete"
    );

    let job = fixture.get(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(job.body["engine_used"], "primary");
    assert_eq!(job.body["attempt_count"], 1);
    assert!(job.body["output_path"].as_str().is_some());
}

#[tokio::test]
async fn test_submit_invalid_url_is_bad_request() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/jobs", json!({ "source_url": "" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("invalid request"));

    let response = fixture
        .post("/api/v1/jobs", json!({ "source_url": "ftp://x/y" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_job_is_not_found() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/jobs/no-such-job").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_jobs_with_status_filter() {
    let fixture = TestFixture::new().await;

    let submitted = fixture
        .post(
            "/api/v1/jobs",
            json!({ "source_url": "https://example.com/watch?v=1" }),
        )
        .await;
    let job_id = submitted.body["id"].as_str().unwrap().to_string();
    assert!(fixture.wait_for_job_status(&job_id, "completed", 100).await);

    let completed = fixture.get("/api/v1/jobs?status=completed").await;
    assert_eq!(completed.status, StatusCode::OK);
    assert_eq!(completed.body["total"], 1);
    assert_eq!(completed.body["jobs"][0]["id"], job_id.as_str());

    let pending = fixture.get("/api/v1/jobs?status=pending").await;
    assert_eq!(pending.body["total"], 0);
}

#[tokio::test]
async fn test_failed_job_surfaces_readable_error() {
    let fixture = TestFixture::new().await;
    // retry_ceiling is 2 in the fixture; two network errors exhaust it.
    fixture
        .primary
        .push_failure(EngineFailureKind::NetworkError)
        .await;
    fixture
        .primary
        .push_failure(EngineFailureKind::NetworkError)
        .await;

    let submitted = fixture
        .post(
            "/api/v1/jobs",
            json!({ "source_url": "https://example.com/watch?v=1" }),
        )
        .await;
    let job_id = submitted.body["id"].as_str().unwrap().to_string();

    assert!(fixture.wait_for_job_status(&job_id, "failed", 200).await);

    let job = fixture.get(&format!("/api/v1/jobs/{}", job_id)).await;
    let error = job.body["last_error"].as_str().unwrap();
    assert!(error.contains("network_error"));
    assert!(error.contains("attempt"));
    assert!(job.body.get("output_path").is_none());
}

#[tokio::test]
async fn test_cancel_job_is_idempotent_over_http() {
    let fixture = TestFixture::new().await;

    let submitted = fixture
        .post(
            "/api/v1/jobs",
            json!({ "source_url": "https://example.com/watch?v=1" }),
        )
        .await;
    let job_id = submitted.body["id"].as_str().unwrap().to_string();
    assert!(fixture.wait_for_job_status(&job_id, "completed", 100).await);

    let first = fixture.delete(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(first.status, StatusCode::NO_CONTENT);
    let second = fixture.delete(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(second.status, StatusCode::NO_CONTENT);

    // Still completed; the cancels were no-ops.
    let job = fixture.get(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(job.body["status"], "completed");
}

#[tokio::test]
async fn test_admin_cleanup_returns_report() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_empty("/api/v1/admin/cleanup").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["files_scanned"].is_number());
    assert!(response.body["evicted"].is_array());
}

#[tokio::test]
async fn test_admin_token_endpoints() {
    let fixture = TestFixture::new().await;

    let status = fixture.get("/api/v1/admin/token").await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["present"], false);

    let invalidated = fixture.post_empty("/api/v1/admin/token/invalidate").await;
    assert_eq!(invalidated.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_status_endpoint_reports_worker_pool() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/status").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["running"], true);
    assert_eq!(response.body["workers"], 2);
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/metrics").await;
    assert_eq!(response.status, StatusCode::OK);
}
