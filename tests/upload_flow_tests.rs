//! End-to-end upload flow: controller + HTTP client + mock backend
use std::sync::Arc;
use std::time::Duration;

use marketplace_ops_lib::application::{UploadController, UploadControllerConfig};
use marketplace_ops_lib::domain::{UploadFile, UploadStatus, VendorContext};
use marketplace_ops_lib::infrastructure::{BulkUploadClient, BulkUploadClientConfig};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASE_PATH: &str = "/api/v1/products/bulk-upload";

fn controller_for(base_url: String) -> UploadController<BulkUploadClient> {
    let client = BulkUploadClient::with_config(BulkUploadClientConfig {
        base_url,
        tenant_id: "tenant-1".to_string(),
        timeout_seconds: 5,
        user_agent: "marketplace-ops-tests".to_string(),
    })
    .expect("client");
    UploadController::new(
        Arc::new(client),
        UploadControllerConfig {
            poll_delay: Duration::from_millis(20),
            accepted_extensions: vec![".csv".to_string()],
        },
    )
}

fn controller(server: &MockServer) -> UploadController<BulkUploadClient> {
    controller_for(format!("{}/api/v1", server.uri()))
}

fn csv() -> UploadFile {
    UploadFile::from_bytes("products.csv", b"sku,name,price\nA1,Lamp,12.50\n".to_vec())
}

fn context() -> VendorContext {
    VendorContext::with_store("v1", "s1")
}

async fn mock_upload(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(BASE_PATH))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mock_status(server: &MockServer, body: Value, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("{BASE_PATH}/b1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(times)
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn accepted_upload_completes_after_single_poll() {
    let server = MockServer::start().await;
    mock_upload(&server, ResponseTemplate::new(201).set_body_json(json!({"batch_id": "b1"}))).await;
    mock_status(&server, json!({"batch_id": "b1", "status": "complete"}), 1).await;

    let controller = controller(&server);
    let session = controller.submit(csv(), &context()).await.unwrap();
    assert_eq!(session.status, UploadStatus::Processing);
    assert_eq!(session.batch_id.as_deref(), Some("b1"));
    assert!(session.errors.is_empty());

    let session = controller.wait_for_poll().await;
    assert_eq!(session.status, UploadStatus::Complete);
    assert_eq!(session.batch_id.as_deref(), Some("b1"));
    assert_eq!(session.result["status"], "complete");
}

#[tokio::test]
async fn numeric_batch_id_completes_and_keeps_raw_result() {
    let poll_body = json!({
        "batch_id": 42,
        "status": "complete",
        "valid_products": null,
        "report_url": "https://files.example.com/42/report.csv"
    });
    let server = MockServer::start().await;
    mock_upload(&server, ResponseTemplate::new(201).set_body_json(json!({"batch_id": 42}))).await;
    Mock::given(method("GET"))
        .and(path(format!("{BASE_PATH}/42")))
        .respond_with(ResponseTemplate::new(200).set_body_json(poll_body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let controller = controller(&server);
    let session = controller.submit(csv(), &context()).await.unwrap();
    assert_eq!(session.batch_id.as_deref(), Some("42"));

    let session = controller.wait_for_poll().await;
    assert_eq!(session.status, UploadStatus::Complete);
    assert_eq!(session.result, poll_body);
}

#[tokio::test]
async fn structured_rejection_keeps_object_and_empty_errors() {
    let server = MockServer::start().await;
    mock_upload(
        &server,
        ResponseTemplate::new(413).set_body_json(json!({"detail": "File too large"})),
    )
    .await;

    let session = controller(&server).submit(csv(), &context()).await.unwrap();
    assert_eq!(session.status, UploadStatus::Error);
    assert_eq!(session.result, json!({"detail": "File too large"}));
    assert!(session.errors.is_empty());
    assert_eq!(session.response_status_code, Some(413));
    assert_eq!(session.batch_id, None);
}

#[tokio::test]
async fn detail_in_success_response_is_still_an_error() {
    let server = MockServer::start().await;
    mock_upload(&server, ResponseTemplate::new(200).set_body_json(json!({"detail": "File too large"}))).await;

    let session = controller(&server).submit(csv(), &context()).await.unwrap();
    assert_eq!(session.status, UploadStatus::Error);
    assert_eq!(session.result, json!({"detail": "File too large"}));
    assert!(session.errors.is_empty());
}

#[tokio::test]
async fn row_errors_are_forwarded_verbatim() {
    let server = MockServer::start().await;
    mock_upload(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "errors": ["Row 2: price missing", "Row 5: duplicate SKU"],
            "message": "Validation failed"
        })),
    )
    .await;

    let session = controller(&server).submit(csv(), &context()).await.unwrap();
    assert_eq!(session.status, UploadStatus::Error);
    assert_eq!(session.errors, vec!["Row 2: price missing", "Row 5: duplicate SKU"]);
}

#[tokio::test]
async fn network_failure_synthesizes_upload_failed() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let controller = controller_for(format!("http://127.0.0.1:{port}/api/v1"));
    let session = controller.submit(csv(), &context()).await.unwrap();

    assert_eq!(session.status, UploadStatus::Error);
    assert_eq!(session.result, json!({"detail": "Upload failed"}));
    assert!(session.errors.is_empty());
    assert_eq!(session.response_status_code, None);
}

#[tokio::test]
async fn non_json_server_error_uses_status_message() {
    let server = MockServer::start().await;
    mock_upload(&server, ResponseTemplate::new(500).set_body_string("Internal Server Error")).await;

    let session = controller(&server).submit(csv(), &context()).await.unwrap();
    assert_eq!(session.status, UploadStatus::Error);
    assert_eq!(session.result, json!({"detail": "Request failed with status code 500"}));
    assert_eq!(session.response_status_code, Some(500));
}

#[tokio::test]
async fn still_processing_waits_for_manual_refresh() {
    let server = MockServer::start().await;
    mock_upload(&server, ResponseTemplate::new(201).set_body_json(json!({"batch_id": "b1"}))).await;
    mock_status(&server, json!({"batch_id": "b1", "status": "processing"}), 1).await;
    mock_status(&server, json!({"batch_id": "b1", "status": "complete"}), 1).await;

    let controller = controller(&server);
    controller.submit(csv(), &context()).await.unwrap();

    let session = controller.wait_for_poll().await;
    assert_eq!(session.status, UploadStatus::Processing);

    // No automatic second poll
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.session().await.status, UploadStatus::Processing);

    let session = controller.refresh().await.unwrap();
    assert_eq!(session.status, UploadStatus::Complete);
}

#[tokio::test]
async fn failed_batch_becomes_terminal_error() {
    let server = MockServer::start().await;
    mock_upload(&server, ResponseTemplate::new(201).set_body_json(json!({"batch_id": "b1"}))).await;
    mock_status(
        &server,
        json!({"batch_id": "b1", "status": "error", "error": "Unreadable CSV header"}),
        1,
    )
    .await;

    let controller = controller(&server);
    controller.submit(csv(), &context()).await.unwrap();

    let session = controller.wait_for_poll().await;
    assert_eq!(session.status, UploadStatus::Error);
    assert_eq!(session.errors, vec!["Unreadable CSV header"]);
    assert!(controller.can_submit(&context()).await);
}

#[tokio::test]
async fn failing_poll_leaves_session_processing() {
    let server = MockServer::start().await;
    mock_upload(&server, ResponseTemplate::new(201).set_body_json(json!({"batch_id": "b1"}))).await;
    Mock::given(method("GET"))
        .and(path(format!("{BASE_PATH}/b1")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let controller = controller(&server);
    controller.submit(csv(), &context()).await.unwrap();

    let session = controller.wait_for_poll().await;
    assert_eq!(session.status, UploadStatus::Processing);
    assert_eq!(session.batch_id.as_deref(), Some("b1"));
    assert!(controller.refresh().await.is_err());
    assert_eq!(controller.session().await.status, UploadStatus::Processing);
}

#[tokio::test]
async fn retry_resets_session_and_bumps_clear_signal() {
    let server = MockServer::start().await;
    mock_upload(&server, ResponseTemplate::new(400).set_body_json(json!({"error": "Invalid vendor"}))).await;

    let controller = controller(&server);
    let failed = controller.submit(csv(), &context()).await.unwrap();
    assert_eq!(failed.status, UploadStatus::Error);
    let signal_before = controller.file_clear_signal().await;

    let session = controller.retry().await;
    assert_eq!(session.status, UploadStatus::Idle);
    assert!(session.errors.is_empty());
    assert_eq!(session.batch_id, None);
    assert_eq!(session.result, Value::Null);
    assert_eq!(controller.file_clear_signal().await, signal_before + 1);
}

#[tokio::test]
async fn retry_during_processing_drops_the_pending_poll() {
    let server = MockServer::start().await;
    mock_upload(&server, ResponseTemplate::new(201).set_body_json(json!({"batch_id": "b1"}))).await;
    Mock::given(method("GET"))
        .and(path(format!("{BASE_PATH}/b1")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"batch_id": "b1", "status": "complete"}))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let controller = controller(&server);
    controller.submit(csv(), &context()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    controller.retry().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let session = controller.session().await;
    assert_eq!(session.status, UploadStatus::Idle);
    assert_eq!(session.batch_id, None);
}
