use imagebatch::store::KeyStore;
use imagebatch::vendor::gemini::{parse_batch_status, GeminiBatchClient};
use imagebatch::vendor::{BatchApi, BatchState, BatchStats, VendorError};
use serde_json::json;
use std::time::Duration;

#[test]
fn state_names_accept_both_prefixes() {
    assert_eq!(BatchState::parse("JOB_STATE_SUCCEEDED"), BatchState::Succeeded);
    assert_eq!(BatchState::parse("BATCH_STATE_SUCCEEDED"), BatchState::Succeeded);
    assert_eq!(BatchState::parse("JOB_STATE_RUNNING"), BatchState::Running);
    assert_eq!(BatchState::parse("BATCH_STATE_PENDING"), BatchState::Pending);
    assert_eq!(BatchState::parse("JOB_STATE_CANCELLED"), BatchState::Cancelled);
    assert_eq!(BatchState::parse("BATCH_STATE_EXPIRED"), BatchState::Expired);
    assert_eq!(
        BatchState::parse("JOB_STATE_PAUSED"),
        BatchState::Unknown("JOB_STATE_PAUSED".into())
    );

    assert!(BatchState::Succeeded.is_terminal());
    assert!(BatchState::Expired.is_terminal());
    assert!(!BatchState::Running.is_terminal());
    assert!(!BatchState::Unknown("x".into()).is_terminal());
}

#[test]
fn rest_operation_shape() {
    let body = json!({
        "name": "batches/abc",
        "metadata": {
            "@type": "type.googleapis.com/google.ai.generativelanguage.v1main.GenerateContentBatch",
            "state": "BATCH_STATE_SUCCEEDED",
            "batchStats": {
                "requestCount": "3",
                "successfulRequestCount": "2",
                "failedRequestCount": "1"
            },
            "output": { "responsesFile": "files/out-1" }
        },
        "done": true
    });

    let st = parse_batch_status(&body).unwrap();
    assert_eq!(st.state, BatchState::Succeeded);
    assert_eq!(
        st.stats,
        Some(BatchStats {
            total: Some(3),
            succeeded: Some(2),
            failed: Some(1),
        })
    );
    assert_eq!(st.result_file.as_deref(), Some("files/out-1"));
    assert!(st.error.is_none());
}

#[test]
fn flat_shape_with_error() {
    let body = json!({
        "name": "batches/xyz",
        "state": "JOB_STATE_FAILED",
        "batchStats": { "totalCount": 2, "failedCount": 2 },
        "error": { "message": "quota" }
    });

    let st = parse_batch_status(&body).unwrap();
    assert_eq!(st.state, BatchState::Failed);
    let stats = st.stats.unwrap();
    assert_eq!(stats.total, Some(2));
    assert_eq!(stats.succeeded, None);
    assert_eq!(stats.failed, Some(2));
    assert_eq!(st.error.as_deref(), Some("quota"));
}

#[test]
fn flat_shape_dest_file() {
    let body = json!({
        "state": "JOB_STATE_SUCCEEDED",
        "dest": { "fileName": "files/r-9" }
    });
    let st = parse_batch_status(&body).unwrap();
    assert_eq!(st.result_file.as_deref(), Some("files/r-9"));
    assert!(st.stats.is_none());
}

#[test]
fn missing_state_is_an_error() {
    assert!(parse_batch_status(&json!({ "name": "batches/q" })).is_err());
}

#[tokio::test]
async fn unreachable_vendor_is_an_error_not_a_hang() {
    let dir = tempfile::tempdir().unwrap();
    let keys = KeyStore::new(dir.path().join(".env.local"));
    keys.set("AIzaSyUNREACHABLE00").unwrap();

    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client =
        GeminiBatchClient::new(format!("http://127.0.0.1:{port}"), "test-model", keys).unwrap();

    let res = tokio::time::timeout(Duration::from_secs(30), client.status("batches/x"))
        .await
        .expect("status call should not hang");
    assert!(matches!(res, Err(VendorError::Request(_))));
}
