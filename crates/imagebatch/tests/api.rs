mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

use common::{setup, setup_without_key, TestEnv};
use imagebatch::api::{router, ApiState};

fn app(env: &TestEnv) -> Router {
    router(ApiState {
        runner: env.runner.clone(),
        max_upload_bytes: 1024,
    })
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>, axum::http::HeaderMap) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, bytes, headers)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body, _) = send(app, req).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn send_json(app: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body, _) = send(app, req).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn multipart(files: &[(&str, &str, &[u8])]) -> Request<Body> {
    let boundary = "XBOUNDARYX";
    let mut body = Vec::new();
    for (name, ctype, data) in files {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {ctype}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let env = setup().await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body, _) = send(&app(&env), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn config_endpoints_manage_the_key() {
    let env = setup().await;
    let app = app(&env);

    let (status, body) = get_json(&app, "/api/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "hasKey": true, "masked": "AIza...5678" }));

    let (status, body) = send_json(&app, Method::DELETE, "/api/config", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (_, body) = get_json(&app, "/api/config").await;
    assert_eq!(body, json!({ "hasKey": false, "masked": null }));

    let (status, body) =
        send_json(&app, Method::POST, "/api/config", json!({ "apiKey": "nope" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid Gemini API key format");

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/config",
        json!({ "apiKey": "AIzaSyNEWKEY00001111" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(env.keys.get().as_deref(), Some("AIzaSyNEWKEY00001111"));
}

#[tokio::test]
async fn create_job_rejects_bad_input() {
    let env = setup().await;
    let app = app(&env);

    let (status, body) =
        send_json(&app, Method::POST, "/api/jobs", json!({ "mode": "video" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid mode");

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/jobs",
        json!({ "mode": "text-to-image", "prompts": ["", " "] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/jobs",
        json!({ "mode": "text-to-image", "prompts": ["a"], "temperature": 9 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(env.runner.list_jobs(50).await.unwrap().is_empty());
}

#[tokio::test]
async fn create_job_without_key_is_bad_request() {
    let env = setup_without_key().await;
    let (status, body) = send_json(
        &app(&env),
        Method::POST,
        "/api/jobs",
        json!({ "mode": "text-to-image", "prompts": ["a cat"] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "API key not configured");
}

#[tokio::test]
async fn created_job_is_submitted_in_background() {
    let env = setup().await;
    let app = app(&env);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/jobs",
        json!({
            "mode": "text-to-image",
            "prompts": ["a cat", "a dog"],
            "outputSize": "2K",
            "aspectRatio": "3:4",
            "temperature": 0.7
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["total_items"], 2);
    assert_eq!(body["job"]["output_size"], "2K");
    assert_eq!(body["job"]["aspect_ratio"], "3:4");
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    let id = body["job"]["id"].as_str().unwrap().to_string();

    let mut last = Value::Null;
    for _ in 0..100 {
        let (status, body) = get_json(&app, &format!("/api/jobs/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        last = body;
        if last["job"]["status"] == "processing" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(last["job"]["status"], "processing");
    assert_eq!(last["job"]["batch_job_name"], "batches/test-batch-1");

    let (_, listed) = get_json(&app, "/api/jobs").await;
    assert_eq!(listed["jobs"].as_array().unwrap().len(), 1);

    let (_, active) = get_json(&app, "/api/jobs?status=active").await;
    assert_eq!(active["job"]["id"], id.as_str());
    assert_eq!(active["items"].as_array().unwrap().len(), 2);

    let (status, body) = send_json(&app, Method::DELETE, &format!("/api/jobs/{id}"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, _) = get_json(&app, &format!("/api/jobs/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, active) = get_json(&app, "/api/jobs?status=active").await;
    assert_eq!(active, json!({ "job": null, "items": [] }));
}

#[tokio::test]
async fn unknown_jobs_are_not_found() {
    let env = setup().await;
    let app = app(&env);
    let id = uuid::Uuid::new_v4();

    let (status, body) = get_json(&app, &format!("/api/jobs/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Job not found");

    let (status, _) = send_json(&app, Method::DELETE, &format!("/api/jobs/{id}"), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&app, "/api/jobs/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_serves_result_with_cache_headers() {
    let env = setup().await;
    let app = app(&env);
    env.blobs.write_result("abc", b"PNGDATA").await.unwrap();

    let req = Request::builder()
        .uri("/api/download/abc.png")
        .body(Body::empty())
        .unwrap();
    let (status, body, headers) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"PNGDATA");
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(headers[header::CONTENT_LENGTH], "7");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "inline; filename=\"abc.png\""
    );
    assert_eq!(
        headers[header::CACHE_CONTROL],
        "public, max-age=31536000, immutable"
    );

    let (status, _) = get_json(&app, "/api/download/missing.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get_json(&app, "/api/download/..%2Fjobs.db").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid filename");
}

#[tokio::test]
async fn upload_stores_images() {
    let env = setup().await;
    let app = app(&env);

    let (status, body, _) = send(
        &app,
        multipart(&[
            ("cat.png", "image/png", &b"png"[..]),
            ("dog.jpeg", "image/jpeg", &b"jpg"[..]),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["name"], "cat.png");
    let path = files[1]["path"].as_str().unwrap();
    assert!(path.ends_with(".jpeg"), "{path}");
    assert_eq!(std::fs::read(path).unwrap(), b"jpg");
}

#[tokio::test]
async fn upload_rejects_bad_files() {
    let env = setup().await;
    let app = app(&env);

    let (status, _, _) = send(&app, multipart(&[("doc.pdf", "application/pdf", &b"%PDF"[..])])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let big = vec![0u8; 2048];
    let (status, _, _) = send(&app, multipart(&[("big.png", "image/png", big.as_slice())])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app, multipart(&[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let stored = std::fs::read_dir(env.blobs.uploads_dir()).unwrap().count();
    assert_eq!(stored, 0);
}
