//! Attachment proxy end to end: two-phase upload and redirect-resolved streamed download.

mod common;

use common::{bot_path, mock_token_endpoint, spawn_gateway, test_config, BASIC_PASS, BASIC_USER};
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::path::Path;

fn staged_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn upload_registers_then_streams_the_file() {
    let server = MockServer::start();
    let token = mock_token_endpoint(&server);
    let register = server.mock(|when, then| {
        when.method(POST)
            .path(bot_path("attachments"))
            .json_body(json!({ "fileName": "note.txt" }));
        then.status(200).json_body(json!({
            "uploadUrl": server.url("/upload/abc"),
            "fileId": "F-uploaded"
        }));
    });
    let upload = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/abc")
            .body_includes("name=\"resourceName\"")
            .body_includes("name=\"file\"")
            .body_includes("hello attachment");
        then.status(200).json_body(json!({ "fileId": "F-uploaded" }));
    });
    let tmp = tempfile::tempdir().expect("tempdir");
    let staging = tmp.path().join("staging");
    let base = spawn_gateway(test_config(&server, &staging)).await;

    let part = reqwest::multipart::Part::bytes(b"hello attachment".to_vec())
        .file_name("note.txt")
        .mime_str("text/plain")
        .expect("mime");
    let form = reqwest::multipart::Form::new().part("file", part);
    let resp = reqwest::Client::new()
        .post(format!("{}/attachments", base))
        .basic_auth(BASIC_USER, Some(BASIC_PASS))
        .multipart(form)
        .send()
        .await
        .expect("POST /attachments");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Value = resp.json().await.expect("upload JSON");
    assert_eq!(body, json!({ "fileId": "F-uploaded" }));

    token.assert_calls(1);
    register.assert_calls(1);
    upload.assert_calls(1);
    assert_eq!(staged_files(&staging), 0, "staged upload must be removed");
}

#[tokio::test]
async fn upload_without_file_part_is_rejected() {
    let server = MockServer::start();
    let token = mock_token_endpoint(&server);
    let register = server.mock(|when, then| {
        when.method(POST).path(bot_path("attachments"));
        then.status(200);
    });
    let tmp = tempfile::tempdir().expect("tempdir");
    let staging = tmp.path().join("staging");
    let base = spawn_gateway(test_config(&server, &staging)).await;

    let form = reqwest::multipart::Form::new().text("note", "no file here");
    let resp = reqwest::Client::new()
        .post(format!("{}/attachments", base))
        .basic_auth(BASIC_USER, Some(BASIC_PASS))
        .multipart(form)
        .send()
        .await
        .expect("POST /attachments");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    token.assert_calls(0);
    register.assert_calls(0);
    assert!(!staging.exists(), "no staging file may be created");
}

#[tokio::test]
async fn failed_upload_still_removes_the_staged_file() {
    let server = MockServer::start();
    mock_token_endpoint(&server);
    server.mock(|when, then| {
        when.method(POST).path(bot_path("attachments"));
        then.status(500).body("registration unavailable");
    });
    let tmp = tempfile::tempdir().expect("tempdir");
    let staging = tmp.path().join("staging");
    let base = spawn_gateway(test_config(&server, &staging)).await;

    let part = reqwest::multipart::Part::bytes(b"payload".to_vec()).file_name("a.bin");
    let resp = reqwest::Client::new()
        .post(format!("{}/attachments", base))
        .basic_auth(BASIC_USER, Some(BASIC_PASS))
        .multipart(reqwest::multipart::Form::new().part("file", part))
        .send()
        .await
        .expect("POST /attachments");
    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(staged_files(&staging), 0);
}

#[tokio::test]
async fn download_follows_location_and_relays_bytes() {
    let server = MockServer::start();
    mock_token_endpoint(&server);
    let resolve = server.mock(|when, then| {
        when.method(GET).path(bot_path("attachments/F1"));
        then.status(302).header("location", server.url("/files/F1"));
    });
    let content = server.mock(|when, then| {
        when.method(GET).path("/files/F1");
        then.status(200)
            .header("content-type", "text/plain")
            .header("content-disposition", "attachment; filename=\"report.txt\"")
            .body("file contents");
    });
    let staging = tempfile::tempdir().expect("tempdir");
    let base = spawn_gateway(test_config(&server, staging.path())).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/attachments/F1", base))
        .basic_auth(BASIC_USER, Some(BASIC_PASS))
        .send()
        .await
        .expect("GET /attachments/F1");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    assert_eq!(header("content-type").as_deref(), Some("text/plain"));
    assert_eq!(
        header("content-disposition").as_deref(),
        Some("attachment; filename=\"report.txt\"")
    );
    assert_eq!(resp.text().await.expect("body"), "file contents");
    resolve.assert_calls(1);
    content.assert_calls(1);
}

#[tokio::test]
async fn download_defaults_disposition_to_the_file_id() {
    let server = MockServer::start();
    mock_token_endpoint(&server);
    server.mock(|when, then| {
        when.method(GET).path(bot_path("attachments/F2"));
        then.status(200)
            .json_body(json!({ "downloadUrl": server.url("/files/F2") }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/files/F2");
        then.status(200).body("raw");
    });
    let staging = tempfile::tempdir().expect("tempdir");
    let base = spawn_gateway(test_config(&server, staging.path())).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/attachments/F2", base))
        .basic_auth(BASIC_USER, Some(BASIC_PASS))
        .send()
        .await
        .expect("GET /attachments/F2");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok()),
        Some("attachment; filename=\"F2\"")
    );
    assert_eq!(resp.text().await.expect("body"), "raw");
}

#[tokio::test]
async fn unknown_attachment_is_not_found() {
    let server = MockServer::start();
    mock_token_endpoint(&server);
    server.mock(|when, then| {
        when.method(GET).path(bot_path("attachments/missing"));
        then.status(404);
    });
    let staging = tempfile::tempdir().expect("tempdir");
    let base = spawn_gateway(test_config(&server, staging.path())).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/attachments/missing", base))
        .basic_auth(BASIC_USER, Some(BASIC_PASS))
        .send()
        .await
        .expect("GET /attachments/missing");
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_download_url_reports_the_file_id_only() {
    let server = MockServer::start();
    mock_token_endpoint(&server);
    server.mock(|when, then| {
        when.method(GET).path(bot_path("attachments/F3"));
        then.status(302)
            .header("location", server.url("/files/secret-token-F3"));
    });
    server.mock(|when, then| {
        when.method(GET).path("/files/secret-token-F3");
        then.status(404);
    });
    let staging = tempfile::tempdir().expect("tempdir");
    let base = spawn_gateway(test_config(&server, staging.path())).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/attachments/F3", base))
        .basic_auth(BASIC_USER, Some(BASIC_PASS))
        .send()
        .await
        .expect("GET /attachments/F3");
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.expect("error JSON");
    let message = body["error"].as_str().expect("error message");
    assert!(message.contains("F3"), "unexpected error: {}", message);
    assert!(!message.contains("secret-token"), "download URL leaked: {}", message);
}

#[tokio::test]
async fn download_file_id_cannot_climb_out_of_attachments() {
    let server = MockServer::start();
    let token = mock_token_endpoint(&server);
    let any_get = server.mock(|when, then| {
        when.method(GET);
        then.status(200).body("should not be fetched");
    });
    let staging = tempfile::tempdir().expect("tempdir");
    let base = spawn_gateway(test_config(&server, staging.path())).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/attachments/..%2Fchannels%2FC1", base))
        .basic_auth(BASIC_USER, Some(BASIC_PASS))
        .send()
        .await
        .expect("GET /attachments with encoded separators");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    token.assert_calls(0);
    any_get.assert_calls(0);
}

#[tokio::test]
async fn upload_over_the_body_limit_is_payload_too_large() {
    let server = MockServer::start();
    let token = mock_token_endpoint(&server);
    let register = server.mock(|when, then| {
        when.method(POST).path(bot_path("attachments"));
        then.status(200);
    });
    let tmp = tempfile::tempdir().expect("tempdir");
    let staging = tmp.path().join("staging");
    let mut config = test_config(&server, &staging);
    config.attachments.max_upload_bytes = 1024;
    let base = spawn_gateway(config).await;

    let part = reqwest::multipart::Part::bytes(vec![b'x'; 8 * 1024]).file_name("big.bin");
    let resp = reqwest::Client::new()
        .post(format!("{}/attachments", base))
        .basic_auth(BASIC_USER, Some(BASIC_PASS))
        .multipart(reqwest::multipart::Form::new().part("file", part))
        .send()
        .await
        .expect("POST /attachments");
    assert_eq!(resp.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
    token.assert_calls(0);
    register.assert_calls(0);
    assert_eq!(staged_files(&staging), 0);
}
