//! Shared helpers for gateway integration tests: a config pointing at an httpmock server
//! and a gateway started on a free loopback port.

#![allow(dead_code)]

use base64::Engine;
use httpmock::prelude::*;
use lib::config::Config;
use lib::gateway;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

pub const BOT_ID: &str = "B1";
pub const BASIC_USER: &str = "admin";
pub const BASIC_PASS: &str = "s3cret";
pub const ACCESS_TOKEN: &str = "tok-123";

const TEST_KEY_PEM: &str = include_str!("../fixtures/test_rsa_key.pem");

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Complete config whose token endpoint and API base both live on `server`.
pub fn test_config(server: &MockServer, staging_dir: &Path) -> Config {
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.gateway.bind = "127.0.0.1".to_string();
    config.gateway.auth.username = Some(BASIC_USER.to_string());
    config.gateway.auth.password = Some(BASIC_PASS.to_string());
    config.works.client_id = Some("client-1".to_string());
    config.works.client_secret = Some("client-secret".to_string());
    config.works.service_account = Some("svc@example.works".to_string());
    config.works.private_key =
        Some(base64::engine::general_purpose::STANDARD.encode(TEST_KEY_PEM));
    config.works.bot_id = Some(BOT_ID.to_string());
    config.works.api_base = server.url("/v1.0");
    config.works.token_url = server.url("/oauth2/v2.0/token");
    config.attachments.staging_dir = staging_dir.to_path_buf();
    config
}

/// Token endpoint answering every JWT-bearer exchange with [`ACCESS_TOKEN`].
pub fn mock_token_endpoint(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/oauth2/v2.0/token")
            .body_includes("scope=bot")
            .body_includes("client_id=client-1")
            .body_includes("assertion=");
        then.status(200)
            .json_body(json!({ "access_token": ACCESS_TOKEN, "token_type": "Bearer" }));
    })
}

/// Path of a bot API resource on the mock server.
pub fn bot_path(rest: &str) -> String {
    format!("/v1.0/bots/{}/{}", BOT_ID, rest)
}

/// Start the gateway in the background and wait until /health answers. Returns its base URL.
pub async fn spawn_gateway(config: Config) -> String {
    let base = format!("http://127.0.0.1:{}", config.gateway.port);
    tokio::spawn(async move {
        if let Err(e) = gateway::run_gateway(config).await {
            eprintln!("gateway exited: {:#}", e);
        }
    });

    let client = reqwest::Client::new();
    let health = format!("{}/health", base);
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&health).send().await {
            Ok(resp) if resp.status().is_success() => return base,
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 within 5s; last error: {:?}",
        health, last_err
    );
}
