//! Gateway HTTP server: message routes, attachment proxy, health.

use crate::config::{self, Config};
use crate::error::GatewayError;
use crate::gateway::auth::{require_basic_auth, BasicCredentials};
use crate::validate::validate_path_segment;
use crate::works::{
    prepare_message, MessageType, ServiceAccountCredentials, StagedFile, Target, UploadResult,
    WorksClient,
};
use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    middleware,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Shared state for request handlers. Immutable; nothing is carried between requests.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Mints a fresh bot token per request.
    pub credentials: Arc<ServiceAccountCredentials>,
    pub works: WorksClient,
    /// When Some, every route except /health requires these Basic credentials.
    pub basic_auth: Option<Arc<BasicCredentials>>,
}

impl GatewayState {
    /// Resolve credentials and build clients. Fails with a configuration error when any
    /// works setting is missing or the private key does not parse.
    pub fn from_config(config: Config) -> Result<Self, GatewayError> {
        let creds = config::resolve_works_credentials(&config)?;
        let credentials = Arc::new(ServiceAccountCredentials::new(&creds)?);
        let works = WorksClient::new(&creds)?;
        let basic_auth = config::resolve_basic_auth(&config)
            .map(|(user, pass)| Arc::new(BasicCredentials::new(user, pass)));
        Ok(Self {
            config: Arc::new(config),
            credentials,
            works,
            basic_auth,
        })
    }
}

/// Build the router. /health is open; everything else sits behind Basic auth.
pub fn build_router(state: GatewayState) -> Router {
    let max_upload = state.config.attachments.max_upload_bytes;
    let protected = Router::new()
        .route("/", get(root))
        .route(
            "/channels/:channel_id/messages/type/:message_type",
            post(send_channel_message),
        )
        .route(
            "/users/:user_id/messages/type/:message_type",
            post(send_user_message),
        )
        .route(
            "/attachments",
            post(upload_attachment).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/attachments/:file_id", get(download_attachment))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ));

    Router::new()
        .route("/health", get(health_http))
        .merge(protected)
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Without Basic auth credentials the gateway only starts on a loopback bind outside production.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if config::resolve_basic_auth(&config).is_none() {
        if config::is_production(&config) || !config::is_loopback_bind(&bind) {
            anyhow::bail!(
                "refusing to serve on {} without Basic auth (set BASIC_ID and BASIC_PASS)",
                bind
            );
        }
        log::warn!("Basic auth is not configured; serving unauthenticated on loopback only");
    }

    let port = config.gateway.port;
    let state = GatewayState::from_config(config)?;
    log::info!("forwarding messages for bot {}", state.works.bot_id());
    let app = build_router(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a fixed liveness text.
async fn root() -> &'static str {
    "Hello World."
}

/// GET /health returns a simple health JSON (for probes).
async fn health_http() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Request body as a JSON object; an empty body is an empty object.
fn parse_params(body: &Bytes) -> Result<Map<String, Value>, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(GatewayError::BadRequest(
            "request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(GatewayError::BadRequest(format!("invalid JSON body: {}", e))),
    }
}

fn parse_message_type(raw: &str) -> Result<MessageType, GatewayError> {
    raw.parse::<MessageType>().map_err(GatewayError::NotFound)
}

/// Validate, then mint a token, then forward. Validation errors never reach the network.
async fn deliver(
    state: &GatewayState,
    target: Target,
    kind: MessageType,
    params: &Map<String, Value>,
) -> Result<StatusCode, GatewayError> {
    let message = prepare_message(target, kind, params)?;
    let token = state.credentials.access_token().await?;
    state.works.post_message(&token, &message).await?;
    Ok(StatusCode::OK)
}

/// POST /channels/:channel_id/messages/type/:message_type
async fn send_channel_message(
    State(state): State<GatewayState>,
    Path((channel_id, message_type)): Path<(String, String)>,
    body: Bytes,
) -> Result<StatusCode, GatewayError> {
    let kind = parse_message_type(&message_type)?;
    let params = parse_params(&body)?;
    let target = Target::from_ids(None, Some(&channel_id))?;
    deliver(&state, target, kind, &params).await
}

/// POST /users/:user_id/messages/type/:message_type
async fn send_user_message(
    State(state): State<GatewayState>,
    Path((user_id, message_type)): Path<(String, String)>,
    body: Bytes,
) -> Result<StatusCode, GatewayError> {
    let kind = parse_message_type(&message_type)?;
    let params = parse_params(&body)?;
    let target = Target::from_ids(Some(&user_id), None)?;
    deliver(&state, target, kind, &params).await
}

/// Exceeding the body limit surfaces as a multipart read error carrying 413.
fn multipart_error(e: MultipartError, what: &str) -> GatewayError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge(format!("{}: {}", what, e.body_text()))
    } else {
        GatewayError::BadRequest(format!("{}: {}", what, e.body_text()))
    }
}

/// Write the multipart field named `file` to the staging dir. Other fields are skipped.
/// Returns None when the form has no `file` part; nothing is written in that case.
async fn stage_file_field(
    dir: &FsPath,
    multipart: &mut Multipart,
) -> Result<Option<(StagedFile, String)>, GatewayError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "reading multipart body"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let file_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| GatewayError::Transfer(format!("creating staging dir: {}", e)))?;
        let staged = StagedFile::new(dir, &original_name);
        let mut out = tokio::fs::File::create(staged.path())
            .await
            .map_err(|e| GatewayError::Transfer(format!("staging upload: {}", e)))?;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, "reading upload"))?
        {
            out.write_all(&chunk)
                .await
                .map_err(|e| GatewayError::Transfer(format!("staging upload: {}", e)))?;
        }
        out.flush()
            .await
            .map_err(|e| GatewayError::Transfer(format!("staging upload: {}", e)))?;
        return Ok(Some((staged, file_type)));
    }
    Ok(None)
}

/// POST /attachments with multipart field `file`; responds `{fileId}`.
async fn upload_attachment(
    State(state): State<GatewayState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResult>, GatewayError> {
    let Some((staged, file_type)) =
        stage_file_field(&state.config.attachments.staging_dir, &mut multipart).await?
    else {
        return Err(GatewayError::BadRequest(
            "no file uploaded (expected multipart field 'file')".to_string(),
        ));
    };
    let token = state.credentials.access_token().await?;
    let result = state.works.upload(&token, staged, &file_type).await?;
    Ok(Json(result))
}

/// GET /attachments/:file_id: resolve the download URL and relay the bytes.
async fn download_attachment(
    State(state): State<GatewayState>,
    Path(file_id): Path<String>,
) -> Result<Response, GatewayError> {
    validate_path_segment(&file_id, "fileId")?;
    let token = state.credentials.access_token().await?;
    let target = state.works.resolve_download(&token, &file_id).await?;
    let download = state
        .works
        .stream_download(&target.download_url, &token)
        .await
        .map_err(|e| match e {
            GatewayError::NotFound(_) => GatewayError::NotFound(file_id.clone()),
            other => other,
        })?;

    let content_type = download
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = download
        .content_disposition
        .clone()
        .unwrap_or_else(|| format!("attachment; filename=\"{}\"", file_id));
    Response::builder()
        .status(download.status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(download.into_stream()))
        .map_err(|e| GatewayError::Transfer(format!("building download response: {}", e)))
}
