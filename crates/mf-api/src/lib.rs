//! ---
//! mfg_section: "05-networking-external-interfaces"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "HTTP resource tree, content negotiation, and observe push."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
//! The protocol front end. Every path under `/factory` is resolved against
//! the [`tree`] grammar per request; state resources negotiate their
//! representation via `Accept` and double as observe endpoints over a
//! WebSocket upgrade; command resources validate and forward to the
//! [`CommandSink`].

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use mf_bus::CommandSink;
use mf_model::{epoch_millis, Ack, AckStatus, CommandMessage, CommandScope, DeviceKey};
use mf_twin::TwinStore;

pub mod observe;
pub mod represent;
pub mod tree;

use observe::ObserverRegistry;
use represent::Representation;
use tree::Node;

/// Shared state handed to every request handler.
pub struct ApiState {
    twin: Arc<TwinStore>,
    commands: Arc<dyn CommandSink>,
    observers: ObserverRegistry,
}

impl ApiState {
    pub fn new(twin: Arc<TwinStore>, commands: Arc<dyn CommandSink>) -> Self {
        let observers = ObserverRegistry::new(Arc::clone(&twin));
        Self {
            twin,
            commands,
            observers,
        }
    }
}

/// Uniform error response: a status code and a short reason, rendered as
/// `{"error": "<reason>"}`. Internals never leak into the body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    reason: String,
}

impl ApiError {
    fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    fn not_found(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, reason)
    }

    fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, reason)
    }

    fn not_acceptable(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_ACCEPTABLE, reason)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.reason }))).into_response()
    }
}

/// Build the `/factory` router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/factory", get(get_factory_root))
        .route("/factory/*path", get(get_node).post(post_node))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_factory_root(State(state): State<Arc<ApiState>>) -> Response {
    factory_summary(&state)
}

fn factory_summary(state: &ApiState) -> Response {
    Json(json!({
        "name": "smart-microfactory",
        "status": "operational",
        "devices": state.twin.device_count(),
    }))
    .into_response()
}

async fn get_node(
    State(state): State<Arc<ApiState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError> {
    let node = tree::resolve(&path).ok_or_else(|| ApiError::not_found("no such resource"))?;
    match node {
        Node::Root => Ok(factory_summary(&state)),
        Node::FactoryCommand => Ok(vocabulary_response(CommandScope::Broadcast)),
        Node::Command { .. } => Ok(vocabulary_response(CommandScope::Device)),
        Node::Cell { cell_id } => {
            let mut device_types: Vec<String> = state
                .twin
                .list_by_cell(&cell_id)
                .keys()
                .map(|key| key.device_type.clone())
                .collect();
            device_types.dedup();
            Ok(Json(json!({ "cell": cell_id, "deviceTypes": device_types })).into_response())
        }
        Node::DeviceList { cell_id } => {
            let devices: Vec<_> = state
                .twin
                .list_by_cell(&cell_id)
                .keys()
                .map(|key| json!({ "type": key.device_type, "id": key.device_id }))
                .collect();
            Ok(Json(json!({ "cell": cell_id, "devices": devices })).into_response())
        }
        Node::DeviceType {
            cell_id,
            device_type,
        } => {
            let devices: Vec<String> = state
                .twin
                .list_by_cell(&cell_id)
                .keys()
                .filter(|key| key.device_type == device_type)
                .map(|key| key.device_id.clone())
                .collect();
            Ok(Json(json!({
                "cell": cell_id,
                "type": device_type,
                "devices": devices,
            }))
            .into_response())
        }
        Node::Device { key } => Ok(Json(json!({
            "cell": key.cell_id,
            "type": key.device_type,
            "id": key.device_id,
            "resources": ["state", "cmd"],
        }))
        .into_response()),
        Node::State { key } => {
            let representation = represent::negotiate(&headers)
                .ok_or_else(|| ApiError::not_acceptable("unsupported accept"))?;
            if let Some(ws) = ws {
                let state = Arc::clone(&state);
                return Ok(ws.on_upgrade(move |socket| {
                    observe_loop(socket, state, key, representation)
                }));
            }
            let snapshot = state
                .twin
                .get(&key)
                .ok_or_else(|| ApiError::not_found("device not seen"))?;
            Ok(represent::render(&key, &snapshot, representation))
        }
    }
}

fn vocabulary_response(scope: CommandScope) -> Response {
    Json(json!({
        "commands": scope.vocabulary(),
        "example": { "type": "START", "msgId": "m-42" },
    }))
    .into_response()
}

async fn post_node(
    State(state): State<Arc<ApiState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let node = tree::resolve(&path).ok_or_else(|| ApiError::not_found("no such resource"))?;
    match node {
        Node::FactoryCommand => {
            submit_command(&state, &headers, &body, CommandScope::Broadcast, None).await
        }
        Node::Command { key } => {
            submit_command(&state, &headers, &body, CommandScope::Device, Some(key)).await
        }
        _ => Err(ApiError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "resource does not accept commands",
        )),
    }
}

/// Command submission: JSON-only, validated and normalized before the sink
/// sees it. A refused publication maps to 503; a successful device command
/// additionally marks the sibling state resource changed.
async fn submit_command(
    state: &ApiState,
    headers: &HeaderMap,
    body: &[u8],
    scope: CommandScope,
    key: Option<DeviceKey>,
) -> Result<Response, ApiError> {
    let json_body = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().starts_with("application/json"))
        .unwrap_or(false);
    if !json_body {
        return Err(ApiError::not_acceptable("commands must be application/json"));
    }

    let command: CommandMessage = serde_json::from_slice(body)
        .map_err(|_| ApiError::bad_request("malformed command body"))?;
    let command = command
        .normalized(scope)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let accepted = match &key {
        Some(key) => {
            state
                .commands
                .publish_device_command(key, command.clone())
                .await
        }
        None => state.commands.publish_global_command(command.clone()).await,
    };
    if !accepted {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "bus unavailable",
        ));
    }

    if let Some(key) = &key {
        state.observers.mark_changed(key);
    }

    let ack = Ack {
        cmd_type: command.command_type.clone(),
        status: AckStatus::Ok,
        message: "accepted".into(),
        ts: epoch_millis(),
        msg_id: command.msg_id.clone(),
    };
    Ok((StatusCode::OK, Json(ack)).into_response())
}

/// Observe mode: the current representation immediately (when the device
/// has been seen), then one frame per state replacement or proactive
/// mark-changed, all in the representation negotiated at upgrade time.
async fn observe_loop(
    mut socket: WebSocket,
    state: Arc<ApiState>,
    key: DeviceKey,
    representation: Representation,
) {
    let mut updates = state.observers.subscribe(&key);
    info!(key = %key, "observe session opened");

    if let Some(snapshot) = state.twin.get(&key) {
        match represent::render_frame(&key, &snapshot, representation) {
            Some(frame) => {
                if socket.send(Message::Text(frame)).await.is_err() {
                    return;
                }
            }
            None => warn!(key = %key, "failed to render initial observe frame"),
        }
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let snapshot = match update {
                    Ok(snapshot) => snapshot,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(key = %key, skipped, "observer lagged; dropping frames");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(frame) = represent::render_frame(&key, &snapshot, representation) else {
                    warn!(key = %key, "failed to render observe frame");
                    continue;
                };
                if socket.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
    info!(key = %key, "observe session closed");
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// The bound listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal graceful shutdown and await server exit.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Spawn the HTTP server on `addr` and return its handle.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let app = router(state);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind api listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure api listener as non-blocking")?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve api listener address")?;
    let listener = TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %local_addr, "api server listening");
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %local_addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task,
    })
}
