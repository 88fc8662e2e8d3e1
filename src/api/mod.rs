//! HTTP API for remote control surfaces
//!
//! Sends OSC, runs table actions, evaluates feedback and streams inbound
//! console messages over a WebSocket.
//! Default port: 8126

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::actions::{self, ActionDef, ActionRequest};
use crate::error::{SessionError, TransportError};
use crate::feedback::FeedbackQuery;
use crate::osc::{Message, OscArg};
use crate::session::{InstanceStatus, SessionController};
use crate::transport::ConnectionState;
use crate::variables::{variable_definitions, VariableDefinition};

/// Inbound messages buffered per WebSocket client before it lags
const MESSAGE_BUFFER: usize = 256;

/// Shared state for API handlers
pub struct ApiState {
    pub controller: SessionController,
    /// Every inbound console message, for WebSocket subscribers
    pub messages_tx: broadcast::Sender<Message>,
}

impl ApiState {
    /// Wire the controller's receive path into the broadcast channel
    pub fn new(controller: SessionController) -> Arc<Self> {
        let (messages_tx, _) = broadcast::channel(MESSAGE_BUFFER);
        let tx = messages_tx.clone();
        controller.subscribe_receive(Arc::new(move |message| {
            // No subscribers is fine
            let _ = tx.send(message.clone());
        }));
        Arc::new(Self {
            controller,
            messages_tx,
        })
    }
}

/// Request body for POST /api/send
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub path: String,
    /// Arguments in the multi-argument text syntax
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: InstanceStatus,
    pub connection: Option<ConnectionState>,
    pub protocol: Option<String>,
    pub target: Option<String>,
    pub live_sockets: usize,
    pub generation: u64,
    pub cached_paths: usize,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackParams {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub path: String,
    pub args: Option<Vec<OscArg>>,
}

/// API error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::NoSession
            | SessionError::BadConfig(_)
            | SessionError::Transport(TransportError::NotConnected(_)) => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::Transport(TransportError::Codec(_))
            | SessionError::Argument(_)
            | SessionError::MissingParameter { .. } => StatusCode::BAD_REQUEST,
            SessionError::UnknownAction(_) => StatusCode::NOT_FOUND,
            SessionError::Transport(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            error: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.error }))).into_response()
    }
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/status", get(get_status))
        .route("/api/send", post(send_message))
        .route("/api/actions", get(list_actions))
        .route("/api/actions/:id", post(run_action))
        .route("/api/feedback", get(get_feedback))
        .route("/api/feedback/evaluate", post(evaluate_feedback))
        .route("/api/variables", get(get_variables))
        .route("/api/variables/definitions", get(get_variable_definitions))
        .route("/api/ws/messages", get(messages_ws))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/status - Instance status and session details
async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let controller = &state.controller;
    Json(StatusResponse {
        status: controller.status(),
        connection: controller.connection_state(),
        protocol: controller.connection_config().map(|c| c.protocol.to_string()),
        target: controller.target().map(|t| t.to_string()),
        live_sockets: controller.live_sockets(),
        generation: controller.generation(),
        cached_paths: controller.cache().len(),
    })
}

/// POST /api/send - Send one OSC message
async fn send_message(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SendRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.controller.send_text(&req.path, &req.arguments).await?;
    debug!("API send {} {}", req.path, req.arguments);
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// GET /api/actions - Action table
async fn list_actions() -> Json<&'static [ActionDef]> {
    Json(actions::ACTIONS)
}

/// POST /api/actions/:id - Run an action
async fn run_action(
    Path(id): Path<String>,
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sent = state
        .controller
        .execute_action(&id, &req.params, &req.value)
        .await?;
    info!("Action {} sent {} message(s)", id, sent.len());
    Ok(Json(serde_json::json!({ "ok": true, "sent": sent })))
}

/// GET /api/feedback?path= - Last arguments received on a path
async fn get_feedback(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<FeedbackParams>,
) -> Json<FeedbackResponse> {
    let args = state.controller.lookup(&params.path);
    Json(FeedbackResponse {
        path: params.path,
        args,
    })
}

/// POST /api/feedback/evaluate - Evaluate a feedback condition
async fn evaluate_feedback(
    State(state): State<Arc<ApiState>>,
    Json(query): Json<FeedbackQuery>,
) -> Json<serde_json::Value> {
    let result = state.controller.evaluate(&query);
    Json(serde_json::json!({ "path": query.path(), "result": result }))
}

/// GET /api/variables - Current channel variable values
async fn get_variables(State(state): State<Arc<ApiState>>) -> Json<BTreeMap<String, String>> {
    Json(state.controller.variables().snapshot())
}

/// GET /api/variables/definitions - Every known channel variable
async fn get_variable_definitions() -> Json<Vec<VariableDefinition>> {
    Json(variable_definitions())
}

/// GET /api/ws/messages - WebSocket stream of inbound messages
async fn messages_ws(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state.messages_tx.subscribe()))
}

async fn handle_websocket(mut socket: WebSocket, mut rx: broadcast::Receiver<Message>) {
    debug!("WebSocket client connected for console messages");

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(message) => {
                        let text = match serde_json::to_string(&message) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to serialize {}: {}", message, e);
                                continue;
                            }
                        };
                        if socket.send(WsMessage::Text(text)).await.is_err() {
                            debug!("WebSocket client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged by {} messages", n);
                    }
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!("WebSocket client closed connection");
                        break;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if socket.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

/// Start the API server
pub async fn start_server(state: Arc<ApiState>, port: u16) -> Result<()> {
    let router = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP API on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    axum::serve(listener, router).await.context("API server error")?;

    Ok(())
}
