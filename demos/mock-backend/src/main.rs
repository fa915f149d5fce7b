//! Mock agent service for local runs.
//!
//! Run with: cargo run -p agentdeck-mock-backend
//!
//! Any query starting with "start" upgrades to an interactive channel;
//! everything else is answered directly. The accepted bearer token comes
//! from `MOCK_BACKEND_TOKEN` (default `dev-token`).

use std::{collections::HashSet, net::SocketAddr, sync::Arc};

use agentdeck_core::{
    AskRequest, AssistantsConfig, SupervisorProfile, traits::INTERACTIVE_SESSION_START,
};
use axum::{
    Json, Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DEFAULT_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_TOKEN: &str = "dev-token";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    token: Arc<str>,
    sessions: Arc<RwLock<HashSet<String>>>,
    profile: Arc<RwLock<Option<SupervisorProfile>>>,
    assistants: Arc<RwLock<Option<AssistantsConfig>>>,
}

impl AppState {
    fn new(token: impl Into<Arc<str>>) -> Self {
        Self {
            token: token.into(),
            sessions: Arc::default(),
            profile: Arc::default(),
            assistants: Arc::default(),
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|t| t == &*self.token)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let token = std::env::var("MOCK_BACKEND_TOKEN").unwrap_or_else(|_| DEFAULT_TOKEN.into());
    let addr: SocketAddr = std::env::var("MOCK_BACKEND_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.into())
        .parse()?;

    let app = router(AppState::new(token));

    tracing::info!("Mock backend listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/ask", post(ask_handler))
        .route("/ws", get(ws_handler))
        .route("/api/save-supervisor-profile", post(save_profile))
        .route("/api/save-assistants-config", post(save_assistants))
        .route("/api/get-supervisor-profile", get(get_profile))
        .route("/api/get-assistants-config", get(get_assistants))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ask_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AskRequest>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if request.query.trim_start().to_lowercase().starts_with("start") {
        let session_id = Uuid::new_v4().to_string();
        state.sessions.write().await.insert(session_id.clone());
        tracing::info!(%session_id, "Upgrading to interactive session");
        return Json(json!({ "type": INTERACTIVE_SESSION_START, "session_id": session_id }))
            .into_response();
    }

    let routed_to = request
        .agent_id
        .map(|id| format!("agent {id}"))
        .or_else(|| request.assistants.map(|names| names.join(", ")))
        .unwrap_or_else(|| "supervisor".into());
    Json(json!({
        "type": "answer",
        "text": format!("You asked: {}", request.query),
        "lang": request.language,
        "routed_to": routed_to,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct ChannelParams {
    session_id: String,
    token: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ChannelParams>,
    State(state): State<AppState>,
) -> Response {
    if params.token != *state.token {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if !state.sessions.read().await.contains(&params.session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.session_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: String) {
    tracing::info!(%session_id, "Channel connected");
    let greeting = json!({ "type": "answer", "text": "Interactive session started." });
    if socket.send(Message::Text(greeting.to_string().into())).await.is_err() {
        return;
    }

    while let Some(msg) = socket.recv().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        if text.as_str().trim() == "/end" {
            let _ = socket.send(Message::Close(None)).await;
            break;
        }

        let reply = json!({
            "type": "answer",
            "text": format!("[{session_id}] {}", text.as_str()),
        });
        if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
            break;
        }
    }

    state.sessions.write().await.remove(&session_id);
    tracing::info!(%session_id, "Channel disconnected");
}

async fn save_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(profile): Json<SupervisorProfile>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    tracing::info!(name = %profile.name, "Supervisor profile saved");
    *state.profile.write().await = Some(profile);
    Json(json!({ "status": "ok" })).into_response()
}

async fn save_assistants(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(config): Json<AssistantsConfig>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    tracing::info!(count = config.assistants.len(), "Assistants config saved");
    *state.assistants.write().await = Some(config);
    Json(json!({ "status": "ok" })).into_response()
}

async fn get_profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.profile.read().await.clone() {
        Some(profile) => Json(profile).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_assistants(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(state.assistants.read().await.clone().unwrap_or_default()).into_response()
}
