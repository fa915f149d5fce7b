//! Gateway and channel against an in-process backend.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use agentdeck_core::{
    AskGateway, AskRequest, AskResponse, AssistantConfig, AssistantsConfig, AuthError,
    ChannelConnector, ChannelEvent, ChannelState, ClientConfig, ClientError, CloseReason,
    ConfigGateway, Credential, CredentialProvider, MemoryCredentials, SupervisorProfile, ToolSpec,
};
use agentdeck_transport::{HttpGateway, WsConnector};
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
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};

const GOOD_TOKEN: &str = "good-token";

#[derive(Clone, Default)]
struct Backend {
    profile: Arc<Mutex<Option<Value>>>,
    assistants: Arc<Mutex<Option<Value>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {GOOD_TOKEN}"))
}

async fn ask(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let query = body["query"].as_str().unwrap_or_default();
    if query == "boom" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "exploded").into_response();
    }
    if query.starts_with("start") {
        return Json(json!({ "type": "interactive_session_start", "session_id": "s-1" }))
            .into_response();
    }
    Json(json!({ "type": "answer", "text": format!("echo: {query}"), "lang": body["lang"] }))
        .into_response()
}

async fn save(slot: &Mutex<Option<Value>>, headers: &HeaderMap, body: Value) -> Response {
    if !authorized(headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    *slot.lock().await = Some(body);
    Json(json!({ "status": "ok" })).into_response()
}

async fn load(slot: &Mutex<Option<Value>>, headers: &HeaderMap) -> Response {
    if !authorized(headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match slot.lock().await.clone() {
        Some(value) => Json(value).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Deserialize)]
struct ChannelParams {
    session_id: String,
    token: String,
}

async fn channel(ws: WebSocketUpgrade, Query(params): Query<ChannelParams>) -> Response {
    if params.token != GOOD_TOKEN {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| echo(socket, params.session_id))
}

async fn echo(mut socket: WebSocket, session_id: String) {
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let reply = match text.as_str() {
            "bye" => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
            "garbage" => String::from("not json"),
            other => {
                json!({ "type": "answer", "text": format!("{session_id}: {other}") }).to_string()
            }
        };
        if socket.send(Message::Text(reply.into())).await.is_err() {
            return;
        }
    }
}

async fn spawn_backend() -> SocketAddr {
    let state = Backend::default();
    let app = Router::new()
        .route("/api/ask", post(ask))
        .route("/ws", get(channel))
        .route(
            "/api/save-supervisor-profile",
            post(|State(s): State<Backend>, h: HeaderMap, Json(b): Json<Value>| async move {
                save(&s.profile, &h, b).await
            }),
        )
        .route(
            "/api/save-assistants-config",
            post(|State(s): State<Backend>, h: HeaderMap, Json(b): Json<Value>| async move {
                save(&s.assistants, &h, b).await
            }),
        )
        .route(
            "/api/get-supervisor-profile",
            get(|State(s): State<Backend>, h: HeaderMap| async move {
                load(&s.profile, &h).await
            }),
        )
        .route(
            "/api/get-assistants-config",
            get(|State(s): State<Backend>, h: HeaderMap| async move {
                load(&s.assistants, &h).await
            }),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config_for(addr: SocketAddr) -> Arc<ClientConfig> {
    Arc::new(ClientConfig::new(format!("http://{addr}")).unwrap())
}

fn gateway(addr: SocketAddr, token: &str) -> (HttpGateway, Arc<MemoryCredentials>) {
    let credentials = Arc::new(MemoryCredentials::with_token(token));
    let gw = HttpGateway::new(config_for(addr), credentials.clone()).unwrap();
    (gw, credentials)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> Option<ChannelEvent> {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for channel event")
}

#[tokio::test]
async fn ask_returns_direct_answer() {
    let addr = spawn_backend().await;
    let (gw, _) = gateway(addr, GOOD_TOKEN);

    let response = gw.ask(&AskRequest::new("hello", "de", None, None)).await.unwrap();
    let AskResponse::Answer(payload) = response else {
        panic!("expected a direct answer, got {response:?}");
    };
    assert_eq!(payload["text"], "echo: hello");
    assert_eq!(payload["lang"], "de");
}

#[tokio::test]
async fn ask_recognizes_upgrade() {
    let addr = spawn_backend().await;
    let (gw, _) = gateway(addr, GOOD_TOKEN);

    let response = gw.ask(&AskRequest::new("start a session", "en", None, None)).await.unwrap();
    assert_eq!(
        response,
        AskResponse::InteractiveStart {
            session_id: "s-1".into()
        }
    );
}

#[tokio::test]
async fn rejected_credential_is_cleared() {
    let addr = spawn_backend().await;
    let (gw, credentials) = gateway(addr, "stale-token");

    let err = gw.ask(&AskRequest::new("hello", "en", None, None)).await.unwrap_err();
    assert!(matches!(err, ClientError::Auth(AuthError::Rejected)));
    assert!(credentials.get().is_none());

    // The next call fails before reaching the server.
    let err = gw.ask(&AskRequest::new("hello", "en", None, None)).await.unwrap_err();
    assert!(matches!(err, ClientError::Auth(AuthError::Missing)));
}

#[tokio::test]
async fn server_error_keeps_status() {
    let addr = spawn_backend().await;
    let (gw, credentials) = gateway(addr, GOOD_TOKEN);

    let err = gw.ask(&AskRequest::new("boom", "en", None, None)).await.unwrap_err();
    assert!(matches!(err, ClientError::Http { status: 500, .. }));
    assert!(credentials.get().is_some());
}

#[tokio::test]
async fn saved_configuration_can_be_fetched() {
    let addr = spawn_backend().await;
    let (gw, _) = gateway(addr, GOOD_TOKEN);

    let profile = SupervisorProfile {
        name: "Supervisor".into(),
        model: "gpt-4o-2024-05-13".into(),
        persona: "Supervisor".into(),
        system_message: "Route carefully.".into(),
    };
    let assistants = AssistantsConfig {
        assistants: vec![AssistantConfig {
            name: "Weather".into(),
            system_message: "Report the weather.".into(),
            tasks: vec![ToolSpec {
                name: "forecast".into(),
                description: "Get a forecast".into(),
                endpoint: "http://tools/forecast".into(),
                params_schema: json!({ "type": "object" }),
            }],
        }],
    };

    gw.save_supervisor_profile(&profile).await.unwrap();
    gw.save_assistants_config(&assistants).await.unwrap();

    assert_eq!(gw.fetch_supervisor_profile().await.unwrap(), profile);
    assert_eq!(gw.fetch_assistants_config().await.unwrap(), assistants);
}

#[tokio::test]
async fn channel_delivers_frames_in_order() {
    let addr = spawn_backend().await;
    let connector = WsConnector::new(config_for(addr));
    let credential = Credential::parse(GOOD_TOKEN).unwrap();

    let mut opened = connector.open("s-1", &credential).await.unwrap();
    assert_eq!(opened.channel.session_id(), "s-1");
    assert_eq!(opened.channel.state(), ChannelState::Open);

    for text in ["one", "two", "three"] {
        opened.channel.send(text).await.unwrap();
    }
    for expected in ["s-1: one", "s-1: two", "s-1: three"] {
        match next_event(&mut opened.events).await {
            Some(ChannelEvent::Frame(frame)) => assert_eq!(frame["text"], expected),
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    opened.channel.close().await;
}

#[tokio::test]
async fn handshake_rejection_is_auth_error() {
    let addr = spawn_backend().await;
    let connector = WsConnector::new(config_for(addr));
    let credential = Credential::parse("stale-token").unwrap();

    let result = connector.open("s-1", &credential).await;
    assert!(matches!(result, Err(ClientError::Auth(AuthError::Rejected))));
}

#[tokio::test]
async fn close_is_idempotent_and_notifies_once() {
    let addr = spawn_backend().await;
    let connector = WsConnector::new(config_for(addr));
    let credential = Credential::parse(GOOD_TOKEN).unwrap();

    let mut opened = connector.open("s-1", &credential).await.unwrap();
    opened.channel.close().await;
    opened.channel.close().await;

    assert_eq!(opened.channel.state(), ChannelState::Closed);
    assert_eq!(
        next_event(&mut opened.events).await,
        Some(ChannelEvent::Closed(CloseReason::Local))
    );
    assert_eq!(next_event(&mut opened.events).await, None);

    assert!(matches!(opened.channel.send("late").await, Err(ClientError::NotReady)));
}

#[tokio::test]
async fn remote_close_is_reported() {
    let addr = spawn_backend().await;
    let connector = WsConnector::new(config_for(addr));
    let credential = Credential::parse(GOOD_TOKEN).unwrap();

    let mut opened = connector.open("s-1", &credential).await.unwrap();
    opened.channel.send("bye").await.unwrap();

    assert_eq!(
        next_event(&mut opened.events).await,
        Some(ChannelEvent::Closed(CloseReason::Remote))
    );
    assert_eq!(opened.channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn undecodable_frame_is_surfaced() {
    let addr = spawn_backend().await;
    let connector = WsConnector::new(config_for(addr));
    let credential = Credential::parse(GOOD_TOKEN).unwrap();

    let mut opened = connector.open("s-1", &credential).await.unwrap();
    opened.channel.send("garbage").await.unwrap();

    assert!(matches!(
        next_event(&mut opened.events).await,
        Some(ChannelEvent::Malformed(_))
    ));
    opened.channel.close().await;
}
