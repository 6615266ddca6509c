//! WebSocket server for the agent chat.
//!
//! Each connection gets its own router session. Every inbound text frame is
//! one user turn; the reply is streamed back as word groups followed by the
//! [`DONE_SENTINEL`] frame.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Credentials, ServerSettings, Settings};
use crate::router::RouterServices;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

/// Frame sent after the last fragment of every reply.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Shared application state.
struct AppState {
    services: RouterServices,
    words_per_chunk: usize,
    chunk_delay: Duration,
}

/// Run the WebSocket server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    let credentials = Credentials::from_env();
    if let Err(e) = preflight::check(Operation::Router, &settings, &credentials) {
        Output::error(&format!("{}", e));
        Output::info("Run 'forecast-assistant doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let services = RouterServices::from_settings(&settings, &credentials)?;
    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Forecast Assistant Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET /health");
    Output::kv("Chat", &format!("WS  ws://{}/ws", addr));
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app(services, &settings.server)).await?;

    Ok(())
}

/// Build the router: `/health` and the `/ws` chat endpoint.
pub fn app(services: RouterServices, server: &ServerSettings) -> Router {
    let state = Arc::new(AppState {
        services,
        words_per_chunk: server.words_per_chunk.max(1),
        chunk_delay: Duration::from_millis(server.chunk_delay_ms),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .layer(cors)
        .with_state(state)
}

/// Split `text` into groups of `words_per_chunk` words.
///
/// Whitespace is kept with the word before it, so the fragments concatenate
/// back into `text` exactly. A blank reply yields no fragments.
pub fn chunk_words(text: &str, words_per_chunk: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let words_per_chunk = words_per_chunk.max(1);
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut words = 0;

    for token in text.split_inclusive(char::is_whitespace) {
        let is_word = !token.trim().is_empty();
        if is_word && words == words_per_chunk {
            fragments.push(std::mem::take(&mut current));
            words = 0;
        }
        current.push_str(token);
        if is_word {
            words += 1;
        }
    }
    if !current.is_empty() {
        fragments.push(current);
    }

    fragments
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4();
    info!("WebSocket connection {} opened", conn_id);

    let (mut sender, mut receiver) = socket.split();
    let mut session = state.services.session();

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error on {}: {}", conn_id, e);
                break;
            }
        };

        let outcome = match session.run_turn(&text).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Turn failed on {}: {}", conn_id, e);
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        };
        debug!(
            "Connection {} turn answered by {} with {} tool call(s)",
            conn_id,
            outcome.agent,
            outcome.tool_calls.len()
        );

        if stream_reply(&mut sender, &outcome.reply, &state).await.is_err() {
            break;
        }
    }

    info!("WebSocket connection {} closed", conn_id);
}

async fn stream_reply<S>(sender: &mut S, reply: &str, state: &AppState) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let fragments = chunk_words(reply, state.words_per_chunk);
    let count = fragments.len();
    for (i, fragment) in fragments.into_iter().enumerate() {
        sender.send(Message::Text(fragment.into())).await?;
        if i + 1 < count && !state.chunk_delay.is_zero() {
            tokio::time::sleep(state.chunk_delay).await;
        }
    }
    sender.send(Message::Text(DONE_SENTINEL.into())).await
}
