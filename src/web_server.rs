use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    serve, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::constants::SYSTEM_PROMPT;
use crate::gemini::{DocumentHandle, GeminiClient};
use crate::relay::{Relay, RelayEvent};
use crate::session::ChatSession;

// Messages the browser sends over the WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Chat { text: String },
    Clear,
}

// Messages sent back to the browser.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Info { message: String },
    Snapshot { text: String },
    Done { text: String },
    Error { message: String },
    Cleared,
}

/// Shared application state. The client and document handle are immutable
/// and shared; each WebSocket connection gets its own chat session.
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    client: Arc<GeminiClient>,
    document: Arc<DocumentHandle>,
    model: String,
}

impl AppState {
    pub fn new(
        client: Arc<GeminiClient>,
        document: Arc<DocumentHandle>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let templates = create_minijinja_env().context("Failed to initialize template engine")?;
        Ok(Self {
            templates: Arc::new(templates),
            client,
            document,
            model: model.into(),
        })
    }
}

// Minijinja Environment setup
fn create_minijinja_env() -> Result<AutoReloader> {
    // Use AutoReloader for development convenience
    let reloader = AutoReloader::new(|notifier| {
        let loader = path_loader("templates");
        let mut env = Environment::new();
        env.set_loader(loader);
        // Watch the templates directory for changes
        notifier.watch_path("templates", true);
        Ok(env)
    });
    Ok(reloader)
}

async fn index_handler(
    State(state): State<AppState>,
) -> Result<axum::response::Html<String>, axum::response::Html<String>> {
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => "Constitution Counsel",
                    document_name => state.document.name,
                };
                tmpl.render(context)
            })
        })
        .map(axum::response::Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            axum::response::Html(format!("Internal Server Error: {}", e))
        })
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_json(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(json)).await,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            Ok(())
        }
    }
}

// One chat session per connection: concurrent browser tabs each get their
// own history instead of bleeding into a process-wide log.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("New chat client connected");
    let relay = Relay::new(
        state.client.clone(),
        state.model.clone(),
        state.document.clone(),
        ChatSession::new(SYSTEM_PROMPT),
    );

    let welcome = ServerMessage::Info {
        message: "connected".to_string(),
    };
    if send_json(&mut socket, &welcome).await.is_err() {
        warn!("Failed to send welcome message to new chat client");
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let parsed: ClientMessage = match serde_json::from_str(&text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Unrecognized client message: {} - Error: {}", text, e);
                        continue;
                    }
                };
                match parsed {
                    ClientMessage::Chat { text } => {
                        let mut events = relay.submit(text).await;
                        while let Some(event) = events.recv().await {
                            let out = match event {
                                RelayEvent::Snapshot(text) => ServerMessage::Snapshot { text },
                                RelayEvent::Done(text) => ServerMessage::Done { text },
                                RelayEvent::Error(message) => ServerMessage::Error { message },
                            };
                            if send_json(&mut socket, &out).await.is_err() {
                                warn!("Chat client disconnected mid-reply");
                                return;
                            }
                        }
                    }
                    ClientMessage::Clear => {
                        // Resets only the rendered history in the browser;
                        // the session log keeps feeding the next request.
                        if send_json(&mut socket, &ServerMessage::Cleared).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Message::Close(_) => {
                info!("Client requested WebSocket close");
                break;
            }
            _ => {}
        }
    }
    info!("Chat client disconnected");
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(
    port: u16,
    client: Arc<GeminiClient>,
    document: Arc<DocumentHandle>,
    model: String,
) -> Result<()> {
    let state = AppState::new(client, document, model)?;
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
