use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::{
    domain::{Command, FocusRequest, PanelStatus},
    error::{ApiError, ErrorCode},
    protocol::{ClientRequest, DispatchBody, ServerEvent},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod dispatcher;
mod publisher;

use app_state::AppState;
use config::load_settings;
use dispatcher::CommandDispatcher;
use publisher::FocusPublisher;

const REPLY_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(default)]
    subscriber: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .init();

    let dispatcher = CommandDispatcher::new(FocusPublisher::new(settings.event_buffer));
    let app = build_router(Arc::new(AppState { dispatcher }));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, event_buffer = settings.event_buffer, "focus relay listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/dispatch", post(http_dispatch))
        .route("/commands/:command", post(http_dispatch_command))
        .route("/panel", get(http_panel_status))
        .route("/panel/hide", post(http_hide_panel))
        .route("/ws", get(ws_handler))
        .fallback(not_found)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn not_found() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new(ErrorCode::NotFound, "no such route")),
    )
}

// A missing or unparsable body leaves the flag unset.
async fn http_dispatch(
    State(state): State<Arc<AppState>>,
    body: Option<Json<DispatchBody>>,
) -> Json<FocusRequest> {
    let preserve_focus = body.and_then(|Json(body)| body.preserve_focus);
    Json(state.dispatcher.dispatch(preserve_focus).await)
}

async fn http_dispatch_command(
    State(state): State<Arc<AppState>>,
    Path(command): Path<String>,
    body: Option<Json<DispatchBody>>,
) -> Result<Json<FocusRequest>, (StatusCode, Json<ApiError>)> {
    let command = command
        .parse::<Command>()
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(ApiError::from(e))))?;
    let preserve_focus = body.and_then(|Json(body)| body.preserve_focus);
    Ok(Json(
        state
            .dispatcher
            .dispatch_command(command, preserve_focus)
            .await,
    ))
}

async fn http_panel_status(State(state): State<Arc<AppState>>) -> Json<PanelStatus> {
    Json(state.dispatcher.status().await)
}

async fn http_hide_panel(State(state): State<Arc<AppState>>) -> StatusCode {
    state.dispatcher.hide().await;
    StatusCode::NO_CONTENT
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> impl IntoResponse {
    let subscriber = q.subscriber.unwrap_or_else(|| "anonymous".to_string());
    ws.on_upgrade(move |socket| ws_connection(state, socket, subscriber))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, subscriber: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.dispatcher.publisher().subscribe());
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerEvent>(REPLY_QUEUE_CAPACITY);
    info!(
        %subscriber,
        subscribers = state.dispatcher.publisher().subscriber_count(),
        "event stream opened"
    );

    let send_subscriber = subscriber.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                next = events.next() => match next {
                    Some(Ok(event)) => event,
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        warn!(
                            subscriber = %send_subscriber,
                            skipped,
                            "subscriber lagged; notifications dropped"
                        );
                        continue;
                    }
                    None => break,
                },
                Some(reply) = reply_rx.recv() => reply,
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        match serde_json::from_str::<ClientRequest>(&text) {
            Ok(request) => handle_client_request(&state.dispatcher, request).await,
            Err(err) => {
                debug!(%subscriber, %err, "rejected malformed client request");
                let reply = ServerEvent::Error(ApiError::validation(format!(
                    "invalid client request: {err}"
                )));
                if !queue_reply(&reply_tx, reply) {
                    debug!(%subscriber, "reply queue full; error reply dropped");
                }
            }
        }
    }

    send_task.abort();
    info!(%subscriber, "event stream closed");
}

/// A peer that stops reading loses its replies instead of growing the queue.
fn queue_reply(reply_tx: &mpsc::Sender<ServerEvent>, reply: ServerEvent) -> bool {
    reply_tx.try_send(reply).is_ok()
}

async fn handle_client_request(dispatcher: &CommandDispatcher, request: ClientRequest) {
    match request {
        ClientRequest::DispatchCommand {
            command,
            preserve_focus,
        } => {
            dispatcher.dispatch_command(command, preserve_focus).await;
        }
        ClientRequest::HidePanel => dispatcher.hide().await,
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
