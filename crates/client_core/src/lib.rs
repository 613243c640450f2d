use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    domain::{Command, FocusRequest, PanelStatus},
    error::{ApiError, ErrorCode},
    protocol::{DispatchBody, ServerEvent},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

pub mod error;
pub mod panel;

pub use error::{ClientError, Result};
pub use panel::{FocusOwner, PanelHost, PanelNotification, PanelTransition};

const CLIENT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    FocusRequested(FocusRequest),
    PanelHidden,
    /// An error the server pushed down the event stream.
    Server(ApiError),
    Error(String),
    Disconnected,
}

impl ClientEvent {
    pub fn panel_notification(&self) -> Option<PanelNotification> {
        match self {
            ClientEvent::FocusRequested(request) => {
                Some(PanelNotification::Reveal(request.clone()))
            }
            ClientEvent::PanelHidden => Some(PanelNotification::Hidden),
            _ => None,
        }
    }
}

impl From<ServerEvent> for ClientEvent {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::FocusInputRequested { request } => ClientEvent::FocusRequested(request),
            ServerEvent::PanelHidden => ClientEvent::PanelHidden,
            ServerEvent::Error(error) => ClientEvent::Server(error),
        }
    }
}

#[async_trait]
pub trait ClientHandle: Send + Sync {
    async fn connect(&self, subscriber: &str) -> Result<()>;
    async fn dispatch(&self, preserve_focus: Option<bool>) -> Result<FocusRequest>;
    async fn dispatch_command(
        &self,
        command: Command,
        preserve_focus: Option<bool>,
    ) -> Result<FocusRequest>;
    async fn hide_panel(&self) -> Result<()>;
    async fn panel_status(&self) -> Result<PanelStatus>;
    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent>;
}

pub struct FocusClient {
    http: Client,
    server_url: Url,
    reader: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl FocusClient {
    pub fn new(server_url: &str) -> Result<Arc<Self>> {
        let server_url = parse_server_url(server_url)?;
        let (events, _) = broadcast::channel(CLIENT_EVENT_CAPACITY);
        Ok(Arc::new(Self {
            http: Client::new(),
            server_url,
            reader: Mutex::new(None),
            events,
        }))
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    pub async fn is_connected(&self) -> bool {
        self.reader
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub async fn disconnect(&self) {
        if let Some(task) = self.reader.lock().await.take() {
            task.abort();
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.server_url.clone();
        url.set_path(&format!("{}{path}", url.path().trim_end_matches('/')));
        url
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &DispatchBody) -> Result<T> {
        let url = self.endpoint(path);
        let response = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|source| http_error(&url, source))?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|source| http_error(&url, source))
    }
}

fn parse_server_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|source| ClientError::InvalidServerUrl {
        url: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClientError::UnsupportedScheme(other.to_string())),
    }
}

/// Maps `http(s)://host/base` to `ws(s)://host/base/ws?subscriber=name`.
pub fn event_stream_url(server_url: &Url, subscriber: &str) -> Result<Url> {
    let scheme = match server_url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(ClientError::UnsupportedScheme(other.to_string())),
    };
    let mut url = server_url.clone();
    url.set_scheme(scheme)
        .map_err(|()| ClientError::UnsupportedScheme(server_url.scheme().to_string()))?;
    url.set_path(&format!("{}/ws", server_url.path().trim_end_matches('/')));
    url.set_query(None);
    url.query_pairs_mut().append_pair("subscriber", subscriber);
    Ok(url)
}

fn http_error(url: &Url, source: reqwest::Error) -> ClientError {
    ClientError::Http {
        url: url.to_string(),
        source,
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ApiError>(&text).unwrap_or_else(|_| {
        ApiError::new(
            ErrorCode::Internal,
            if text.is_empty() {
                status.to_string()
            } else {
                text
            },
        )
    });
    Err(ClientError::Api {
        status: status.as_u16(),
        error,
    })
}

#[async_trait]
impl ClientHandle for Arc<FocusClient> {
    async fn connect(&self, subscriber: &str) -> Result<()> {
        let mut reader = self.reader.lock().await;
        if reader.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }

        let ws_url = event_stream_url(&self.server_url, subscriber)?;
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|source| ClientError::Connect {
                url: ws_url.to_string(),
                source: Box::new(source),
            })?;
        info!(%ws_url, "subscribed to panel events");
        let (_, mut ws_reader) = ws_stream.split();

        let events = self.events.clone();
        *reader = Some(tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            debug!(?event, "received server event");
                            let _ = events.send(ClientEvent::from(event));
                        }
                        Err(err) => {
                            let _ = events
                                .send(ClientEvent::Error(format!("invalid server event: {err}")));
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, "event stream receive failed");
                        let _ = events.send(ClientEvent::Error(format!(
                            "websocket receive failed: {err}"
                        )));
                        break;
                    }
                }
            }
            let _ = events.send(ClientEvent::Disconnected);
        }));

        Ok(())
    }

    async fn dispatch(&self, preserve_focus: Option<bool>) -> Result<FocusRequest> {
        self.post("/dispatch", &DispatchBody { preserve_focus }).await
    }

    async fn dispatch_command(
        &self,
        command: Command,
        preserve_focus: Option<bool>,
    ) -> Result<FocusRequest> {
        self.post(
            &format!("/commands/{}", command.as_str()),
            &DispatchBody { preserve_focus },
        )
        .await
    }

    async fn hide_panel(&self) -> Result<()> {
        let url = self.endpoint("/panel/hide");
        let response = self
            .http
            .post(url.clone())
            .send()
            .await
            .map_err(|source| http_error(&url, source))?;
        check_status(response).await?;
        Ok(())
    }

    async fn panel_status(&self) -> Result<PanelStatus> {
        let url = self.endpoint("/panel");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| http_error(&url, source))?;
        check_status(response)
            .await?
            .json::<PanelStatus>()
            .await
            .map_err(|source| http_error(&url, source))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
