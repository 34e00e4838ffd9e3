//! Frame transports for the session connection.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};

use crate::config::SessionConfig;
use crate::error::ConduitError;
use crate::util::with_timeout;

type SessionWebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected, bidirectional stream of text frames.
#[async_trait]
pub trait FrameTransport: Send {
    async fn send(&mut self, frame: String) -> Result<(), ConduitError>;

    /// Next inbound text frame. `None` means the peer closed the stream.
    async fn receive(&mut self) -> Option<Result<String, ConduitError>>;

    /// Keepalive probe, sent on the heartbeat interval.
    async fn heartbeat(&mut self) -> Result<(), ConduitError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConduitError>;
}

/// Opens new transports; called once per (re)connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FrameTransport>, ConduitError>;
}

/// WebSocket connector authenticating with a bearer token.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    token: Option<String>,
    workspace: Option<String>,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            workspace: None,
            connect_timeout: Duration::from_millis(crate::config::DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self, ConduitError> {
        let url = config
            .url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConduitError::Configuration("session.url is not set".into()))?;
        let mut connector = Self::new(url).with_connect_timeout(config.connect_timeout());
        connector.token = config.token.clone();
        connector.workspace = config.workspace.clone();
        Ok(connector)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The URL actually dialed, with the workspace reference appended.
    pub fn endpoint(&self) -> Result<String, ConduitError> {
        let trimmed = self.url.trim();
        if trimmed.is_empty() {
            return Err(ConduitError::Configuration(
                "Session websocket URL cannot be empty".into(),
            ));
        }
        let Some(workspace) = &self.workspace else {
            return Ok(trimmed.to_string());
        };
        let mut url = reqwest::Url::parse(trimmed).map_err(|error| {
            ConduitError::Configuration(format!("Invalid session websocket URL: {error}"))
        })?;
        url.query_pairs_mut().append_pair("workspace", workspace);
        Ok(url.into())
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn FrameTransport>, ConduitError> {
        let endpoint = self.endpoint()?;
        let mut request = endpoint.as_str().into_client_request().map_err(|error| {
            ConduitError::Configuration(format!("Invalid session websocket URL: {error}"))
        })?;
        if let Some(token) = &self.token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|error| {
                ConduitError::Configuration(format!("Invalid session auth header: {error}"))
            })?;
            request.headers_mut().insert("Authorization", auth_value);
        }

        let socket = with_timeout(self.connect_timeout, async {
            connect_async(request)
                .await
                .map(|(socket, _)| socket)
                .map_err(map_connect_error)
        })
        .await?;
        tracing::debug!(url = %self.url, "session websocket connected");
        Ok(Box::new(WebSocketTransport { socket }))
    }
}

struct WebSocketTransport {
    socket: SessionWebSocket,
}

#[async_trait]
impl FrameTransport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), ConduitError> {
        self.socket
            .send(Message::Text(frame.into()))
            .await
            .map_err(|error| ConduitError::Transport(format!("Session send failed: {error}")))
    }

    async fn receive(&mut self) -> Option<Result<String, ConduitError>> {
        loop {
            let message = match self.socket.next().await? {
                Ok(message) => message,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(error) => {
                    return Some(Err(ConduitError::Transport(format!(
                        "Session websocket receive failed: {error}"
                    ))))
                }
            };
            match message {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::debug!("ignoring non-UTF-8 binary frame"),
                },
                Message::Ping(payload) => {
                    if let Err(error) = self.socket.send(Message::Pong(payload)).await {
                        return Some(Err(ConduitError::Transport(format!(
                            "Session pong failed: {error}"
                        ))));
                    }
                }
                Message::Pong(_) | Message::Frame(_) => {}
                Message::Close(_) => return None,
            }
        }
    }

    async fn heartbeat(&mut self) -> Result<(), ConduitError> {
        self.socket
            .send(Message::Ping(Default::default()))
            .await
            .map_err(|error| ConduitError::Transport(format!("Session heartbeat failed: {error}")))
    }

    async fn close(&mut self) -> Result<(), ConduitError> {
        match self.socket.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(error) => Err(ConduitError::Transport(format!(
                "Session close failed: {error}"
            ))),
        }
    }
}

fn map_connect_error(error: WsError) -> ConduitError {
    match error {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            if matches!(status, 401 | 403) {
                ConduitError::Authentication(format!(
                    "Session websocket authentication failed with status {status}"
                ))
            } else {
                ConduitError::api(
                    status,
                    format!("Session websocket handshake failed with status {status}"),
                )
            }
        }
        WsError::Io(error) => ConduitError::Io(error),
        WsError::Url(error) => {
            ConduitError::Configuration(format!("Invalid session websocket URL: {error}"))
        }
        other => ConduitError::Transport(format!("Session websocket connect failed: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_is_appended_as_query() {
        let connector = WebSocketConnector::new("wss://agent.example/ws").with_workspace("ws-42");
        assert_eq!(
            connector.endpoint().unwrap(),
            "wss://agent.example/ws?workspace=ws-42"
        );

        let with_query =
            WebSocketConnector::new("wss://agent.example/ws?v=2").with_workspace("ws-42");
        assert_eq!(
            with_query.endpoint().unwrap(),
            "wss://agent.example/ws?v=2&workspace=ws-42"
        );
    }

    #[test]
    fn workspace_reference_is_percent_encoded() {
        let connector =
            WebSocketConnector::new("wss://agent.example/ws").with_workspace("team a&b#1");
        let endpoint = connector.endpoint().unwrap();
        assert_eq!(endpoint, "wss://agent.example/ws?workspace=team+a%26b%231");

        let parsed = reqwest::Url::parse(&endpoint).unwrap();
        let pairs: Vec<_> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("workspace".to_string(), "team a&b#1".to_string())]);
        assert_eq!(parsed.fragment(), None);
    }

    #[test]
    fn malformed_url_with_workspace_is_a_configuration_error() {
        let connector = WebSocketConnector::new("not a url").with_workspace("ws-1");
        assert!(matches!(
            connector.endpoint(),
            Err(ConduitError::Configuration(_))
        ));
    }

    #[test]
    fn missing_url_is_a_configuration_error() {
        let err = WebSocketConnector::from_config(&SessionConfig::default()).unwrap_err();
        assert!(matches!(err, ConduitError::Configuration(_)));
    }
}
