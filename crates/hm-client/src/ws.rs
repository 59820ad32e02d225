//! `graphql-transport-ws` streaming transport over tokio-tungstenite
//!
//! Handshake: `connection_init` (carrying the credential) → `connection_ack`,
//! then a single `subscribe` with id `"1"`. The server pushes `next` messages
//! until `complete`, `error`, or a close frame.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::io::{MessageStream, StreamRequest, StreamTransport};
use crate::operation::{errors_to_result, GraphQlError, GraphQlResponse};

/// WebSocket subprotocol name
pub const GRAPHQL_TRANSPORT_WS: &str = "graphql-transport-ws";

/// Close code for a rejected credential
pub const CLOSE_UNAUTHORIZED: u16 = 4401;

/// Close code for a credential without permission
pub const CLOSE_FORBIDDEN: u16 = 4403;

const SUBSCRIPTION_ID: &str = "1";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Server → client protocol message
#[derive(Debug, Deserialize)]
struct ServerMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

/// Production streaming transport
#[derive(Debug, Default)]
pub struct WsStreamTransport;

impl WsStreamTransport {
    pub fn new() -> Self {
        Self
    }
}

/// `connection_init` payload carrying the credential, if any
pub fn connection_init_payload(bearer: Option<&str>) -> Value {
    match bearer {
        Some(token) => json!({ "Authorization": format!("Bearer {}", token) }),
        None => json!({}),
    }
}

fn close_error(frame: Option<&CloseFrame>) -> ClientError {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            if code == CLOSE_UNAUTHORIZED {
                ClientError::AuthExpired
            } else if code == CLOSE_FORBIDDEN {
                ClientError::Stream(format!("subscription forbidden: {}", &*frame.reason))
            } else {
                ClientError::Stream(format!("closed by server: {} {}", code, &*frame.reason))
            }
        }
        None => ClientError::Stream("closed by server".to_string()),
    }
}

fn is_normal_close(frame: Option<&CloseFrame>) -> bool {
    frame.is_none_or(|f| u16::from(f.code) == 1000)
}

/// Map the payload of a `next` message to its data
fn next_payload(payload: Option<Value>) -> Result<Value> {
    let response: GraphQlResponse = match payload {
        Some(value) => serde_json::from_value(value)?,
        None => GraphQlResponse::default(),
    };
    response.into_result()
}

/// Map the payload of an `error` message (an array of GraphQL errors)
fn error_payload(payload: Option<Value>) -> ClientError {
    let errors: Vec<GraphQlError> = payload
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default();
    match errors_to_result(&errors) {
        Err(e) => e,
        Ok(()) => ClientError::Stream("subscription rejected".to_string()),
    }
}

async fn send_json(socket: &mut Socket, value: Value) -> Result<()> {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .map_err(|e| ClientError::Stream(format!("send failed: {}", e)))
}

#[async_trait]
impl StreamTransport for WsStreamTransport {
    async fn open(&self, request: StreamRequest) -> Result<Box<dyn MessageStream>> {
        debug!("Opening stream to {}", request.url);
        let mut ws_request = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Stream(format!("invalid url {}: {}", request.url, e)))?;
        ws_request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(GRAPHQL_TRANSPORT_WS),
        );

        let (mut socket, _) = connect_async(ws_request)
            .await
            .map_err(|e| ClientError::Stream(format!("connect {} failed: {}", request.url, e)))?;

        send_json(
            &mut socket,
            json!({
                "type": "connection_init",
                "payload": connection_init_payload(request.bearer.as_deref()),
            }),
        )
        .await?;

        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let message: ServerMessage = serde_json::from_str(text.as_str())?;
                    match message.kind.as_str() {
                        "connection_ack" => break,
                        "ping" => send_json(&mut socket, json!({"type": "pong"})).await?,
                        other => debug!("Ignoring '{}' before connection_ack", other),
                    }
                }
                Some(Ok(Message::Close(frame))) => return Err(close_error(frame.as_ref())),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ClientError::Stream(e.to_string())),
                None => {
                    return Err(ClientError::Stream(
                        "connection closed before acknowledgement".to_string(),
                    ))
                }
            }
        }

        send_json(
            &mut socket,
            json!({
                "id": SUBSCRIPTION_ID,
                "type": "subscribe",
                "payload": request.payload,
            }),
        )
        .await?;

        debug!("Subscription started on {}", request.url);
        Ok(Box::new(WsMessageStream {
            socket,
            finished: false,
        }))
    }
}

/// An accepted subscription on an open socket
pub struct WsMessageStream {
    socket: Socket,
    finished: bool,
}

#[async_trait]
impl MessageStream for WsMessageStream {
    async fn next_message(&mut self) -> Option<Result<Value>> {
        if self.finished {
            return None;
        }
        loop {
            let frame = match self.socket.next().await {
                Some(frame) => frame,
                None => {
                    self.finished = true;
                    return Some(Err(ClientError::Stream("connection lost".to_string())));
                }
            };
            match frame {
                Ok(Message::Text(text)) => {
                    let message: ServerMessage = match serde_json::from_str(text.as_str()) {
                        Ok(message) => message,
                        Err(e) => return Some(Err(e.into())),
                    };
                    if message.id.as_deref().is_some_and(|id| id != SUBSCRIPTION_ID) {
                        continue;
                    }
                    match message.kind.as_str() {
                        "next" => return Some(next_payload(message.payload)),
                        "error" => {
                            self.finished = true;
                            return Some(Err(error_payload(message.payload)));
                        }
                        "complete" => {
                            self.finished = true;
                            return None;
                        }
                        "ping" => {
                            if let Err(e) = send_json(&mut self.socket, json!({"type": "pong"})).await
                            {
                                return Some(Err(e));
                            }
                        }
                        other => debug!("Ignoring '{}' message", other),
                    }
                }
                Ok(Message::Close(frame)) => {
                    self.finished = true;
                    if is_normal_close(frame.as_ref()) {
                        return None;
                    }
                    return Some(Err(close_error(frame.as_ref())));
                }
                Ok(_) => {}
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ClientError::Stream(e.to_string())));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.finished {
            self.finished = true;
            if let Err(e) =
                send_json(&mut self.socket, json!({"id": SUBSCRIPTION_ID, "type": "complete"})).await
            {
                warn!("Failed to send complete: {}", e);
            }
        }
        self.socket
            .close(None)
            .await
            .map_err(|e| ClientError::Stream(format!("close failed: {}", e)))
    }
}
