//! Transport abstractions for testability
//!
//! The dispatcher talks to the backend through these traits. Production code
//! uses [`ReqwestHttpTransport`] and [`crate::ws::WsStreamTransport`]; tests
//! substitute mocks.

use async_trait::async_trait;
use serde_json::Value;

/// A GraphQL request over HTTP
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub body: Value,
    /// Bearer credential for the `Authorization` header
    pub bearer: Option<String>,
}

/// HTTP response from a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Request/response transport
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpTransport: Send + Sync {
    /// POST a JSON body and return the raw response
    async fn post(&self, request: HttpRequest) -> crate::Result<HttpResponse>;
}

/// Production HTTP transport using reqwest
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
}

impl Default for ReqwestHttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestHttpTransport {
    /// Create a transport that keeps cookies between requests, so a refresh
    /// cookie issued at login is sent back on token refresh.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn post(&self, request: HttpRequest) -> crate::Result<HttpResponse> {
        tracing::debug!("POST {}", request.url);
        let mut builder = self.client.post(&request.url).json(&request.body);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            crate::ClientError::Http(format!("POST {} failed: {}", request.url, e))
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| crate::ClientError::Http(format!("Reading response body: {}", e)))?;

        tracing::debug!("POST {} -> {} ({} bytes)", request.url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}

/// A streaming subscription request
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub url: String,
    /// `{query, operationName, variables}` payload of the subscribe message
    pub payload: Value,
    /// Credential sent in the connection handshake
    pub bearer: Option<String>,
}

/// An open server-push stream
#[async_trait]
pub trait MessageStream: Send {
    /// Next `data` payload; `None` once the server completes the stream
    async fn next_message(&mut self) -> Option<crate::Result<Value>>;

    /// Tell the server to stop and close the connection
    async fn close(&mut self) -> crate::Result<()>;
}

/// Streaming transport
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait StreamTransport: Send + Sync {
    /// Open a subscription. Returns once the server has accepted it.
    async fn open(&self, request: StreamRequest) -> crate::Result<Box<dyn MessageStream>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A URL that will always refuse connections (port 1 is reserved and unbound)
    const UNREACHABLE_URL: &str = "http://127.0.0.1:1/graphql";

    #[tokio::test]
    async fn post_connection_refused_returns_http_error() {
        let transport = ReqwestHttpTransport::new();
        let err = transport
            .post(HttpRequest {
                url: UNREACHABLE_URL.to_string(),
                body: json!({"query": "{ throttle }"}),
                bearer: Some("tok".to_string()),
            })
            .await
            .unwrap_err();

        match &err {
            crate::ClientError::Http(msg) => {
                assert!(
                    msg.starts_with("POST http://127.0.0.1:1/graphql failed:"),
                    "{msg}"
                );
            }
            other => panic!("expected ClientError::Http, got {other:?}"),
        }
    }
}
