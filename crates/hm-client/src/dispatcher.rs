//! Request dispatcher: routes operations to a transport and attaches the credential

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::io::{HttpRequest, HttpTransport, MessageStream, StreamRequest, StreamTransport};
use crate::operation::{GraphQlResponse, Operation, OperationKind};
use crate::session::CredentialStore;

/// Backend endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub http_url: String,
    pub ws_url: String,
}

/// Transport an operation is sent over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    RequestResponse,
    Streaming,
}

impl Route {
    /// Subscriptions stream; everything else is request/response
    pub fn for_kind(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Subscription => Route::Streaming,
            OperationKind::Query | OperationKind::Mutation => Route::RequestResponse,
        }
    }
}

/// An accepted subscription
pub struct Subscription {
    name: String,
    stream: Box<dyn MessageStream>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .finish()
    }
}

impl Subscription {
    pub fn new(name: impl Into<String>, stream: Box<dyn MessageStream>) -> Self {
        Self {
            name: name.into(),
            stream,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next pushed `data` value; `None` once the server completes
    pub async fn next(&mut self) -> Option<Result<Value>> {
        self.stream.next_message().await
    }

    pub async fn close(mut self) -> Result<()> {
        debug!("Closing subscription '{}'", self.name);
        self.stream.close().await
    }
}

/// Result of dispatching an operation
#[derive(Debug)]
pub enum Dispatched {
    Response(Value),
    Stream(Subscription),
}

/// Sends operations over the right transport with the current credential
#[derive(Clone)]
pub struct Dispatcher {
    endpoints: Endpoints,
    http: Arc<dyn HttpTransport>,
    stream: Arc<dyn StreamTransport>,
    credentials: Arc<CredentialStore>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        endpoints: Endpoints,
        http: Arc<dyn HttpTransport>,
        stream: Arc<dyn StreamTransport>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            endpoints,
            http,
            stream,
            credentials,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Dispatch with whatever token the credential store currently holds
    pub async fn dispatch(&self, operation: &Operation) -> Result<Dispatched> {
        let token = self.credentials.access_token();
        self.dispatch_with_token(operation, token).await
    }

    /// Dispatch with an explicit token (used when replaying after a refresh)
    pub async fn dispatch_with_token(
        &self,
        operation: &Operation,
        token: Option<String>,
    ) -> Result<Dispatched> {
        match Route::for_kind(operation.kind) {
            Route::RequestResponse => self.execute(operation, token).await.map(Dispatched::Response),
            Route::Streaming => self.open_stream(operation, token).await.map(Dispatched::Stream),
        }
    }

    /// Run a query or mutation over HTTP
    pub async fn execute(&self, operation: &Operation, token: Option<String>) -> Result<Value> {
        if Route::for_kind(operation.kind) != Route::RequestResponse {
            return Err(ClientError::InvalidOperation(format!(
                "{} cannot be sent over request/response",
                operation.kind
            )));
        }

        debug!(
            "Dispatching {} '{}' over HTTP (authenticated={})",
            operation.kind,
            display_name(operation),
            token.is_some()
        );
        let response = self
            .http
            .post(HttpRequest {
                url: self.endpoints.http_url.clone(),
                body: serde_json::to_value(operation.payload())?,
                bearer: token,
            })
            .await?;

        if response.status == 401 {
            return Err(ClientError::AuthExpired);
        }

        match serde_json::from_str::<GraphQlResponse>(&response.body) {
            Ok(envelope) => envelope.into_result(),
            Err(e) if (200..300).contains(&response.status) => Err(e.into()),
            Err(_) => Err(ClientError::Http(format!(
                "unexpected status {}: {}",
                response.status, response.body
            ))),
        }
    }

    /// Open a subscription on the streaming transport
    pub async fn open_stream(
        &self,
        operation: &Operation,
        token: Option<String>,
    ) -> Result<Subscription> {
        if Route::for_kind(operation.kind) != Route::Streaming {
            return Err(ClientError::InvalidOperation(format!(
                "{} cannot be sent over the stream",
                operation.kind
            )));
        }

        let name = display_name(operation).to_string();
        debug!(
            "Dispatching subscription '{}' over stream (authenticated={})",
            name,
            token.is_some()
        );
        let stream = self
            .stream
            .open(StreamRequest {
                url: self.endpoints.ws_url.clone(),
                payload: serde_json::to_value(operation.payload())?,
                bearer: token,
            })
            .await?;
        Ok(Subscription::new(name, stream))
    }
}

fn display_name(operation: &Operation) -> &str {
    operation.operation_name.as_deref().unwrap_or("<anonymous>")
}
