//! GraphQL client: dispatcher plus refresh-and-replay on expired credentials

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::dispatcher::{Dispatched, Dispatcher, Route, Subscription};
use crate::error::{ClientError, Result};
use crate::operation::Operation;
use crate::refresh::RefreshCoordinator;
use crate::session::CredentialStore;

/// Authenticated GraphQL client.
///
/// An operation that fails with [`ClientError::AuthExpired`] is parked with the
/// [`RefreshCoordinator`] and replayed once with the refreshed token. A second
/// authentication failure on the replay is returned to the caller.
#[derive(Debug, Clone)]
pub struct GraphQlClient {
    dispatcher: Dispatcher,
    coordinator: Arc<RefreshCoordinator>,
}

impl GraphQlClient {
    pub fn new(dispatcher: Dispatcher, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            dispatcher,
            coordinator,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        self.dispatcher.credentials()
    }

    /// Route the operation by kind and dispatch it
    pub async fn dispatch(&self, operation: &Operation) -> Result<Dispatched> {
        match Route::for_kind(operation.kind) {
            Route::RequestResponse => self.execute(operation).await.map(Dispatched::Response),
            Route::Streaming => self.subscribe(operation).await.map(Dispatched::Stream),
        }
    }

    /// Run a query or mutation with the current credential
    pub async fn execute(&self, operation: &Operation) -> Result<Value> {
        let token = self.credentials().access_token();
        match self.dispatcher.execute(operation, token.clone()).await {
            Err(ClientError::AuthExpired) => {
                let token = self.replacement_token(token.as_deref()).await?;
                self.dispatcher.execute(operation, Some(token)).await
            }
            other => other,
        }
    }

    /// Run a query or mutation without any credential (login, public queries)
    pub async fn execute_anonymous(&self, operation: &Operation) -> Result<Value> {
        self.dispatcher.execute(operation, None).await
    }

    /// Open a subscription with the current credential
    pub async fn subscribe(&self, operation: &Operation) -> Result<Subscription> {
        let token = self.credentials().access_token();
        match self.dispatcher.open_stream(operation, token.clone()).await {
            Err(ClientError::AuthExpired) => {
                let token = self.replacement_token(token.as_deref()).await?;
                self.dispatcher.open_stream(operation, Some(token)).await
            }
            other => other,
        }
    }

    /// Token to replay with after `sent` was rejected. If another request
    /// already stored a newer token, that one is used without a new refresh.
    async fn replacement_token(&self, sent: Option<&str>) -> Result<String> {
        match self.credentials().access_token() {
            Some(current) if sent != Some(current.as_str()) => {
                debug!("Credential was refreshed while the request was in flight, replaying");
                Ok(current)
            }
            _ => {
                debug!("Credential expired, waiting for refresh before replay");
                self.coordinator.on_auth_failure().await
            }
        }
    }

    /// Refresh the credential after an open stream reported it expired.
    /// Resolves with the new token, or fails if the session was terminated.
    pub async fn renew_credential(&self) -> Result<String> {
        self.coordinator.on_auth_failure().await
    }
}
