//! Single-flight token refresh
//!
//! The first authentication failure starts a refresh and marks the coordinator
//! busy; every failure (the first included) parks a one-shot resolver in the
//! pending queue. When the refresh finishes the queue is drained exactly once:
//! each parked caller receives the new token, or [`ClientError::SessionTerminated`]
//! if the refresh failed.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::session::CredentialStore;

/// Obtains a new access token from the backend
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<String>;
}

/// Told when the session has been terminated by a failed refresh
#[cfg_attr(test, mockall::automock)]
pub trait SessionTerminationHandler: Send + Sync {
    fn session_terminated(&self);
}

type Waiter = oneshot::Sender<Result<String>>;

#[derive(Default)]
struct RefreshState {
    is_refreshing: bool,
    pending: Vec<Waiter>,
    refreshes_started: u64,
}

/// Clears the busy flag even if the refresh task unwinds
struct BusyGuard<'a> {
    state: &'a Mutex<RefreshState>,
    finished: bool,
}

impl BusyGuard<'_> {
    fn finish(mut self) -> Vec<Waiter> {
        self.finished = true;
        let mut state = lock(self.state);
        state.is_refreshing = false;
        std::mem::take(&mut state.pending)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = lock(self.state);
            state.is_refreshing = false;
            // Dropping the senders rejects the parked callers.
            state.pending.clear();
        }
    }
}

fn lock(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serializes credential refreshes and replays parked requests
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    credentials: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    termination: Arc<dyn SessionTerminationHandler>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("is_refreshing", &self.is_refreshing())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(
        credentials: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        termination: Arc<dyn SessionTerminationHandler>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::default()),
            credentials,
            refresher,
            termination,
        }
    }

    /// Park the failed operation and make sure a refresh is running.
    ///
    /// The busy flag and the queue entry are recorded before this returns, so
    /// concurrent failures observed afterwards always join the same refresh.
    /// The returned future resolves with the token to replay the operation
    /// with.
    pub fn on_auth_failure(self: &Arc<Self>) -> impl Future<Output = Result<String>> + Send {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut state = lock(&self.state);
            state.pending.push(tx);
            if state.is_refreshing {
                debug!(
                    "Refresh already in flight, parking request ({} waiting)",
                    state.pending.len()
                );
                false
            } else {
                state.is_refreshing = true;
                state.refreshes_started += 1;
                true
            }
        };

        if start {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                coordinator.run_refresh().await;
            });
        }

        async move { rx.await.unwrap_or(Err(ClientError::SessionTerminated)) }
    }

    async fn run_refresh(&self) {
        let guard = BusyGuard {
            state: &self.state,
            finished: false,
        };

        info!("Refreshing access token");
        let outcome = match self.refresher.refresh().await {
            Ok(token) => self.credentials.update_token(token.clone()).map(|()| token),
            Err(e) => Err(e),
        };

        let waiters = guard.finish();
        match outcome {
            Ok(token) => {
                info!(
                    "Access token refreshed, replaying {} parked request(s)",
                    waiters.len()
                );
                for waiter in waiters {
                    let _ = waiter.send(Ok(token.clone()));
                }
            }
            Err(e) => {
                warn!("Token refresh failed, terminating session: {}", e);
                if let Err(e) = self.credentials.clear() {
                    warn!("Failed to clear persisted credentials: {}", e);
                }
                for waiter in waiters {
                    let _ = waiter.send(Err(ClientError::SessionTerminated));
                }
                self.termination.session_terminated();
            }
        }
    }

    pub fn is_refreshing(&self) -> bool {
        lock(&self.state).is_refreshing
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Number of refreshes started since creation
    pub fn refreshes_started(&self) -> u64 {
        lock(&self.state).refreshes_started
    }
}
