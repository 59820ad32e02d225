//! Sensor feed: keeps the live subscription open and drives the view-state

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hm_client::ClientError;

use crate::api::MonitorApi;
use crate::config::FeedConfig;
use crate::error::{MonitorError, Result};
use crate::view_state::{LiveSensorView, ViewEvent};

/// Why the feed stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedExit {
    Cancelled,
    SessionTerminated,
    RetriesExhausted,
}

/// How one subscription ended
enum StreamEnd {
    /// Server completed the subscription
    Completed,
    /// The stream reported an expired credential
    CredentialExpired,
    Failed(MonitorError),
}

/// Reconnect bookkeeping, reset by every accepted push
#[derive(Debug, Default)]
struct Retry {
    failures: u32,
    /// An immediate renew-and-resubscribe was already spent
    renewed: bool,
}

pub struct Feed {
    api: Arc<dyn MonitorApi>,
    view: LiveSensorView,
    reconnect_interval: Duration,
    max_reconnect_attempts: Option<u32>,
    cancel: CancellationToken,
}

impl Feed {
    pub fn new(
        api: Arc<dyn MonitorApi>,
        view: LiveSensorView,
        config: &FeedConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            view,
            reconnect_interval: config.reconnect_interval(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            cancel,
        }
    }

    pub fn view(&self) -> &LiveSensorView {
        &self.view
    }

    /// Subscribe and forward pushes until cancelled, the session ends, or the
    /// retry limit is reached.
    pub async fn run(&self) -> FeedExit {
        let mut retry = Retry::default();

        loop {
            self.view.apply(ViewEvent::Connect);

            let end = tokio::select! {
                _ = self.cancel.cancelled() => return self.stop(FeedExit::Cancelled),
                end = self.stream_once(&mut retry) => end,
            };

            match end {
                StreamEnd::Completed => {
                    info!("Sensor subscription completed by server");
                    self.view.apply(ViewEvent::Disconnect);
                }
                StreamEnd::CredentialExpired if !retry.renewed => {
                    debug!("Sensor stream credential expired, renewing before resubscribing");
                    retry.renewed = true;
                    retry.failures += 1;
                    let resubscribe_now = match self.api.renew_credential().await {
                        Ok(()) => true,
                        Err(e) if e.is_session_terminated() => {
                            return self.stop(FeedExit::SessionTerminated)
                        }
                        Err(e) => {
                            self.view.apply(ViewEvent::StreamError(e.to_string()));
                            false
                        }
                    };
                    if self.exhausted(retry.failures) {
                        return self.give_up(retry.failures);
                    }
                    if resubscribe_now {
                        continue;
                    }
                }
                StreamEnd::CredentialExpired => {
                    // Already renewed once without a push getting through.
                    self.view.apply(ViewEvent::StreamError(
                        "sensor stream rejected the renewed credential".to_string(),
                    ));
                    retry.failures += 1;
                    if self.exhausted(retry.failures) {
                        return self.give_up(retry.failures);
                    }
                }
                StreamEnd::Failed(e) if e.is_session_terminated() => {
                    return self.stop(FeedExit::SessionTerminated)
                }
                StreamEnd::Failed(e) => {
                    self.view.apply(ViewEvent::StreamError(e.to_string()));
                    retry.failures += 1;
                    if self.exhausted(retry.failures) {
                        return self.give_up(retry.failures);
                    }
                }
            }

            debug!(
                "Resubscribing in {:?} (attempt {})",
                self.reconnect_interval,
                retry.failures + 1
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return self.stop(FeedExit::Cancelled),
                _ = tokio::time::sleep(self.reconnect_interval) => {}
            }
        }
    }

    async fn stream_once(&self, retry: &mut Retry) -> StreamEnd {
        let mut subscription = match self.api.subscribe_sensor_data().await {
            Ok(s) => s,
            Err(e) => return classify(e),
        };
        info!("Subscribed to '{}'", subscription.name());

        while let Some(message) = subscription.next().await {
            match message {
                Ok(data) => {
                    if self.view.apply(ViewEvent::Message(data)) {
                        *retry = Retry::default();
                    }
                }
                Err(e) => return classify(e.into()),
            }
        }
        StreamEnd::Completed
    }

    fn exhausted(&self, failures: u32) -> bool {
        self.max_reconnect_attempts.is_some_and(|max| failures > max)
    }

    fn give_up(&self, failures: u32) -> FeedExit {
        warn!(
            "Sensor feed failed {} time(s), giving up on reconnecting",
            failures
        );
        FeedExit::RetriesExhausted
    }

    fn stop(&self, exit: FeedExit) -> FeedExit {
        info!("Sensor feed stopped: {:?}", exit);
        self.view.apply(ViewEvent::Disconnect);
        exit
    }
}

fn classify(e: MonitorError) -> StreamEnd {
    match e {
        MonitorError::Client(ClientError::AuthExpired) => StreamEnd::CredentialExpired,
        other => StreamEnd::Failed(other),
    }
}

/// Run the feed on its own task
pub fn spawn(feed: Feed) -> tokio::task::JoinHandle<FeedExit> {
    tokio::spawn(async move { feed.run().await })
}

/// Convenience for callers that only care whether the feed ended cleanly
pub fn exit_to_result(exit: FeedExit) -> Result<()> {
    match exit {
        FeedExit::Cancelled => Ok(()),
        FeedExit::SessionTerminated => Err(ClientError::SessionTerminated.into()),
        FeedExit::RetriesExhausted => Err(MonitorError::Client(ClientError::Stream(
            "sensor feed gave up reconnecting".to_string(),
        ))),
    }
}
