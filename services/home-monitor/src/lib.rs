//! Home Monitor - live sensor dashboard for an IoT monitoring backend
//!
//! Logs in against the GraphQL API, keeps the session across restarts,
//! follows the live sensor subscription and exposes the throttle control.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod navigation;
pub mod sensor;
pub mod throttle;
pub mod view_state;

pub use config::{load_config, Config};
pub use error::{MonitorError, Result};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hm_client::{
    CredentialStore, Dispatcher, FileKeyValueStore, GraphQlClient, HttpTransport, KeyValueStore,
    RefreshCoordinator, ReqwestHttpTransport, StreamTransport, WsStreamTransport,
};

use crate::api::{GraphQlApi, GraphQlTokenRefresher, MonitorApi};
use crate::auth::{AuthService, LoginInput};
use crate::feed::Feed;
use crate::navigation::{LoginRedirect, Navigator, Screen, WatchNavigator};
use crate::throttle::ThrottleControl;
use crate::view_state::{LiveSensorView, SensorViewState};

/// Everything the dashboard needs, wired together
pub struct HomeMonitor {
    config: Config,
    credentials: Arc<CredentialStore>,
    client: GraphQlClient,
    api: Arc<dyn MonitorApi>,
    auth: AuthService,
    throttle: ThrottleControl,
    navigator: Arc<WatchNavigator>,
    view: LiveSensorView,
}

impl std::fmt::Debug for HomeMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeMonitor")
            .field("config", &self.config)
            .field("credentials", &self.credentials)
            .field("screen", &self.navigator.current())
            .finish()
    }
}

impl HomeMonitor {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn client(&self) -> &GraphQlClient {
        &self.client
    }

    pub fn api(&self) -> &Arc<dyn MonitorApi> {
        &self.api
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn throttle(&self) -> &ThrottleControl {
        &self.throttle
    }

    pub fn navigator(&self) -> &Arc<WatchNavigator> {
        &self.navigator
    }

    pub fn view(&self) -> &LiveSensorView {
        &self.view
    }

    /// Feed task for the live view, stopped by `cancel`
    pub fn feed(&self, cancel: CancellationToken) -> Feed {
        Feed::new(
            Arc::clone(&self.api),
            self.view.clone(),
            &self.config.feed,
            cancel,
        )
    }
}

/// Builder for [`HomeMonitor`]; transports and storage default to the real ones
pub struct HomeMonitorBuilder {
    config: Config,
    storage: Option<Arc<dyn KeyValueStore>>,
    http: Option<Arc<dyn HttpTransport>>,
    stream: Option<Arc<dyn StreamTransport>>,
}

impl HomeMonitorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            storage: None,
            http: None,
            stream: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_http_transport(mut self, http: Arc<dyn HttpTransport>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_stream_transport(mut self, stream: Arc<dyn StreamTransport>) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn build(self) -> Result<HomeMonitor> {
        let storage = self.storage.unwrap_or_else(|| {
            debug!("Persisting session to {:?}", self.config.storage.path);
            Arc::new(FileKeyValueStore::new(self.config.storage.path.clone()))
        });
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpTransport::new()));
        let stream = self
            .stream
            .unwrap_or_else(|| Arc::new(WsStreamTransport::new()));

        let credentials = Arc::new(CredentialStore::load(storage)?);
        let navigator = Arc::new(WatchNavigator::new(Screen::for_session(
            credentials.is_authenticated(),
        )));

        let dispatcher = Dispatcher::new(
            self.config.api.endpoints(),
            http,
            stream,
            Arc::clone(&credentials),
        );
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&credentials),
            Arc::new(GraphQlTokenRefresher::new(dispatcher.clone())),
            Arc::new(LoginRedirect::new(Arc::clone(&navigator) as Arc<dyn Navigator>)),
        ));
        let client = GraphQlClient::new(dispatcher, coordinator);
        let api: Arc<dyn MonitorApi> = Arc::new(GraphQlApi::new(client.clone()));

        let auth = AuthService::new(
            Arc::clone(&api),
            Arc::clone(&credentials),
            Arc::clone(&navigator) as Arc<dyn Navigator>,
        );
        let throttle = ThrottleControl::new(Arc::clone(&api));

        Ok(HomeMonitor {
            config: self.config,
            credentials,
            client,
            api,
            auth,
            throttle,
            navigator,
            view: LiveSensorView::new(),
        })
    }
}

/// Run the dashboard: reuse or create a session, then follow the live feed
/// until ctrl-c or until the session ends.
pub async fn run(config: Config, login: Option<LoginInput>) -> Result<()> {
    let monitor = HomeMonitorBuilder::new(config).build()?;
    let auth = monitor.auth();

    if auth.is_authenticated() {
        if let Some(user) = auth.current_user() {
            info!("Resuming session of '{}'", user.display_name());
        }
    } else {
        let input = login.ok_or_else(|| {
            MonitorError::Config("no stored session; a username is required to log in".to_string())
        })?;
        auth.login(&input).await?;
    }

    match monitor.throttle().fetch().await {
        Ok(interval) => info!("Server throttle interval: {}", interval),
        Err(e) if e.is_session_terminated() => return Err(e),
        Err(e) => warn!("Could not read throttle interval: {}", e),
    }

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        cancel_for_signal.cancel();
    });

    let mut screens = monitor.navigator().subscribe();
    let cancel_on_logout = cancel.clone();
    tokio::spawn(async move {
        let ended = screens.wait_for(|s| *s == Screen::Login).await.is_ok();
        if ended {
            info!("Session ended, stopping live feed");
            cancel_on_logout.cancel();
        }
    });

    let mut updates = monitor.view().subscribe();
    let cancel_for_log = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_for_log.cancelled() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = updates.borrow_and_update().clone();
                    log_view(&state);
                }
            }
        }
    });

    let exit = monitor.feed(cancel.clone()).run().await;
    cancel.cancel();
    info!("Home monitor stopped");
    feed::exit_to_result(exit)
}

fn log_view(state: &SensorViewState) {
    if let Some(banner) = state.error() {
        warn!("[{}] {}", state.connection(), banner);
    }
    let Some(device) = state.selected_device() else {
        debug!("[{}] no sensor data yet", state.connection());
        return;
    };
    let readings = device
        .readings()
        .iter()
        .map(|r| format!("{} {}{}", r.name, r.value, r.unit))
        .collect::<Vec<_>>()
        .join(", ");
    info!(
        "[{}] {}: {} | {} rssi {} dBm, up {}",
        state.connection(),
        device.label(),
        readings,
        device.status.badge(),
        device.status.rssi,
        device.status.uptime_text()
    );
}
