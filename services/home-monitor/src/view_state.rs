//! Live sensor view-state
//!
//! [`SensorViewState`] is a plain record updated by [`ViewEvent`]s. It only
//! ever holds a snapshot that passed validation, so a rejected push leaves the
//! last valid data on display. [`LiveSensorView`] wraps it in a watch channel
//! for observers.

use std::fmt;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::sensor::{Device, SensorSnapshot};

/// Connection state of the sensor feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Something that happened to the feed or the user's selection
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// A subscription is being opened
    Connect,
    /// The `data` object of one push
    Message(Value),
    /// The stream failed
    StreamError(String),
    /// The feed stopped
    Disconnect,
    /// The user picked a device
    SelectDevice(String),
}

/// What the view shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorViewState {
    connection: ConnectionState,
    snapshot: Option<SensorSnapshot>,
    selected_device: Option<String>,
    error: Option<String>,
    rejected: u64,
}

impl SensorViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// The most recent snapshot that passed validation
    pub fn displayed(&self) -> Option<&SensorSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn selected_device_id(&self) -> Option<&str> {
        self.selected_device.as_deref()
    }

    pub fn selected_device(&self) -> Option<&Device> {
        let id = self.selected_device.as_deref()?;
        self.snapshot.as_ref()?.device(id)
    }

    /// Banner text while the feed is in the error state
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Pushes discarded by validation since creation
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    /// Apply an event. Returns true when observers should be told.
    pub fn apply(&mut self, event: ViewEvent) -> bool {
        match event {
            ViewEvent::Connect => {
                self.connection = ConnectionState::Connecting;
                self.error = None;
                true
            }
            ViewEvent::Message(data) => self.on_message(&data),
            ViewEvent::StreamError(message) => {
                warn!("Sensor feed error: {}", message);
                self.connection = ConnectionState::Error;
                self.error = Some(message);
                true
            }
            ViewEvent::Disconnect => {
                self.connection = ConnectionState::Idle;
                true
            }
            ViewEvent::SelectDevice(id) => self.select(id),
        }
    }

    fn on_message(&mut self, data: &Value) -> bool {
        let snapshot = match SensorSnapshot::from_push(data).and_then(|s| s.validate().map(|()| s)) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.rejected += 1;
                warn!("Discarding sensor push, keeping last valid snapshot: {}", e);
                return false;
            }
        };

        debug!(
            "Accepted sensor snapshot at {} with {} device(s)",
            snapshot.timestamp,
            snapshot.devices.len()
        );
        let keep_selection = self
            .selected_device
            .as_deref()
            .is_some_and(|id| snapshot.contains(id));
        if !keep_selection {
            self.selected_device = snapshot.devices.first().map(|d| d.device_id.clone());
        }
        if self.connection != ConnectionState::Connected {
            info!("Sensor feed connected");
        }
        self.connection = ConnectionState::Connected;
        self.error = None;
        self.snapshot = Some(snapshot);
        true
    }

    fn select(&mut self, id: String) -> bool {
        let known = self.snapshot.as_ref().is_some_and(|s| s.contains(&id));
        if !known {
            debug!("Ignoring selection of unknown device '{}'", id);
            return false;
        }
        if self.selected_device.as_deref() == Some(id.as_str()) {
            return false;
        }
        self.selected_device = Some(id);
        true
    }
}

/// Shared, observable view-state
///
/// ```
/// # tokio_test::block_on(async {
/// use home_monitor::view_state::{ConnectionState, LiveSensorView, ViewEvent};
///
/// let view = LiveSensorView::new();
/// let mut rx = view.subscribe();
/// view.apply(ViewEvent::Connect);
/// rx.changed().await.unwrap();
/// assert_eq!(rx.borrow().connection(), ConnectionState::Connecting);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct LiveSensorView {
    tx: watch::Sender<SensorViewState>,
}

impl Default for LiveSensorView {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveSensorView {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SensorViewState::new());
        Self { tx }
    }

    /// Apply an event and notify subscribers if it changed what is shown
    pub fn apply(&self, event: ViewEvent) -> bool {
        self.tx.send_if_modified(|state| state.apply(event))
    }

    pub fn subscribe(&self) -> watch::Receiver<SensorViewState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SensorViewState {
        self.tx.borrow().clone()
    }

    pub fn select_device(&self, device_id: impl Into<String>) -> bool {
        self.apply(ViewEvent::SelectDevice(device_id.into()))
    }
}
