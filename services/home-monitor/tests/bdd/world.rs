//! BDD test world for the home monitor service

use std::sync::Arc;

use cucumber::World;
use hm_client::{KeyValueStore, MemoryKeyValueStore};
use home_monitor::view_state::LiveSensorView;
use home_monitor::{Config, HomeMonitor, HomeMonitorBuilder, MonitorError};

use crate::backend::FakeBackend;

#[derive(Debug, Default, World)]
pub struct HomeMonitorWorld {
    // View-state testing
    pub view: Option<LiveSensorView>,

    // Session and throttle testing
    pub backend: Option<Arc<FakeBackend>>,
    pub storage: Option<Arc<MemoryKeyValueStore>>,
    pub monitor: Option<HomeMonitor>,
    pub last_error: Option<MonitorError>,
    pub results: Vec<Result<u64, MonitorError>>,
}

impl HomeMonitorWorld {
    pub fn view(&self) -> &LiveSensorView {
        self.view.as_ref().expect("live view not created")
    }

    pub fn backend(&self) -> &Arc<FakeBackend> {
        self.backend.as_ref().expect("backend not created")
    }

    pub fn monitor(&self) -> &HomeMonitor {
        self.monitor.as_ref().expect("dashboard not started")
    }

    /// Start (or restart) the dashboard over the shared storage and backend
    pub fn start_dashboard(&mut self) {
        let storage = Arc::clone(
            self.storage
                .get_or_insert_with(|| Arc::new(MemoryKeyValueStore::new())),
        );
        let backend = Arc::clone(self.backend());
        let monitor = HomeMonitorBuilder::new(Config::default())
            .with_storage(storage as Arc<dyn KeyValueStore>)
            .with_http_transport(backend)
            .build()
            .expect("dashboard should build");
        self.monitor = Some(monitor);
    }
}
