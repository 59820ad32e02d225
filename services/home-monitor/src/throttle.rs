//! Data throttle control
//!
//! The backend decides how often it pushes sensor data. The control only
//! knows the interval the server last reported; there is no local default.

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::api::MonitorApi;
use crate::error::{MonitorError, Result};

/// Intervals the backend accepts, in milliseconds
pub const ALLOWED_INTERVALS_MS: [u64; 7] = [1000, 2000, 3000, 5000, 10000, 15000, 30000];

/// A throttle interval from the allowed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThrottleInterval(u64);

impl ThrottleInterval {
    pub fn millis(self) -> u64 {
        self.0
    }

    /// Every allowed interval, shortest first
    pub fn all() -> impl Iterator<Item = ThrottleInterval> {
        ALLOWED_INTERVALS_MS.into_iter().map(ThrottleInterval)
    }
}

impl TryFrom<u64> for ThrottleInterval {
    type Error = MonitorError;

    fn try_from(ms: u64) -> Result<Self> {
        if ALLOWED_INTERVALS_MS.contains(&ms) {
            Ok(ThrottleInterval(ms))
        } else {
            Err(MonitorError::InvalidThrottle(ms))
        }
    }
}

impl fmt::Display for ThrottleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1000 == 0 {
            write!(f, "{}s", self.0 / 1000)
        } else {
            write!(f, "{}ms", self.0)
        }
    }
}

/// Reads and changes the server's throttle interval
pub struct ThrottleControl {
    api: Arc<dyn MonitorApi>,
    current: RwLock<Option<ThrottleInterval>>,
}

impl ThrottleControl {
    pub fn new(api: Arc<dyn MonitorApi>) -> Self {
        Self {
            api,
            current: RwLock::new(None),
        }
    }

    /// Last value reported by the server, if any has been seen
    pub fn current(&self) -> Option<ThrottleInterval> {
        *self
            .current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Query the server's interval
    pub async fn fetch(&self) -> Result<ThrottleInterval> {
        let reported = self.api.throttle().await?;
        debug!("Server reports throttle {} ms", reported);
        self.adopt(reported)
    }

    /// Ask the server to use `ms`; values outside the allowed set are
    /// rejected without contacting it
    pub async fn set(&self, ms: u64) -> Result<ThrottleInterval> {
        let requested = ThrottleInterval::try_from(ms)?;
        let reported = self.api.set_throttle(requested.millis()).await?;
        if reported != requested.millis() {
            warn!(
                "Requested throttle {} but server adopted {} ms",
                requested, reported
            );
        }
        let adopted = self.adopt(reported)?;
        info!("Throttle set to {}", adopted);
        Ok(adopted)
    }

    fn adopt(&self, reported: u64) -> Result<ThrottleInterval> {
        let interval = ThrottleInterval::try_from(reported).map_err(|_| {
            MonitorError::UnexpectedResponse(format!(
                "server reported unsupported throttle {} ms",
                reported
            ))
        })?;
        *self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(interval);
        Ok(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockMonitorApi;

    #[test]
    fn allowed_set_is_accepted() {
        for ms in ALLOWED_INTERVALS_MS {
            assert_eq!(ThrottleInterval::try_from(ms).unwrap().millis(), ms);
        }
        assert_eq!(ThrottleInterval::all().count(), 7);
    }

    #[test]
    fn other_values_are_rejected() {
        for ms in [0, 999, 1001, 4000, 60000] {
            assert!(matches!(
                ThrottleInterval::try_from(ms),
                Err(MonitorError::InvalidThrottle(v)) if v == ms
            ));
        }
    }

    #[test]
    fn display_in_seconds() {
        assert_eq!(ThrottleInterval::try_from(15000).unwrap().to_string(), "15s");
    }

    #[tokio::test]
    async fn no_value_until_server_answers() {
        let mut api = MockMonitorApi::new();
        api.expect_throttle()
            .times(1)
            .returning(|| Box::pin(async { Ok(2000) }));

        let control = ThrottleControl::new(Arc::new(api));
        assert_eq!(control.current(), None);
        assert_eq!(control.fetch().await.unwrap().millis(), 2000);
        assert_eq!(control.current().map(ThrottleInterval::millis), Some(2000));
    }

    #[tokio::test]
    async fn invalid_value_is_rejected_before_the_network() {
        let mut api = MockMonitorApi::new();
        api.expect_set_throttle().never();

        let control = ThrottleControl::new(Arc::new(api));
        assert!(matches!(
            control.set(4000).await,
            Err(MonitorError::InvalidThrottle(4000))
        ));
        assert_eq!(control.current(), None);
    }

    #[tokio::test]
    async fn set_adopts_server_value() {
        let mut api = MockMonitorApi::new();
        api.expect_set_throttle()
            .withf(|ms| *ms == 5000)
            .times(1)
            .returning(|_| Box::pin(async { Ok(10000) }));

        let control = ThrottleControl::new(Arc::new(api));
        assert_eq!(control.set(5000).await.unwrap().millis(), 10000);
        assert_eq!(control.current().map(ThrottleInterval::millis), Some(10000));
    }

    #[tokio::test]
    async fn unsupported_server_value_is_unexpected() {
        let mut api = MockMonitorApi::new();
        api.expect_throttle()
            .returning(|| Box::pin(async { Ok(4500) }));

        let control = ThrottleControl::new(Arc::new(api));
        assert!(matches!(
            control.fetch().await,
            Err(MonitorError::UnexpectedResponse(_))
        ));
        assert_eq!(control.current(), None);
    }
}
