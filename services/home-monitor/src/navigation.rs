//! Navigation between the login entry point and the dashboard

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use hm_client::SessionTerminationHandler;

/// Top-level screens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Screen {
    /// Unauthenticated entry point
    #[default]
    Login,
    Dashboard,
}

impl Screen {
    /// Where a (re)started client lands
    pub fn for_session(authenticated: bool) -> Self {
        if authenticated {
            Screen::Dashboard
        } else {
            Screen::Login
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Screen::Login => f.write_str("login"),
            Screen::Dashboard => f.write_str("dashboard"),
        }
    }
}

/// Moves the user to another screen
#[cfg_attr(test, mockall::automock)]
pub trait Navigator: Send + Sync {
    fn navigate(&self, screen: Screen);
}

/// Navigator that publishes the current screen on a watch channel
#[derive(Debug, Clone)]
pub struct WatchNavigator {
    tx: watch::Sender<Screen>,
}

impl WatchNavigator {
    pub fn new(initial: Screen) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> Screen {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Screen> {
        self.tx.subscribe()
    }
}

impl Navigator for WatchNavigator {
    fn navigate(&self, screen: Screen) {
        self.tx.send_if_modified(|current| {
            if *current == screen {
                return false;
            }
            info!("Navigating from {} to {}", current, screen);
            *current = screen;
            true
        });
    }
}

/// Sends the user back to login when the session can no longer be refreshed
pub struct LoginRedirect {
    navigator: Arc<dyn Navigator>,
}

impl LoginRedirect {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self { navigator }
    }
}

impl SessionTerminationHandler for LoginRedirect {
    fn session_terminated(&self) {
        self.navigator.navigate(Screen::Login);
    }
}
