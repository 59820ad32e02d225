//! Login and logout entry points

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use hm_client::{CredentialStore, UserProfile};

use crate::api::MonitorApi;
use crate::error::{FieldError, MonitorError, Result};
use crate::navigation::{Navigator, Screen};

pub const USERNAME_LENGTH: RangeInclusive<usize> = 6..=20;
pub const PASSWORD_LENGTH: RangeInclusive<usize> = 4..=100;

/// Credentials entered on the login screen
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginInput")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl LoginInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check both fields; every failing field is reported
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if let Some(e) = check_length("username", "Username", &self.username, USERNAME_LENGTH) {
            errors.push(e);
        }
        if let Some(e) = check_length("password", "Password", &self.password, PASSWORD_LENGTH) {
            errors.push(e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(MonitorError::Form(errors))
        }
    }
}

fn check_length(
    field: &'static str,
    label: &str,
    value: &str,
    bounds: RangeInclusive<usize>,
) -> Option<FieldError> {
    let len = value.chars().count();
    let message = if len < *bounds.start() {
        format!("{} must be at least {} characters", label, bounds.start())
    } else if len > *bounds.end() {
        format!("{} cannot exceed {} characters", label, bounds.end())
    } else {
        return None;
    };
    Some(FieldError { field, message })
}

/// Session entry points used by the surrounding application
pub struct AuthService {
    api: Arc<dyn MonitorApi>,
    credentials: Arc<CredentialStore>,
    navigator: Arc<dyn Navigator>,
}

impl AuthService {
    pub fn new(
        api: Arc<dyn MonitorApi>,
        credentials: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            api,
            credentials,
            navigator,
        }
    }

    /// Validate the form, log in and open the dashboard
    pub async fn login(&self, input: &LoginInput) -> Result<UserProfile> {
        input.validate()?;
        debug!("Logging in as '{}'", input.username);

        let payload = self.api.login(input).await?;
        self.credentials
            .sign_in(payload.access_token, payload.user.clone())?;

        info!("Logged in as '{}'", payload.user.display_name());
        self.navigator.navigate(Screen::Dashboard);
        Ok(payload.user)
    }

    /// Forget the session and return to the login screen
    pub fn logout(&self) -> Result<()> {
        self.credentials.clear()?;
        info!("Logged out");
        self.navigator.navigate(Screen::Login);
        Ok(())
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.credentials.user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_authenticated()
    }

    /// Screen to show on start, from the persisted session
    pub fn entry_screen(&self) -> Screen {
        Screen::for_session(self.is_authenticated())
    }

    pub async fn fetch_user(&self, id: &str) -> Result<UserProfile> {
        self.api.user_by_id(id).await
    }
}
