//! GraphQL operations of the Home Monitor backend
//!
//! [`MonitorApi`] is the typed surface the rest of the service talks to;
//! [`GraphQlApi`] implements it over the session client.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use hm_client::{
    ClientError, Dispatcher, GraphQlClient, Operation, Subscription, TokenRefresher, UserProfile,
};

use crate::auth::LoginInput;
use crate::error::{MonitorError, Result};

pub const LOGIN: &str = r#"
mutation Login($loginInput: LoginInput!) {
  login(loginInput: $loginInput) {
    access_token
    user {
      id
      username
      email
      displayName
    }
  }
}"#;

pub const REFRESH_TOKEN: &str = r#"
mutation RefreshToken {
  refreshToken {
    access_token
  }
}"#;

pub const THROTTLE: &str = r#"
query Throttle {
  throttle
}"#;

pub const SET_THROTTLE: &str = r#"
mutation SetThrottle($interval: Int!) {
  setThrottle(interval: $interval)
}"#;

pub const GET_USER_BY_ID: &str = r#"
query GetUserById($id: String!) {
  getUserById(id: $id) {
    id
    username
    email
    displayName
  }
}"#;

pub const SENSOR_DATA: &str = r#"
subscription SensorData {
  sensorData {
    timestamp
    devices {
      device_id
      room
      last_seen
      sensors {
        environmental {
          temperature { value unit timestamp }
          humidity { value unit timestamp }
        }
        air_quality {
          air { value unit timestamp }
          co { value unit timestamp }
        }
      }
      status { online rssi uptime timestamp }
    }
  }
}"#;

/// Result of the login mutation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginPayload {
    pub access_token: String,
    pub user: UserProfile,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
}

/// Backend operations used by the service
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait MonitorApi: Send + Sync {
    /// Exchange credentials for a session; sent without any Authorization
    async fn login(&self, input: &LoginInput) -> Result<LoginPayload>;

    /// Current throttle interval in milliseconds
    async fn throttle(&self) -> Result<u64>;

    /// Ask the server to change the throttle; returns the interval it adopted
    async fn set_throttle(&self, interval_ms: u64) -> Result<u64>;

    async fn user_by_id(&self, id: &str) -> Result<UserProfile>;

    /// Open the live sensor subscription
    async fn subscribe_sensor_data(&self) -> Result<Subscription>;

    /// Refresh the credential after a stream reported it expired
    async fn renew_credential(&self) -> Result<()>;
}

/// [`MonitorApi`] over the authenticated GraphQL client
#[derive(Debug, Clone)]
pub struct GraphQlApi {
    client: GraphQlClient,
}

impl GraphQlApi {
    pub fn new(client: GraphQlClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GraphQlClient {
        &self.client
    }
}

#[async_trait]
impl MonitorApi for GraphQlApi {
    async fn login(&self, input: &LoginInput) -> Result<LoginPayload> {
        let op = Operation::parse(LOGIN)?
            .with_name("Login")
            .with_variables(json!({ "loginInput": input }));
        let data = self.client.execute_anonymous(&op).await?;
        field(data, "login")
    }

    async fn throttle(&self) -> Result<u64> {
        let op = Operation::parse(THROTTLE)?.with_name("Throttle");
        let data = self.client.execute(&op).await?;
        field(data, "throttle")
    }

    async fn set_throttle(&self, interval_ms: u64) -> Result<u64> {
        let op = Operation::parse(SET_THROTTLE)?
            .with_name("SetThrottle")
            .with_variables(json!({ "interval": interval_ms }));
        let data = self.client.execute(&op).await?;
        field(data, "setThrottle")
    }

    async fn user_by_id(&self, id: &str) -> Result<UserProfile> {
        let op = Operation::parse(GET_USER_BY_ID)?
            .with_name("GetUserById")
            .with_variables(json!({ "id": id }));
        let data = self.client.execute(&op).await?;
        field(data, "getUserById")
    }

    async fn subscribe_sensor_data(&self) -> Result<Subscription> {
        let op = Operation::parse(SENSOR_DATA)?.with_name("SensorData");
        Ok(self.client.subscribe(&op).await?)
    }

    async fn renew_credential(&self) -> Result<()> {
        self.client.renew_credential().await?;
        Ok(())
    }
}

/// Runs the refresh mutation. Goes through the bare dispatcher with no
/// credential so an expired token can never recurse into another refresh.
#[derive(Debug, Clone)]
pub struct GraphQlTokenRefresher {
    dispatcher: Dispatcher,
}

impl GraphQlTokenRefresher {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl TokenRefresher for GraphQlTokenRefresher {
    async fn refresh(&self) -> hm_client::Result<String> {
        let op = Operation::parse(REFRESH_TOKEN)?.with_name("RefreshToken");
        let data = self.dispatcher.execute(&op, None).await?;
        let payload: TokenPayload = field(data, "refreshToken")
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))?;
        debug!("Refresh mutation returned a new access token");
        Ok(payload.access_token)
    }
}

/// Decode one top-level field of a `data` object
fn field<T: DeserializeOwned>(mut data: Value, name: &str) -> Result<T> {
    let value = data
        .get_mut(name)
        .map(Value::take)
        .filter(|v| !v.is_null())
        .ok_or_else(|| MonitorError::UnexpectedResponse(format!("missing '{}' in response", name)))?;
    serde_json::from_value(value).map_err(|e| {
        MonitorError::UnexpectedResponse(format!("malformed '{}' in response: {}", name, e))
    })
}
