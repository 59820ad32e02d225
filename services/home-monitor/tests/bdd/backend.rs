//! In-process GraphQL backend for BDD scenarios

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use hm_client::io::{HttpRequest, HttpResponse};
use hm_client::HttpTransport;

/// One request the backend received
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub operation: String,
    pub bearer: Option<String>,
}

#[derive(Debug)]
struct BackendState {
    valid_token: String,
    next_token: String,
    throttle: u64,
    refresh_fails: bool,
    refresh_calls: u32,
    requests: Vec<ReceivedRequest>,
}

/// Answers the Home Monitor operations from in-memory state
#[derive(Debug)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            state: Mutex::new(BackendState {
                valid_token: "token-1".to_string(),
                next_token: "token-2".to_string(),
                throttle: 1000,
                refresh_fails: false,
                refresh_calls: 0,
                requests: Vec::new(),
            }),
        }
    }
}

impl FakeBackend {
    pub fn set_throttle(&self, ms: u64) {
        self.state.lock().unwrap().throttle = ms;
    }

    pub fn throttle(&self) -> u64 {
        self.state.lock().unwrap().throttle
    }

    /// Make the current access token stale; the next refresh issues a new one
    pub fn expire_tokens(&self) {
        let mut state = self.state.lock().unwrap();
        state.valid_token = state.next_token.clone();
        state.next_token = format!("{}-next", state.next_token);
    }

    pub fn fail_refreshes(&self) {
        self.state.lock().unwrap().refresh_fails = true;
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.lock().unwrap().refresh_calls
    }

    pub fn valid_token(&self) -> String {
        self.state.lock().unwrap().valid_token.clone()
    }

    pub fn requests(&self, operation: &str) -> Vec<ReceivedRequest> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.operation == operation)
            .cloned()
            .collect()
    }

    fn answer(&self, operation: &str, bearer: Option<&str>, variables: &Value) -> Value {
        let mut state = self.state.lock().unwrap();
        match operation {
            "Login" => {
                let input = &variables["loginInput"];
                if input["password"] != "correct-horse" {
                    return json!({"data": null, "errors": [{"message": "Invalid credentials"}]});
                }
                json!({"data": {"login": {
                    "access_token": state.valid_token,
                    "user": {
                        "id": "u-1",
                        "username": input["username"],
                        "email": "resident@example.com",
                        "displayName": "Resident"
                    }
                }}})
            }
            "RefreshToken" => {
                state.refresh_calls += 1;
                if state.refresh_fails {
                    return json!({"data": null, "errors": [{"message": "Refresh token revoked"}]});
                }
                json!({"data": {"refreshToken": {"access_token": state.valid_token}}})
            }
            _ if bearer != Some(state.valid_token.as_str()) => json!({
                "data": null,
                "errors": [{"message": "Unauthorized", "extensions": {"code": "UNAUTHENTICATED"}}]
            }),
            "Throttle" => json!({"data": {"throttle": state.throttle}}),
            "SetThrottle" => {
                state.throttle = variables["interval"].as_u64().unwrap_or(state.throttle);
                json!({"data": {"setThrottle": state.throttle}})
            }
            "GetUserById" => json!({"data": {"getUserById": {
                "id": variables["id"],
                "username": "resident",
                "email": "resident@example.com"
            }}}),
            other => json!({"data": null, "errors": [{"message": format!("unknown operation {}", other)}]}),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn post(&self, request: HttpRequest) -> hm_client::Result<HttpResponse> {
        let operation = request.body["operationName"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        self.state.lock().unwrap().requests.push(ReceivedRequest {
            operation: operation.clone(),
            bearer: request.bearer.clone(),
        });

        if operation == "RefreshToken" {
            // Keep the refresh in flight long enough for concurrent callers to park.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let body = self.answer(&operation, request.bearer.as_deref(), &request.body["variables"]);
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }
}
