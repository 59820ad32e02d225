//! BDD step definitions for the session lifecycle feature

use std::sync::Arc;

use cucumber::{given, then, when};
use tokio::task::JoinSet;

use hm_client::session::{ACCESS_TOKEN_KEY, USER_KEY};
use hm_client::KeyValueStore;
use home_monitor::auth::LoginInput;
use home_monitor::navigation::Screen;

use crate::backend::FakeBackend;
use crate::world::HomeMonitorWorld;

async fn log_in(world: &mut HomeMonitorWorld, username: String, password: String) {
    let result = world
        .monitor()
        .auth()
        .login(&LoginInput::new(username, password))
        .await;
    world.last_error = result.err();
}

fn stored(world: &HomeMonitorWorld, key: &str) -> Option<String> {
    world
        .storage
        .as_ref()
        .expect("storage not created")
        .get(key)
        .expect("storage read should succeed")
}

#[given("a home monitor backend")]
fn home_monitor_backend(world: &mut HomeMonitorWorld) {
    world.backend = Some(Arc::new(FakeBackend::default()));
    world.start_dashboard();
}

#[given(expr = "the user logs in as {string} with password {string}")]
async fn given_logged_in(world: &mut HomeMonitorWorld, username: String, password: String) {
    log_in(world, username, password).await;
    assert!(world.last_error.is_none(), "login failed: {:?}", world.last_error);
}

#[when(expr = "the user logs in as {string} with password {string}")]
async fn when_logging_in(world: &mut HomeMonitorWorld, username: String, password: String) {
    log_in(world, username, password).await;
}

#[when("the user logs out")]
fn log_out(world: &mut HomeMonitorWorld) {
    world.monitor().auth().logout().expect("logout should succeed");
}

#[when("the dashboard restarts")]
fn dashboard_restarts(world: &mut HomeMonitorWorld) {
    world.start_dashboard();
}

#[given("the access token has expired")]
fn token_expired(world: &mut HomeMonitorWorld) {
    world.backend().expire_tokens();
}

#[given("the backend refuses to refresh tokens")]
fn refresh_refused(world: &mut HomeMonitorWorld) {
    world.backend().fail_refreshes();
}

#[when(expr = "{int} throttle reads are made at the same time")]
async fn concurrent_reads(world: &mut HomeMonitorWorld, count: usize) {
    let mut reads = JoinSet::new();
    for _ in 0..count {
        let api = Arc::clone(world.monitor().api());
        reads.spawn(async move { api.throttle().await });
    }
    world.results.clear();
    while let Some(joined) = reads.join_next().await {
        world.results.push(joined.expect("read task should not panic"));
    }
}

#[then(expr = "the screen is {string}")]
fn screen_is(world: &mut HomeMonitorWorld, screen: String) {
    let expected = match screen.as_str() {
        "login" => Screen::Login,
        "dashboard" => Screen::Dashboard,
        other => panic!("Unknown screen: {}", other),
    };
    assert_eq!(world.monitor().navigator().current(), expected);
}

#[then(expr = "the stored session belongs to {string}")]
fn session_belongs_to(world: &mut HomeMonitorWorld, username: String) {
    let user = world
        .monitor()
        .auth()
        .current_user()
        .expect("a user should be signed in");
    assert_eq!(user.username, username);
    assert!(stored(world, ACCESS_TOKEN_KEY).is_some());
    assert!(stored(world, USER_KEY).is_some());
}

#[then("no session is stored")]
fn no_session(world: &mut HomeMonitorWorld) {
    assert!(!world.monitor().auth().is_authenticated());
    assert_eq!(stored(world, ACCESS_TOKEN_KEY), None);
    assert_eq!(stored(world, USER_KEY), None);
}

#[then(expr = "the login fails with {string}")]
fn login_fails_with(world: &mut HomeMonitorWorld, message: String) {
    let error = world
        .last_error
        .as_ref()
        .expect("login should have failed")
        .to_string();
    assert!(error.contains(&message), "'{}' not in '{}'", message, error);
}

#[then("no login request reached the backend")]
fn no_login_request(world: &mut HomeMonitorWorld) {
    assert!(world.backend().requests("Login").is_empty());
}

#[then("all throttle reads succeed")]
fn all_reads_succeed(world: &mut HomeMonitorWorld) {
    assert!(!world.results.is_empty());
    for result in &world.results {
        assert!(result.is_ok(), "read failed: {:?}", result);
    }
}

#[then("every throttle read fails with a terminated session")]
fn all_reads_terminated(world: &mut HomeMonitorWorld) {
    assert!(!world.results.is_empty());
    for result in &world.results {
        match result {
            Err(e) => assert!(e.is_session_terminated(), "unexpected error: {}", e),
            Ok(v) => panic!("read unexpectedly succeeded with {}", v),
        }
    }
}

#[then(expr = "the backend saw {int} token refresh")]
fn refresh_count(world: &mut HomeMonitorWorld, count: u32) {
    assert_eq!(world.backend().refresh_calls(), count);
}

#[then("the stored token is the refreshed one")]
fn stored_token_refreshed(world: &mut HomeMonitorWorld) {
    let token = stored(world, ACCESS_TOKEN_KEY);
    assert_eq!(token, Some(world.backend().valid_token()));
    assert_eq!(
        world.monitor().credentials().access_token(),
        Some(world.backend().valid_token())
    );
}
