//! BDD step definitions for the data throttle feature

use std::sync::Arc;

use cucumber::{given, then, when};

use home_monitor::auth::LoginInput;
use home_monitor::throttle::ThrottleInterval;
use home_monitor::MonitorError;

use crate::backend::FakeBackend;
use crate::world::HomeMonitorWorld;

#[given(expr = "the backend throttle is {int} ms")]
fn backend_throttle(world: &mut HomeMonitorWorld, ms: u64) {
    let backend = world
        .backend
        .get_or_insert_with(|| Arc::new(FakeBackend::default()));
    backend.set_throttle(ms);
}

#[given("a signed-in dashboard")]
async fn signed_in_dashboard(world: &mut HomeMonitorWorld) {
    world.start_dashboard();
    world
        .monitor()
        .auth()
        .login(&LoginInput::new("resident01", "correct-horse"))
        .await
        .expect("login should succeed");
}

#[when("the dashboard reads the throttle")]
async fn read_throttle(world: &mut HomeMonitorWorld) {
    world
        .monitor()
        .throttle()
        .fetch()
        .await
        .expect("throttle query should succeed");
}

#[when(expr = "the user selects a throttle of {int} ms")]
async fn select_throttle(world: &mut HomeMonitorWorld, ms: u64) {
    if let Err(e) = world.monitor().throttle().set(ms).await {
        world.last_error = Some(e);
    }
}

#[then("the dashboard shows no throttle interval")]
fn no_throttle(world: &mut HomeMonitorWorld) {
    assert_eq!(world.monitor().throttle().current(), None);
}

#[then(expr = "the dashboard shows a throttle of {int} ms")]
fn shows_throttle(world: &mut HomeMonitorWorld, ms: u64) {
    assert_eq!(
        world.monitor().throttle().current().map(ThrottleInterval::millis),
        Some(ms)
    );
}

#[then(expr = "the backend throttle is now {int} ms")]
fn backend_throttle_now(world: &mut HomeMonitorWorld, ms: u64) {
    assert_eq!(world.backend().throttle(), ms);
}

#[then("the throttle change is rejected")]
fn throttle_rejected(world: &mut HomeMonitorWorld) {
    assert!(
        matches!(world.last_error, Some(MonitorError::InvalidThrottle(_))),
        "expected an invalid throttle error, got {:?}",
        world.last_error
    );
}

#[then("no throttle change was sent to the backend")]
fn no_set_throttle_request(world: &mut HomeMonitorWorld) {
    assert!(world.backend().requests("SetThrottle").is_empty());
}
