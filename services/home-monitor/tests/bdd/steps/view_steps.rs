//! BDD step definitions for the live sensor view feature

use cucumber::{given, then, when};
use serde_json::{json, Value};

use home_monitor::view_state::{ConnectionState, LiveSensorView, ViewEvent};

use crate::world::HomeMonitorWorld;

fn device(id: &str, temperature: f64, humidity: f64) -> Value {
    json!({
        "device_id": id,
        "room": id,
        "last_seen": "2024-10-01T12:00:00Z",
        "sensors": {
            "environmental": {
                "temperature": {"value": temperature, "unit": "°C", "timestamp": 1},
                "humidity": {"value": humidity, "unit": "%", "timestamp": 1}
            },
            "air_quality": {
                "air": {"value": 42, "unit": "AQI", "timestamp": 1},
                "co": {"value": 0.4, "unit": "ppm", "timestamp": 1}
            }
        },
        "status": {"online": "true", "rssi": -61, "uptime": 5400, "timestamp": "2024-10-01T12:00:00Z"}
    })
}

fn push(devices: Vec<Value>) -> ViewEvent {
    ViewEvent::Message(json!({"sensorData": {"timestamp": 1, "devices": devices}}))
}

fn parse_state(s: &str) -> ConnectionState {
    match s {
        "idle" => ConnectionState::Idle,
        "connecting" => ConnectionState::Connecting,
        "connected" => ConnectionState::Connected,
        "error" => ConnectionState::Error,
        other => panic!("Unknown connection state: {}", other),
    }
}

fn snapshot_arrives(world: &mut HomeMonitorWorld, id: &str, temperature: f64, humidity: f64) {
    world.view().apply(push(vec![device(id, temperature, humidity)]));
}

fn snapshots_arrive(world: &mut HomeMonitorWorld, ids: &str) {
    let devices = ids
        .split(',')
        .map(|id| device(id.trim(), 20.0, 40.0))
        .collect();
    world.view().apply(push(devices));
}

#[given("a live sensor view that is connecting")]
fn view_connecting(world: &mut HomeMonitorWorld) {
    let view = LiveSensorView::new();
    view.apply(ViewEvent::Connect);
    world.view = Some(view);
}

#[given(regex = r#"^a snapshot arrives for "([^"]+)" with temperature (-?[\d.]+) and humidity (-?[\d.]+)$"#)]
fn given_snapshot(world: &mut HomeMonitorWorld, id: String, temperature: f64, humidity: f64) {
    snapshot_arrives(world, &id, temperature, humidity);
}

#[when(regex = r#"^a snapshot arrives for "([^"]+)" with temperature (-?[\d.]+) and humidity (-?[\d.]+)$"#)]
fn when_snapshot(world: &mut HomeMonitorWorld, id: String, temperature: f64, humidity: f64) {
    snapshot_arrives(world, &id, temperature, humidity);
}

#[given(expr = "snapshots arrive for devices {string}")]
fn given_snapshots(world: &mut HomeMonitorWorld, ids: String) {
    snapshots_arrive(world, &ids);
}

#[when(expr = "snapshots arrive for devices {string}")]
fn when_snapshots(world: &mut HomeMonitorWorld, ids: String) {
    snapshots_arrive(world, &ids);
}

#[when("an undecodable push arrives")]
fn undecodable_push(world: &mut HomeMonitorWorld) {
    world
        .view()
        .apply(ViewEvent::Message(json!({"sensorData": {"devices": "not a list"}})));
}

#[when(expr = "the stream fails with {string}")]
fn stream_fails(world: &mut HomeMonitorWorld, message: String) {
    world.view().apply(ViewEvent::StreamError(message));
}

#[given(expr = "the user selects {string}")]
fn user_selects(world: &mut HomeMonitorWorld, id: String) {
    assert!(world.view().select_device(id), "selection should change");
}

#[then(expr = "the connection state is {string}")]
fn connection_state_is(world: &mut HomeMonitorWorld, state: String) {
    assert_eq!(world.view().current().connection(), parse_state(&state));
}

#[then(regex = r#"^the displayed temperature of "([^"]+)" is (-?[\d.]+)$"#)]
fn displayed_temperature(world: &mut HomeMonitorWorld, id: String, expected: f64) {
    let state = world.view().current();
    let snapshot = state.displayed().expect("a snapshot should be displayed");
    let device = snapshot.device(&id).expect("device should be displayed");
    assert_eq!(device.temperature().map(|r| r.value), Some(expected));
}

#[then(expr = "the selected device is {string}")]
fn selected_device_is(world: &mut HomeMonitorWorld, id: String) {
    assert_eq!(world.view().current().selected_device_id(), Some(id.as_str()));
}

#[then(expr = "the snapshot is {word}")]
fn snapshot_outcome(world: &mut HomeMonitorWorld, outcome: String) {
    let state = world.view().current();
    match outcome.as_str() {
        "accepted" => {
            assert_eq!(state.rejected_count(), 0);
            assert!(state.displayed().is_some());
            assert_eq!(state.connection(), ConnectionState::Connected);
        }
        "rejected" => {
            assert_eq!(state.rejected_count(), 1);
            assert!(state.displayed().is_none());
            assert_eq!(state.connection(), ConnectionState::Connecting);
        }
        other => panic!("Unknown outcome: {}", other),
    }
}

#[then(expr = "{int} push has been rejected")]
fn pushes_rejected(world: &mut HomeMonitorWorld, count: u64) {
    assert_eq!(world.view().current().rejected_count(), count);
}

#[then(expr = "the error banner reads {string}")]
fn error_banner(world: &mut HomeMonitorWorld, message: String) {
    assert_eq!(world.view().current().error(), Some(message.as_str()));
}
