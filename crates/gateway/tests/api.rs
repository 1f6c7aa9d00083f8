use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use contracts::DispatchConfig;
use dispatcher::{EventHub, RelayControl};
use gateway::{build_router, AppState};
use ingestion::{MidiOutPort, MidiOutputs};
use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tokio_stream::StreamExt;
use tower::ServiceExt;

fn control() -> RelayControl {
    RelayControl::new(DispatchConfig::default(), EventHub::default())
}

fn app(control: &RelayControl) -> Router {
    build_router(AppState::new(control.clone()), true)
}

async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_returns_ok() {
    let control = control();
    let (status, body) = call(app(&control), "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn put_list_delete_bindings() {
    let control = control();

    let (status, body) = call(
        app(&control),
        "PUT",
        "/api/bindings/A",
        Some(json!({ "filter": "/4/toggle1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["destination"], "A");
    assert_eq!(body["filter"], "/4/toggle1");

    call(
        app(&control),
        "PUT",
        "/api/bindings/B",
        Some(json!({ "filter": "/4/*", "transform": "strip_prefix" })),
    )
    .await;

    let (status, body) = call(app(&control), "GET", "/api/bindings", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["destination"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["A", "B"]);

    let (status, _) = call(app(&control), "DELETE", "/api/bindings/A", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(app(&control), "DELETE", "/api/bindings/A", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(control.list().unwrap().len(), 1);

    control.shutdown().await;
}

#[tokio::test]
async fn put_with_invalid_filter_is_rejected() {
    let control = control();
    let (status, body) = call(
        app(&control),
        "PUT",
        "/api/bindings/A",
        Some(json!({ "filter": "no-slash" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid filter"));
    assert!(control.list().unwrap().is_empty());
}

#[tokio::test]
async fn dispatch_reports_matches() {
    let control = control();
    for (id, filter) in [("A", "/4/toggle1"), ("B", "/4/*")] {
        call(
            app(&control),
            "PUT",
            &format!("/api/bindings/{id}"),
            Some(json!({ "filter": filter })),
        )
        .await;
    }

    let (status, body) = call(
        app(&control),
        "POST",
        "/api/dispatch",
        Some(json!({ "address": "/4/toggle1", "args": [1.0] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "matched": 2, "delivered": ["A", "B"] }));

    let (_, body) = call(
        app(&control),
        "POST",
        "/api/dispatch",
        Some(json!({ "address": "/5/toggle1" })),
    )
    .await;
    assert_eq!(body["matched"], 0);

    let (status, _) = call(app(&control), "POST", "/api/dispatch", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    control.shutdown().await;
}

#[tokio::test]
async fn osc_send_status_codes() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let reply_to = receiver.local_addr().unwrap().to_string();
    let control = control();
    call(
        app(&control),
        "PUT",
        "/api/bindings/A",
        Some(json!({ "filter": "*", "reply_to": reply_to })),
    )
    .await;
    call(
        app(&control),
        "PUT",
        "/api/bindings/B",
        Some(json!({ "filter": "*" })),
    )
    .await;

    let (status, body) = call(
        app(&control),
        "POST",
        "/api/osc/send",
        Some(json!({ "event_name": "A", "address": "/overlay/show", "args": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let mut buf = [0u8; 256];
    let len = tokio::time::timeout(Duration::from_secs(2), receiver.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let messages = ingestion::codec::decode_packet(&buf[..len]).unwrap();
    assert_eq!(messages[0].address, "/overlay/show");

    let (status, _) = call(
        app(&control),
        "POST",
        "/api/osc/send",
        Some(json!({ "event_name": "A" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        app(&control),
        "POST",
        "/api/osc/send",
        Some(json!({ "event_name": "missing", "address": "/x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));

    let (status, _) = call(
        app(&control),
        "POST",
        "/api/osc/send",
        Some(json!({ "event_name": "B", "address": "/x" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    control.shutdown().await;
}

#[tokio::test]
async fn events_stream_only_its_destination() {
    let control = control();
    for (id, filter) in [("A", "/4/toggle1"), ("B", "/5/*")] {
        call(
            app(&control),
            "PUT",
            &format!("/api/bindings/{id}"),
            Some(json!({ "filter": filter })),
        )
        .await;
    }

    let response = app(&control)
        .oneshot(
            Request::builder()
                .uri("/api/events/A")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let mut frames = response.into_body().into_data_stream();

    let dispatcher = control.dispatcher();
    dispatcher
        .dispatch(contracts::Message::bare("/5/fader"))
        .unwrap();
    dispatcher
        .dispatch(contracts::Message::new(
            "/4/toggle1",
            vec![contracts::OscArg::Float(1.0)],
        ))
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), frames.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.contains("event: A"), "{text}");
    assert!(text.contains("/4/toggle1"), "{text}");
    assert!(!text.contains("/5/fader"), "{text}");

    control.shutdown().await;
}

#[tokio::test]
async fn stats_lists_sinks() {
    let control = control();
    call(
        app(&control),
        "PUT",
        "/api/bindings/A",
        Some(json!({ "filter": "*", "sink": { "sink_type": "log" } })),
    )
    .await;

    let (status, body) = call(app(&control), "GET", "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bindings"], 1);
    assert!(body["sinks"]["A"].is_object());

    control.shutdown().await;
}

#[tokio::test]
async fn osc_send_resolves_event_name() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let reply_to = receiver.local_addr().unwrap().to_string();
    let control = control();
    let (status, _) = call(
        app(&control),
        "PUT",
        "/api/bindings/toggle_a",
        Some(json!({
            "filter": "/4/toggle1",
            "reply_to": reply_to,
            "sink": { "sink_type": "event_stream", "params": { "event_name": "osc_event_0" } }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        app(&control),
        "POST",
        "/api/osc/send",
        Some(json!({ "event_name": "osc_event_0", "address": "/4/toggle1", "args": [0.0] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let mut buf = [0u8; 256];
    let len = tokio::time::timeout(Duration::from_secs(2), receiver.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let messages = ingestion::codec::decode_packet(&buf[..len]).unwrap();
    assert_eq!(messages[0].address, "/4/toggle1");

    control.shutdown().await;
}

struct RecordingPort {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MidiOutPort for RecordingPort {
    fn port_name(&self) -> &str {
        "recording"
    }

    fn send(&mut self, bytes: &[u8]) -> ingestion::Result<()> {
        self.sent.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }
}

#[tokio::test]
async fn midi_send_accepts_hex_and_byte_list() {
    let control = control();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let midi = MidiOutputs::new();
    midi.insert(
        "midiDevice_0",
        Box::new(RecordingPort {
            sent: Arc::clone(&sent),
        }),
    );
    let app = || build_router(AppState::new(control.clone()).with_midi(midi.clone()), false);

    let (status, body) = call(
        app(),
        "POST",
        "/api/midi/send",
        Some(json!({ "event_name": "midiDevice_0", "data": "90 3C 7F" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, _) = call(
        app(),
        "POST",
        "/api/midi/send",
        Some(json!({ "event_name": "midiDevice_0", "data": [176, 7, 64] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        *sent.lock().unwrap(),
        vec![vec![0x90, 0x3C, 0x7F], vec![0xB0, 7, 64]]
    );

    let (status, _) = call(
        app(),
        "POST",
        "/api/midi/send",
        Some(json!({ "event_name": "midiDevice_0", "data": [300] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        app(),
        "POST",
        "/api/midi/send",
        Some(json!({ "event_name": "midiDevice_0", "data": "9" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        app(),
        "POST",
        "/api/midi/send",
        Some(json!({ "data": "903C7F" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        app(),
        "POST",
        "/api/midi/send",
        Some(json!({ "event_name": "nope", "data": "903C7F" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}
