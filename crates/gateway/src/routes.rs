//! HTTP handlers

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use contracts::{Binding, DestinationConfig, Message, OscArg, SinkConfig, SinkType, Transform};
use dispatcher::RelayControl;
use ingestion::MidiOutputs;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::error::GatewayError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub control: RelayControl,
    pub midi: MidiOutputs,
}

impl AppState {
    pub fn new(control: RelayControl) -> Self {
        Self {
            control,
            midi: MidiOutputs::default(),
        }
    }

    /// Use `midi` for `/api/midi/send`
    pub fn with_midi(mut self, midi: MidiOutputs) -> Self {
        self.midi = midi;
        self
    }
}

/// `PUT /api/bindings/{id}` body
#[derive(Debug, Deserialize)]
pub struct BindingRequest {
    pub filter: String,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub reply_to: Option<SocketAddr>,
    /// Defaults to an event-stream sink so browser overlays can subscribe
    #[serde(default)]
    pub sink: Option<SinkConfig>,
}

impl BindingRequest {
    fn into_destination(self, id: String) -> DestinationConfig {
        let sink = self.sink.unwrap_or(SinkConfig {
            sink_type: SinkType::EventStream,
            ..SinkConfig::default()
        });
        DestinationConfig {
            id,
            filter: self.filter,
            transform: self.transform,
            reply_to: self.reply_to,
            sink,
        }
    }
}

/// `POST /api/osc/send` body
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub args: Vec<OscArg>,
}

/// Raw MIDI bytes: a hex string or a list of byte values
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MidiData {
    Hex(String),
    Bytes(Vec<i64>),
}

impl MidiData {
    fn into_bytes(self) -> Result<Vec<u8>, GatewayError> {
        match self {
            Self::Hex(text) => Ok(ingestion::codec::parse_midi_hex(&text)?),
            Self::Bytes(values) => values
                .into_iter()
                .map(|v| {
                    u8::try_from(v).map_err(|_| {
                        GatewayError::BadRequest(format!("MIDI byte {v} out of range 0..=255"))
                    })
                })
                .collect(),
        }
    }
}

/// `POST /api/midi/send` body
#[derive(Debug, Deserialize)]
pub struct MidiSendRequest {
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub data: Option<MidiData>,
}

/// `POST /api/dispatch` body
#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, alias = "arguments")]
    pub args: Vec<OscArg>,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub matched: usize,
    pub delivered: Vec<String>,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// `GET /api/health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /api/bindings`
pub async fn list_bindings(State(state): State<AppState>) -> Result<Json<Vec<Binding>>, GatewayError> {
    Ok(Json(state.control.list()?))
}

/// `PUT /api/bindings/{id}`: register or replace
pub async fn put_binding(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<BindingRequest>,
) -> Result<Json<Binding>, GatewayError> {
    let config = body.into_destination(id);
    let binding = state.control.register_destination(&config).await?;
    info!(destination = %binding.destination, filter = %binding.filter, "Binding registered over HTTP");
    Ok(Json(binding))
}

/// `DELETE /api/bindings/{id}`: 204 whether or not it existed
pub async fn delete_binding(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, GatewayError> {
    let removed = state.control.unregister_destination(&id).await?;
    debug!(destination = %id, removed, "Binding delete");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/osc/send`: outbound OSC to a destination's reply address
pub async fn osc_send(
    State(state): State<AppState>,
    Json(body): Json<SendRequest>,
) -> Result<Json<Value>, GatewayError> {
    let (Some(event_name), Some(address)) = (required(body.event_name), required(body.address))
    else {
        return Err(GatewayError::BadRequest(
            "Missing OSC address or event_name".to_string(),
        ));
    };

    let message = Message::new(address, body.args);
    state
        .control
        .send(&event_name, &message)
        .await
        .map_err(|e| match e {
            contracts::RelayError::DestinationNotFound { .. } => GatewayError::NotFound(format!(
                "Client with event_name '{event_name}' not found"
            )),
            // NoReplyAddress maps to 409 through the relay status table
            other => GatewayError::Relay(other),
        })?;
    Ok(Json(json!({ "success": true })))
}

/// `POST /api/midi/send`: raw bytes to a MIDI device's output port
pub async fn midi_send(
    State(state): State<AppState>,
    Json(body): Json<MidiSendRequest>,
) -> Result<Json<Value>, GatewayError> {
    let (Some(event_name), Some(data)) = (required(body.event_name), body.data) else {
        return Err(GatewayError::BadRequest(
            "Missing MIDI data or event_name".to_string(),
        ));
    };
    let bytes = data.into_bytes()?;
    state.midi.send(&event_name, &bytes)?;
    debug!(%event_name, bytes = bytes.len(), "MIDI sent over HTTP");
    Ok(Json(json!({ "success": true })))
}

/// `POST /api/dispatch`: inject a message as if it arrived on the listener
pub async fn dispatch(
    State(state): State<AppState>,
    Json(body): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, GatewayError> {
    let Some(address) = required(body.address) else {
        return Err(GatewayError::BadRequest("Missing OSC address".to_string()));
    };
    let report = state
        .control
        .dispatcher()
        .dispatch(Message::new(address, body.args))?;
    Ok(Json(DispatchResponse {
        matched: report.matched,
        delivered: report.delivered.iter().map(|d| d.to_string()).collect(),
    }))
}

/// `GET /api/events/{id}`: SSE stream of one destination's browser events
pub async fn events(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    debug!(destination = %id, "Event stream subscriber connected");
    let stream = BroadcastStream::new(state.control.hub().subscribe()).filter_map(move |result| {
        match result {
            Ok(event) if event.destination.as_str() == id => Some(
                Event::default()
                    .event(event.event_name.clone())
                    .json_data(&event),
            ),
            Ok(_) => None,
            Err(lagged) => {
                debug!(destination = %id, error = %lagged, "Event stream subscriber lagged");
                None
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `GET /api/stats`
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let sinks: serde_json::Map<String, Value> = state
        .control
        .metrics()
        .into_iter()
        .map(|(id, snapshot)| {
            (
                id.to_string(),
                serde_json::to_value(snapshot).unwrap_or(Value::Null),
            )
        })
        .collect();
    Json(json!({
        "bindings": state.control.registry().len(),
        "subscribers": state.control.hub().subscriber_count(),
        "sinks": sinks,
    }))
}
