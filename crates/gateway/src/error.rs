//! Gateway error types and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use contracts::RelayError;
use dispatcher::DispatcherError;
use ingestion::IngestionError;
use thiserror::Error;

/// Errors returned by HTTP handlers
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request body is missing a required field
    #[error("{0}")]
    BadRequest(String),

    /// No destination with this id or event name
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    #[error(transparent)]
    Midi(#[from] IngestionError),
}

impl GatewayError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Relay(e) | Self::Dispatcher(DispatcherError::Relay(e)) => relay_status(e),
            Self::Dispatcher(DispatcherError::SinkCreation { .. }) => StatusCode::BAD_REQUEST,
            Self::Dispatcher(DispatcherError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Midi(IngestionError::UnknownMidiOutput { .. }) => StatusCode::NOT_FOUND,
            Self::Midi(IngestionError::Malformed { .. }) => StatusCode::BAD_REQUEST,
            Self::Midi(IngestionError::MidiPort { .. }) => StatusCode::BAD_GATEWAY,
            Self::Midi(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn relay_status(error: &RelayError) -> StatusCode {
    match error {
        RelayError::InvalidFilter { .. }
        | RelayError::ConfigValidation { .. }
        | RelayError::ConfigParse { .. }
        | RelayError::MalformedMessage { .. } => StatusCode::BAD_REQUEST,
        RelayError::DestinationNotFound { .. } => StatusCode::NOT_FOUND,
        RelayError::NoReplyAddress { .. } => StatusCode::CONFLICT,
        RelayError::RegistryUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
