//! Layered error definitions
//!
//! Categorized by source: config / wire / registry / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum RelayError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Wire Errors =====
    /// Inbound datagram could not be decoded
    #[error("malformed message: {reason}")]
    MalformedMessage { reason: String },

    // ===== Registry Errors =====
    /// Filter string rejected at registration
    #[error("invalid filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    /// Registry lock poisoned or torn down
    #[error("registry unavailable: {message}")]
    RegistryUnavailable { message: String },

    /// No binding registered under this destination id
    #[error("destination not found: {destination}")]
    DestinationNotFound { destination: String },

    /// Destination has no reply address for outbound sends
    #[error("destination '{destination}' has no reply address")]
    NoReplyAddress { destination: String },

    // ===== Sink Errors =====
    /// Delivery to a single destination failed
    #[error("delivery to '{destination}' failed: {message}")]
    SinkDelivery {
        destination: String,
        message: String,
    },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create malformed message error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Create invalid filter error
    pub fn invalid_filter(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    /// Create registry unavailable error
    pub fn registry_unavailable(message: impl Into<String>) -> Self {
        Self::RegistryUnavailable {
            message: message.into(),
        }
    }

    /// Create sink delivery error
    pub fn sink_delivery(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkDelivery {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Create destination not found error
    pub fn destination_not_found(destination: impl Into<String>) -> Self {
        Self::DestinationNotFound {
            destination: destination.into(),
        }
    }
}
