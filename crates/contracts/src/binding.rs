//! Binding - destination id + filter + transform
//!
//! Bindings are the registry's unit of mutation; each one routes matching
//! messages to exactly one destination.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::{AddressFilter, DestinationId, Message, RelayError};

/// Transformation applied to a message before delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Deliver the message unchanged
    #[default]
    PassThrough,
    /// Remove the filter prefix from the address (`/4/toggle1` -> `/toggle1`)
    StripPrefix,
}

/// Association of one destination with one filter
///
/// Deserialisation goes through the same checks as [`Binding::parse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBinding")]
pub struct Binding {
    /// Unique destination id
    pub destination: DestinationId,

    /// Address filter
    pub filter: AddressFilter,

    /// Transformation before delivery
    #[serde(default)]
    pub transform: Transform,

    /// UDP address for outbound sends to this destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<SocketAddr>,
}

#[derive(Deserialize)]
struct RawBinding {
    destination: DestinationId,
    filter: AddressFilter,
    #[serde(default)]
    transform: Transform,
    #[serde(default)]
    reply_to: Option<SocketAddr>,
}

impl TryFrom<RawBinding> for Binding {
    type Error = RelayError;

    fn try_from(raw: RawBinding) -> Result<Self, Self::Error> {
        Ok(Self::new(raw.destination, raw.filter)
            .with_transform(raw.transform)?
            .with_reply_to(raw.reply_to))
    }
}

impl Binding {
    /// Create a pass-through binding
    pub fn new(destination: impl Into<DestinationId>, filter: AddressFilter) -> Self {
        Self {
            destination: destination.into(),
            filter,
            transform: Transform::PassThrough,
            reply_to: None,
        }
    }

    /// Create a binding from a raw filter string
    ///
    /// # Errors
    /// `InvalidFilter` for malformed filter syntax, or `strip_prefix` on a
    /// non-prefix filter.
    pub fn parse(
        destination: impl Into<DestinationId>,
        filter: &str,
        transform: Transform,
    ) -> Result<Self, RelayError> {
        let filter = AddressFilter::parse(filter)?;
        Self::new(destination, filter).with_transform(transform)
    }

    /// Set the transform, checking it fits the filter
    ///
    /// # Errors
    /// `InvalidFilter` when `StripPrefix` is paired with a non-prefix filter.
    pub fn with_transform(mut self, transform: Transform) -> Result<Self, RelayError> {
        if transform == Transform::StripPrefix && self.filter.prefix().is_none() {
            return Err(RelayError::invalid_filter(
                self.filter.to_string(),
                "strip_prefix requires a prefix filter ending in '/*'",
            ));
        }
        self.transform = transform;
        Ok(self)
    }

    /// Set the reply address
    pub fn with_reply_to(mut self, reply_to: Option<SocketAddr>) -> Self {
        self.reply_to = reply_to;
        self
    }

    /// Whether this binding accepts `message`
    #[inline]
    pub fn matches(&self, message: &Message) -> bool {
        self.filter.matches(&message.address)
    }

    /// Message as the destination should see it
    ///
    /// Pass-through shares the original allocation.
    pub fn apply(&self, message: &Arc<Message>) -> Arc<Message> {
        let stripped = match (self.transform, self.filter.prefix()) {
            (Transform::StripPrefix, Some(prefix)) => message.address.strip_prefix(prefix),
            _ => None,
        };
        match stripped {
            Some(rest) => Arc::new(Message::new(format!("/{rest}"), message.args.clone())),
            None => Arc::clone(message),
        }
    }
}
