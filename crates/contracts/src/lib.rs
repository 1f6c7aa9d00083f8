//! # Contracts
//!
//! Frozen interface contracts shared by every relay crate: message model,
//! bindings, sink/source traits, configuration blueprint and errors.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Data flow
//! external source -> inbound listener -> dispatcher (consults registry) -> sink adapter

mod binding;
mod blueprint;
mod destination_id;
mod error;
mod filter;
mod lifecycle;
mod message;
mod message_source;
mod sink;

pub use binding::*;
pub use blueprint::*;
pub use destination_id::DestinationId;
pub use error::*;
pub use filter::AddressFilter;
pub use lifecycle::{Lifecycle, LifecycleState, LocalLifecycle};
pub use message::*;
pub use message_source::{MessageCallback, MessageSource};
pub use sink::*;
