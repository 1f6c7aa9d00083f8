//! MessageSource trait - callback-driven inbound source
//!
//! Host-driven inputs (MIDI port callbacks, test generators) push decoded
//! messages through a callback instead of owning a socket.

use std::sync::Arc;

use crate::Message;

/// Message callback type
///
/// Uses `Arc` so the callback can be shared across threads.
pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Callback-driven message source
///
/// # Example
///
/// ```ignore
/// let source: Box<dyn MessageSource> = make_source();
/// source.listen(Arc::new(|message| {
///     println!("received {}", message.address);
/// }));
/// source.stop();
/// ```
pub trait MessageSource: Send + Sync {
    /// Source id (used for logging/metrics)
    fn source_id(&self) -> &str;

    /// Register the callback
    ///
    /// Repeated calls while listening are idempotent.
    fn listen(&self, callback: MessageCallback);

    /// Stop producing messages
    fn stop(&self);

    /// Check if currently listening
    fn is_listening(&self) -> bool;
}
