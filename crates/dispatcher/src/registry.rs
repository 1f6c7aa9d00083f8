//! Client Registry - ordered set of bindings
//!
//! Readers take an `Arc<[Binding]>` snapshot and iterate it without holding
//! the lock. Writers rebuild the slice and swap it in, so a dispatch pass
//! always sees one consistent generation.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use contracts::{Binding, DestinationId, RelayError, Transform};
use tracing::{debug, instrument};

/// Registry of destination bindings, in insertion order
#[derive(Debug)]
pub struct Registry {
    bindings: RwLock<Arc<[Binding]>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Create a registry pre-populated with `bindings`
    ///
    /// Later duplicates replace earlier ones in place.
    pub fn with_bindings(bindings: impl IntoIterator<Item = Binding>) -> Self {
        let registry = Self::new();
        let mut next: Vec<Binding> = Vec::new();
        for binding in bindings {
            upsert(&mut next, binding);
        }
        if let Ok(mut guard) = registry.bindings.write() {
            *guard = Arc::from(next);
        }
        registry
    }

    /// Insert or replace the binding for `binding.destination`
    ///
    /// A replaced binding keeps its original position.
    #[instrument(name = "registry_register", skip(self, binding), fields(destination = %binding.destination))]
    pub fn register(&self, binding: Binding) -> Result<(), RelayError> {
        let len = self.mutate(|bindings| {
            upsert(bindings, binding);
        })?;
        debug!(bindings = len, "binding registered");
        Ok(())
    }

    /// Parse `filter` and register the resulting binding
    ///
    /// # Errors
    /// `InvalidFilter` for malformed filter syntax; the registry is unchanged.
    pub fn register_raw(
        &self,
        destination: impl Into<DestinationId>,
        filter: &str,
        transform: Transform,
        reply_to: Option<SocketAddr>,
    ) -> Result<Binding, RelayError> {
        let binding = Binding::parse(destination, filter, transform)?.with_reply_to(reply_to);
        self.register(binding.clone())?;
        Ok(binding)
    }

    /// Remove the binding for `destination`
    ///
    /// Returns `Ok(false)` when nothing was registered under that id.
    #[instrument(name = "registry_unregister", skip(self))]
    pub fn unregister(&self, destination: &str) -> Result<bool, RelayError> {
        let mut removed = false;
        self.mutate(|bindings| {
            let before = bindings.len();
            bindings.retain(|b| b.destination != *destination);
            removed = bindings.len() != before;
        })?;
        debug!(removed, "unregister processed");
        Ok(removed)
    }

    /// Current bindings in insertion order
    pub fn list(&self) -> Result<Vec<Binding>, RelayError> {
        Ok(self.snapshot()?.to_vec())
    }

    /// Binding registered under `destination`, if any
    pub fn get(&self, destination: &str) -> Result<Option<Binding>, RelayError> {
        Ok(self
            .snapshot()?
            .iter()
            .find(|b| b.destination == *destination)
            .cloned())
    }

    /// Immutable view of the current generation
    pub fn snapshot(&self) -> Result<Arc<[Binding]>, RelayError> {
        self.bindings
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| RelayError::registry_unavailable("registry lock poisoned"))
    }

    /// Number of registered bindings
    pub fn len(&self) -> usize {
        self.snapshot().map(|s| s.len()).unwrap_or(0)
    }

    /// Whether no binding is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutate(&self, f: impl FnOnce(&mut Vec<Binding>)) -> Result<usize, RelayError> {
        let mut guard = self
            .bindings
            .write()
            .map_err(|_| RelayError::registry_unavailable("registry lock poisoned"))?;
        let mut next = guard.to_vec();
        f(&mut next);
        let len = next.len();
        *guard = Arc::from(next);
        observability::record_registry_size(len);
        Ok(len)
    }
}

fn upsert(bindings: &mut Vec<Binding>, binding: Binding) {
    match bindings
        .iter_mut()
        .find(|b| b.destination == binding.destination)
    {
        Some(slot) => *slot = binding,
        None => bindings.push(binding),
    }
}
