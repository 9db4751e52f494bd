//! Event-kind → handler table for inbound frames.

use std::collections::HashMap;
use std::sync::Arc;

use frames::{EventKind, Frame};

/// Callback invoked with each inbound frame of the kind it is registered for.
pub type Handler = Arc<dyn Fn(&Frame) + Send + Sync>;

/// At most one handler per [`EventKind`]; registering again replaces.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Handler>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`. Returns `true` if it replaced one.
    pub fn insert(&mut self, kind: EventKind, handler: Handler) -> bool {
        self.handlers.insert(kind, handler).is_some()
    }

    /// Returns `true` if a handler was registered.
    pub fn remove(&mut self, kind: &EventKind) -> bool {
        self.handlers.remove(kind).is_some()
    }

    #[must_use]
    pub fn get(&self, kind: &EventKind) -> Option<Handler> {
        self.handlers.get(kind).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
