//! Named event handlers
//!
//! One handler per event name. Dispatch clones the handler out of the
//! registry and releases the lock before running it, so a handler may
//! trigger, register or remove events itself.

use crate::value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Handler invoked when an event is triggered
pub type EventCallback = Arc<dyn Fn(&[Value]) + Send + Sync + 'static>;

#[derive(Default)]
pub(crate) struct EventRegistry {
    handlers: RwLock<HashMap<String, EventCallback>>,
}

impl EventRegistry {
    /// Register `handler` for `name`, returning whether one was replaced
    pub(crate) fn set(&self, name: String, handler: EventCallback) -> bool {
        self.handlers.write().insert(name, handler).is_some()
    }

    /// Remove the handler for `name`, returning whether one existed
    pub(crate) fn remove(&self, name: &str) -> bool {
        self.handlers.write().remove(name).is_some()
    }

    pub(crate) fn get(&self, name: &str) -> Option<EventCallback> {
        self.handlers.read().get(name).cloned()
    }

    /// Run the handler for `name` with `params`
    ///
    /// Returns false when no handler is registered.
    pub(crate) fn trigger(&self, name: &str, params: &[Value]) -> bool {
        let Some(handler) = self.get(name) else {
            trace!(event = %name, "No handler registered");
            return false;
        };
        trace!(event = %name, params = params.len(), "Dispatching event");
        handler(params);
        true
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.handlers.read().len()
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let mut names: Vec<_> = handlers.keys().collect();
        names.sort();
        f.debug_struct("EventRegistry").field("events", &names).finish()
    }
}
