//! Event dispatch: ordered, in-process fan-out of decoded session events.

use crate::{
    data::{EventKind, SessionEvent, SessionState},
    error::SdkError,
};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

/// Callback invoked with each decoded event of its registered kind
pub type EventCallback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Callback invoked with surfaced errors (fatal auth, decode failures,
/// observer panics)
pub type ErrorCallback = Arc<dyn Fn(&SdkError) + Send + Sync>;

/// Callback invoked on session state transitions
pub type StateCallback = Arc<dyn Fn(&SessionState) + Send + Sync>;

/// Opaque handle returned by registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

struct Entry<C> {
    id: CallbackId,
    callback: C,
}

/// Ordered multicast dispatcher keyed by event kind.
///
/// Callbacks for a given kind run in registration order. A panicking
/// callback is isolated: it is reported on the error channel and neither the
/// remaining callbacks for that event nor subsequent events are affected.
/// Dispatch is synchronous with frame arrival, so all callbacks for frame N
/// complete before any callback for frame N+1 begins.
pub struct EventDispatcher {
    subscribers: Mutex<HashMap<EventKind, Vec<Entry<EventCallback>>>>,
    error_callbacks: Mutex<Vec<Entry<ErrorCallback>>>,
    state_listeners: Mutex<Vec<Entry<StateCallback>>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            error_callbacks: Mutex::new(Vec::new()),
            state_listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_callback_id(&self) -> CallbackId {
        CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a callback for a specific event kind
    pub fn register(&self, kind: EventKind, callback: EventCallback) -> CallbackId {
        let id = self.next_callback_id();
        self.subscribers
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(Entry { id, callback });
        tracing::debug!(?kind, ?id, "registered event callback");
        id
    }

    /// Unregister a callback; returns whether it was present
    pub fn unregister(&self, kind: EventKind, id: CallbackId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap();
        let Some(callbacks) = subscribers.get_mut(&kind) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|entry| entry.id != id);
        let removed = callbacks.len() < before;
        if callbacks.is_empty() {
            subscribers.remove(&kind);
        }
        removed
    }

    /// Register a callback on the error channel
    pub fn register_error(&self, callback: ErrorCallback) -> CallbackId {
        let id = self.next_callback_id();
        self.error_callbacks
            .lock()
            .unwrap()
            .push(Entry { id, callback });
        id
    }

    pub fn unregister_error(&self, id: CallbackId) -> bool {
        let mut callbacks = self.error_callbacks.lock().unwrap();
        let before = callbacks.len();
        callbacks.retain(|entry| entry.id != id);
        callbacks.len() < before
    }

    /// Register a listener for session state transitions
    pub fn register_state(&self, callback: StateCallback) -> CallbackId {
        let id = self.next_callback_id();
        self.state_listeners
            .lock()
            .unwrap()
            .push(Entry { id, callback });
        id
    }

    pub fn unregister_state(&self, id: CallbackId) -> bool {
        let mut listeners = self.state_listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        listeners.len() < before
    }

    pub fn callback_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver an event to every callback registered for its kind, in
    /// registration order.
    pub fn dispatch(&self, event: &SessionEvent) {
        // Clone the entry list out of the lock so a callback can safely
        // register or unregister without deadlocking.
        let callbacks: Vec<(CallbackId, EventCallback)> = {
            let subscribers = self.subscribers.lock().unwrap();
            subscribers
                .get(&event.kind())
                .map(|entries| {
                    entries
                        .iter()
                        .map(|e| (e.id, Arc::clone(&e.callback)))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(?id, kind = ?event.kind(), "event callback panicked");
                self.dispatch_error(&SdkError::Callback(format!(
                    "callback {:?} panicked while handling {:?}",
                    id,
                    event.kind()
                )));
            }
        }
    }

    /// Report an error on the error channel
    pub fn dispatch_error(&self, error: &SdkError) {
        let callbacks: Vec<ErrorCallback> = {
            let entries = self.error_callbacks.lock().unwrap();
            entries.iter().map(|e| Arc::clone(&e.callback)).collect()
        };
        for callback in callbacks {
            // No panic isolation here: recursing into dispatch_error from a
            // panicking error callback would loop forever.
            callback(error);
        }
    }

    /// Notify state listeners of a transition
    pub fn dispatch_state(&self, state: &SessionState) {
        let callbacks: Vec<(CallbackId, StateCallback)> = {
            let entries = self.state_listeners.lock().unwrap();
            entries
                .iter()
                .map(|e| (e.id, Arc::clone(&e.callback)))
                .collect()
        };
        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
                tracing::error!(?id, "state listener panicked");
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
