//! Event bus boundary for the state machine engine.
//!
//! The engine consumes an event bus rather than owning one: a bus handle is
//! injected into [`StateMachine`](crate::core::StateMachine) construction and
//! carried by the [`StateContext`](crate::core::StateContext). Only the
//! boundary contract lives here - listeners declare the event types they
//! handle, dispatch is a synchronous fan-out, and delivery order between
//! listeners is deliberately unspecified.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Outcome of delivering an event to a listener or a running machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event was consumed.
    Handled,
    /// The event was observed but not consumed; delivery continues.
    Continue,
    /// Handling failed. The failure is reported, never propagated as a panic.
    Error,
}

/// An event carried through the bus.
///
/// Events are identified by a free-form `event_type` string and may carry an
/// arbitrary data mapping.
///
/// # Example
///
/// ```rust
/// use statecraft::events::Event;
/// use serde_json::json;
///
/// let event = Event::new("door.opened").with_data("actor", json!("player"));
/// assert_eq!(event.event_type(), "door.opened");
/// assert_eq!(event.data.get("actor"), Some(&json!("player")));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Free-form event type identifier, e.g. `"door.opened"`.
    pub event_type: String,
    /// Arbitrary payload mapping.
    pub data: HashMap<String, Value>,
}

impl Event {
    /// Create an event with an empty payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: HashMap::new(),
        }
    }

    /// Attach a payload entry.
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Get the event type.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({})", self.event_type)
    }
}

/// A listener registered on the bus.
///
/// Listeners take `&self`; any mutable state they keep must use interior
/// mutability because dispatch may happen from an arbitrary call stack.
pub trait EventListener: Send + Sync {
    /// Event types this listener wants. An empty list subscribes to all types.
    fn handled_events(&self) -> Vec<String>;

    /// Deliver one event.
    fn on_event(&self, event: &Event) -> EventOutcome;
}

/// Handle returned by [`EventBus::register_listener`], used to deregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

struct BusInner {
    listeners: Vec<(ListenerId, Arc<dyn EventListener>)>,
}

/// A synchronous event bus.
///
/// The bus is a cheap-to-clone handle; clones share the same listener set.
/// Dispatch snapshots the listener list before delivering, so a listener may
/// register further listeners or dispatch follow-up events without
/// deadlocking.
///
/// # Example
///
/// ```rust
/// use statecraft::events::{Event, EventBus, EventListener, EventOutcome};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// struct Counter(AtomicUsize);
///
/// impl EventListener for Counter {
///     fn handled_events(&self) -> Vec<String> {
///         vec!["turn.ended".to_string()]
///     }
///
///     fn on_event(&self, _event: &Event) -> EventOutcome {
///         self.0.fetch_add(1, Ordering::SeqCst);
///         EventOutcome::Handled
///     }
/// }
///
/// let bus = EventBus::new();
/// let counter = Arc::new(Counter(AtomicUsize::new(0)));
/// bus.register_listener(counter.clone());
///
/// bus.dispatch(&Event::new("turn.ended"));
/// bus.dispatch(&Event::new("door.opened")); // not subscribed, not delivered
///
/// assert_eq!(counter.0.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener, returning an id that can deregister it later.
    pub fn register_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        inner.listeners.push((id, listener));
        id
    }

    /// Remove a previously registered listener. Returns whether it was found.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        let before = inner.listeners.len();
        inner.listeners.retain(|(lid, _)| *lid != id);
        inner.listeners.len() != before
    }

    /// Dispatch an event to every listener that declared its type.
    ///
    /// Returns the number of listeners the event was delivered to. Listener
    /// errors are logged and do not stop delivery to the remaining listeners.
    pub fn dispatch(&self, event: &Event) -> usize {
        let targets: Vec<Arc<dyn EventListener>> = {
            let inner = self.inner.lock().expect("event bus lock poisoned");
            inner
                .listeners
                .iter()
                .filter(|(_, l)| {
                    let handled = l.handled_events();
                    handled.is_empty() || handled.iter().any(|t| t == &event.event_type)
                })
                .map(|(_, l)| Arc::clone(l))
                .collect()
        };

        let mut delivered = 0;
        for listener in targets {
            match listener.on_event(event) {
                EventOutcome::Error => {
                    log::error!("listener failed handling '{}'", event.event_type);
                }
                EventOutcome::Handled | EventOutcome::Continue => {}
            }
            delivered += 1;
        }
        delivered
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .expect("event bus lock poisoned")
            .listeners
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
