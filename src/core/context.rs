//! The shared mutable data bag for one machine run.

use crate::events::EventBus;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Mutable context shared by every state, guard, and action of one
/// [`StateMachine`](crate::core::StateMachine) instance.
///
/// A fresh context is created on every `start()`; data written during one run
/// does not survive a stop/start cycle. The context is the only shared
/// mutable resource of a machine - single-threaded discipline is the entire
/// concurrency contract, so no locking is needed or provided.
///
/// # Example
///
/// ```rust
/// use statecraft::core::StateContext;
/// use serde_json::json;
///
/// let mut ctx = StateContext::new();
/// ctx.set("hp", json!(10));
/// assert_eq!(ctx.get("hp"), Some(&json!(10)));
///
/// ctx.remove("hp");
/// assert!(ctx.get("hp").is_none());
/// ```
pub struct StateContext {
    data: HashMap<String, Value>,
    transition_data: HashMap<String, Value>,
    pub(crate) state_start_time: Option<Instant>,
    pub(crate) last_update_time: Option<Instant>,
    bus: Option<EventBus>,
}

impl StateContext {
    /// Create an empty context with no bus handle.
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            transition_data: HashMap::new(),
            state_start_time: None,
            last_update_time: None,
            bus: None,
        }
    }

    /// Create an empty context carrying an event bus handle.
    pub fn with_bus(bus: EventBus) -> Self {
        Self {
            bus: Some(bus),
            ..Self::new()
        }
    }

    /// Store a value under `key`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Remove a value, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// The full data mapping.
    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }

    /// Mutable access to the full data mapping.
    pub fn data_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.data
    }

    /// Data describing the transition currently (or most recently) executing:
    /// the engine writes `from`, `to`, and `trigger` entries when a transition
    /// commits its exit phase.
    pub fn transition_data(&self) -> &HashMap<String, Value> {
        &self.transition_data
    }

    pub(crate) fn set_transition_data(&mut self, entries: HashMap<String, Value>) {
        self.transition_data = entries;
    }

    /// Time elapsed since the current state was entered, if any state is
    /// active.
    pub fn elapsed_in_state(&self) -> Option<Duration> {
        self.state_start_time.map(|t| t.elapsed())
    }

    /// When the machine last ran `update()`, if it has.
    pub fn last_update_time(&self) -> Option<Instant> {
        self.last_update_time
    }

    /// The injected event bus handle, when the machine was built with one.
    pub fn bus(&self) -> Option<&EventBus> {
        self.bus.as_ref()
    }
}

impl Default for StateContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContext")
            .field("data", &self.data)
            .field("transition_data", &self.transition_data)
            .field("state_start_time", &self.state_start_time)
            .field("has_bus", &self.bus.is_some())
            .finish()
    }
}
