//! Guard predicates gating transitions.
//!
//! Guards are represented as tagged variants rather than bare callables so a
//! transition table can be inspected and logged meaningfully. Every kind is
//! side-effect free: a guard may read the context but never mutate it.

use crate::core::StateContext;
use crate::events::{Event, EventListener, EventOutcome};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A sticky latch set by the event bus and read by
/// [`TransitionGuard::EventFlag`].
///
/// The latch is level-triggered: a listener callback may set it from any call
/// stack (typically straight from game logic), and it stays set until the
/// owning transition fires during a later `update`/`handle_event`, at which
/// point a commit-time action resets it. Reading the latch is pure; the reset
/// is the transition's side effect, not the guard's.
pub struct EventTrigger {
    event_type: String,
    triggered: AtomicBool,
}

impl EventTrigger {
    /// Create a latch listening for `event_type`.
    pub fn new(event_type: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            event_type: event_type.into(),
            triggered: AtomicBool::new(false),
        })
    }

    /// The event type this latch is armed by.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Whether the latch is currently set.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Clear the latch.
    pub fn reset(&self) {
        self.triggered.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }
}

impl EventListener for EventTrigger {
    fn handled_events(&self) -> Vec<String> {
        vec![self.event_type.clone()]
    }

    fn on_event(&self, _event: &Event) -> EventOutcome {
        self.set();
        EventOutcome::Handled
    }
}

impl fmt::Debug for EventTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTrigger")
            .field("event_type", &self.event_type)
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

type Predicate = Arc<dyn Fn(&StateContext) -> bool + Send + Sync>;

/// A side-effect-free predicate gating a transition.
///
/// An empty guard list on a transition means "always allowed".
///
/// # Example
///
/// ```rust
/// use statecraft::core::StateContext;
/// use statecraft::transitions::TransitionGuard;
/// use serde_json::json;
///
/// let mut ctx = StateContext::new();
/// ctx.set("hp", json!(0));
///
/// let dead = TransitionGuard::conditional("hp_depleted", |ctx| {
///     ctx.get("hp").and_then(|v| v.as_i64()) == Some(0)
/// });
/// assert!(dead.can_transition("alive", "dead", &ctx));
///
/// ctx.set("hp", json!(7));
/// assert!(!dead.can_transition("alive", "dead", &ctx));
/// ```
pub enum TransitionGuard {
    /// An arbitrary named predicate over the context.
    Conditional {
        /// Name shown in logs and debug output.
        name: String,
        /// The predicate itself. Must be deterministic and side-effect free.
        predicate: Predicate,
    },
    /// Passes once the current state has been active at least this long,
    /// measured against the context's state entry mark. Evaluated lazily -
    /// only when the machine ticks, never by an autonomous timer.
    TimeElapsed {
        /// Minimum time in state before the guard passes.
        min: Duration,
    },
    /// Passes when every required key is present in the context data with
    /// exactly the required value.
    DataEquals {
        /// Required key/value pairs.
        required: HashMap<String, Value>,
    },
    /// Passes while the attached latch is set (see [`EventTrigger`]).
    EventFlag {
        /// Latch armed by the event bus.
        trigger: Arc<EventTrigger>,
    },
}

impl TransitionGuard {
    /// Build a [`TransitionGuard::Conditional`].
    pub fn conditional<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&StateContext) -> bool + Send + Sync + 'static,
    {
        Self::Conditional {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Build a [`TransitionGuard::TimeElapsed`].
    pub fn time_elapsed(min: Duration) -> Self {
        Self::TimeElapsed { min }
    }

    /// Build a [`TransitionGuard::DataEquals`] over the given pairs.
    pub fn data_equals(required: HashMap<String, Value>) -> Self {
        Self::DataEquals { required }
    }

    /// Build a [`TransitionGuard::DataEquals`] requiring a single entry.
    pub fn data_entry(key: impl Into<String>, value: Value) -> Self {
        let mut required = HashMap::new();
        required.insert(key.into(), value);
        Self::DataEquals { required }
    }

    /// Build a [`TransitionGuard::EventFlag`] reading the given latch.
    pub fn event_flag(trigger: Arc<EventTrigger>) -> Self {
        Self::EventFlag { trigger }
    }

    /// Evaluate the guard for a prospective `from -> to` transition.
    pub fn can_transition(&self, _from: &str, _to: &str, ctx: &StateContext) -> bool {
        match self {
            Self::Conditional { predicate, .. } => predicate(ctx),
            Self::TimeElapsed { min } => ctx
                .elapsed_in_state()
                .map(|elapsed| elapsed >= *min)
                .unwrap_or(false),
            Self::DataEquals { required } => required
                .iter()
                .all(|(key, value)| ctx.get(key) == Some(value)),
            Self::EventFlag { trigger } => trigger.is_triggered(),
        }
    }
}

impl Clone for TransitionGuard {
    fn clone(&self) -> Self {
        match self {
            Self::Conditional { name, predicate } => Self::Conditional {
                name: name.clone(),
                predicate: Arc::clone(predicate),
            },
            Self::TimeElapsed { min } => Self::TimeElapsed { min: *min },
            Self::DataEquals { required } => Self::DataEquals {
                required: required.clone(),
            },
            Self::EventFlag { trigger } => Self::EventFlag {
                trigger: Arc::clone(trigger),
            },
        }
    }
}

impl fmt::Debug for TransitionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conditional { name, .. } => {
                f.debug_struct("Conditional").field("name", name).finish()
            }
            Self::TimeElapsed { min } => f.debug_struct("TimeElapsed").field("min", min).finish(),
            Self::DataEquals { required } => f
                .debug_struct("DataEquals")
                .field("required", required)
                .finish(),
            Self::EventFlag { trigger } => f
                .debug_struct("EventFlag")
                .field("trigger", trigger)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    #[test]
    fn conditional_guard_evaluates_predicate() {
        let ctx = StateContext::new();
        let always = TransitionGuard::conditional("always", |_| true);
        let never = TransitionGuard::conditional("never", |_| false);
        assert!(always.can_transition("a", "b", &ctx));
        assert!(!never.can_transition("a", "b", &ctx));
    }

    #[test]
    fn time_guard_requires_entry_mark() {
        let mut ctx = StateContext::new();
        let guard = TransitionGuard::time_elapsed(Duration::from_millis(5));

        // No state entered yet.
        assert!(!guard.can_transition("a", "b", &ctx));

        ctx.state_start_time = Some(Instant::now());
        assert!(!guard.can_transition("a", "b", &ctx));

        std::thread::sleep(Duration::from_millis(6));
        assert!(guard.can_transition("a", "b", &ctx));
    }

    #[test]
    fn data_guard_matches_exactly() {
        let mut ctx = StateContext::new();
        ctx.set("phase", json!("night"));
        ctx.set("alarm", json!(true));

        let guard = TransitionGuard::data_entry("phase", json!("night"));
        assert!(guard.can_transition("a", "b", &ctx));

        let mut required = HashMap::new();
        required.insert("phase".to_string(), json!("night"));
        required.insert("alarm".to_string(), json!(false));
        let guard = TransitionGuard::data_equals(required);
        assert!(!guard.can_transition("a", "b", &ctx));
    }

    #[test]
    fn event_flag_follows_the_latch() {
        let ctx = StateContext::new();
        let trigger = EventTrigger::new("door.opened");
        let guard = TransitionGuard::event_flag(trigger.clone());

        assert!(!guard.can_transition("closed", "open", &ctx));
        trigger.on_event(&Event::new("door.opened"));
        assert!(guard.can_transition("closed", "open", &ctx));
        trigger.reset();
        assert!(!guard.can_transition("closed", "open", &ctx));
    }

    #[test]
    fn latch_stays_set_until_reset() {
        let trigger = EventTrigger::new("door.opened");
        trigger.on_event(&Event::new("door.opened"));
        assert!(trigger.is_triggered());
        assert!(trigger.is_triggered()); // reading does not consume
        trigger.reset();
        assert!(!trigger.is_triggered());
    }

    #[test]
    fn guards_are_deterministic() {
        let mut ctx = StateContext::new();
        ctx.set("key", json!(1));
        let guard = TransitionGuard::data_entry("key", json!(1));
        let first = guard.can_transition("a", "b", &ctx);
        let second = guard.can_transition("a", "b", &ctx);
        assert_eq!(first, second);
    }
}
