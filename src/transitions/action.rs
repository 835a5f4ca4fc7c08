//! Side-effecting routines run once a transition commits.

use crate::core::StateContext;
use crate::events::Event;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a transition action.
#[derive(Debug, Error)]
#[error("action '{name}' failed: {message}")]
pub struct ActionError {
    /// Name of the failing action.
    pub name: String,
    /// What went wrong.
    pub message: String,
}

impl ActionError {
    /// Create an action error.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

type ActionFn = Arc<dyn Fn(&str, &str, &mut StateContext) -> Result<(), ActionError> + Send + Sync>;

/// A routine executed when a transition commits, after the old state exited
/// and before the new state enters. Actions run in registration order and may
/// mutate the context; they must never call back into the owning machine.
///
/// # Example
///
/// ```rust
/// use statecraft::core::StateContext;
/// use statecraft::transitions::TransitionAction;
/// use serde_json::json;
///
/// let mut ctx = StateContext::new();
/// let action = TransitionAction::set_data("door", json!("open"));
/// action.execute("closed", "open", &mut ctx).unwrap();
/// assert_eq!(ctx.get("door"), Some(&json!("open")));
/// ```
pub enum TransitionAction {
    /// Log a message (info level) when the transition fires.
    Log {
        /// Message to log alongside the `from -> to` pair.
        message: String,
    },
    /// Merge entries into the context data.
    SetData {
        /// Entries written into the context, replacing existing keys.
        entries: HashMap<String, Value>,
    },
    /// Dispatch an event through the context's bus handle. Logged and skipped
    /// when the machine was built without a bus.
    DispatchEvent {
        /// Event type to dispatch.
        event_type: String,
        /// Payload of the dispatched event.
        data: HashMap<String, Value>,
    },
    /// An arbitrary named routine.
    Custom {
        /// Name shown in logs and debug output.
        name: String,
        /// The routine itself.
        action: ActionFn,
    },
}

impl TransitionAction {
    /// Build a [`TransitionAction::Log`].
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    /// Build a [`TransitionAction::SetData`] writing a single entry.
    pub fn set_data(key: impl Into<String>, value: Value) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.into(), value);
        Self::SetData { entries }
    }

    /// Build a [`TransitionAction::SetData`] writing several entries.
    pub fn set_entries(entries: HashMap<String, Value>) -> Self {
        Self::SetData { entries }
    }

    /// Build a [`TransitionAction::DispatchEvent`].
    pub fn dispatch_event(event_type: impl Into<String>) -> Self {
        Self::DispatchEvent {
            event_type: event_type.into(),
            data: HashMap::new(),
        }
    }

    /// Build a [`TransitionAction::Custom`].
    pub fn custom<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&str, &str, &mut StateContext) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            action: Arc::new(action),
        }
    }

    /// Run the action for a committed `from -> to` transition.
    pub fn execute(&self, from: &str, to: &str, ctx: &mut StateContext) -> Result<(), ActionError> {
        match self {
            Self::Log { message } => {
                log::info!("{} ({} -> {})", message, from, to);
                Ok(())
            }
            Self::SetData { entries } => {
                for (key, value) in entries {
                    ctx.set(key.clone(), value.clone());
                }
                Ok(())
            }
            Self::DispatchEvent { event_type, data } => {
                match ctx.bus() {
                    Some(bus) => {
                        let mut event = Event::new(event_type.clone());
                        event.data = data.clone();
                        bus.dispatch(&event);
                    }
                    None => {
                        log::warn!(
                            "dispatch of '{}' skipped: machine has no event bus",
                            event_type
                        );
                    }
                }
                Ok(())
            }
            Self::Custom { action, .. } => action(from, to, ctx),
        }
    }
}

impl Clone for TransitionAction {
    fn clone(&self) -> Self {
        match self {
            Self::Log { message } => Self::Log {
                message: message.clone(),
            },
            Self::SetData { entries } => Self::SetData {
                entries: entries.clone(),
            },
            Self::DispatchEvent { event_type, data } => Self::DispatchEvent {
                event_type: event_type.clone(),
                data: data.clone(),
            },
            Self::Custom { name, action } => Self::Custom {
                name: name.clone(),
                action: Arc::clone(action),
            },
        }
    }
}

impl fmt::Debug for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log { message } => f.debug_struct("Log").field("message", message).finish(),
            Self::SetData { entries } => {
                f.debug_struct("SetData").field("entries", entries).finish()
            }
            Self::DispatchEvent { event_type, .. } => f
                .debug_struct("DispatchEvent")
                .field("event_type", event_type)
                .finish(),
            Self::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, EventListener, EventOutcome};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn set_data_merges_entries() {
        let mut ctx = StateContext::new();
        ctx.set("kept", json!(1));

        let mut entries = HashMap::new();
        entries.insert("a".to_string(), json!(1));
        entries.insert("b".to_string(), json!("two"));
        TransitionAction::set_entries(entries)
            .execute("x", "y", &mut ctx)
            .unwrap();

        assert_eq!(ctx.get("kept"), Some(&json!(1)));
        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert_eq!(ctx.get("b"), Some(&json!("two")));
    }

    #[test]
    fn dispatch_event_uses_the_context_bus() {
        struct Seen(AtomicUsize);
        impl EventListener for Seen {
            fn handled_events(&self) -> Vec<String> {
                vec!["turn.ended".to_string()]
            }
            fn on_event(&self, _event: &Event) -> EventOutcome {
                self.0.fetch_add(1, Ordering::SeqCst);
                EventOutcome::Handled
            }
        }

        let bus = EventBus::new();
        let seen = Arc::new(Seen(AtomicUsize::new(0)));
        bus.register_listener(seen.clone());

        let mut ctx = StateContext::with_bus(bus);
        TransitionAction::dispatch_event("turn.ended")
            .execute("a", "b", &mut ctx)
            .unwrap();

        assert_eq!(seen.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_without_bus_is_skipped_not_fatal() {
        let mut ctx = StateContext::new();
        let result = TransitionAction::dispatch_event("x").execute("a", "b", &mut ctx);
        assert!(result.is_ok());
    }

    #[test]
    fn custom_action_failures_carry_the_name() {
        let mut ctx = StateContext::new();
        let action =
            TransitionAction::custom("explode", |_, _, _| Err(ActionError::new("explode", "boom")));
        let err = action.execute("a", "b", &mut ctx).unwrap_err();
        assert_eq!(err.name, "explode");
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn custom_action_sees_endpoints() {
        let mut ctx = StateContext::new();
        TransitionAction::custom("stamp", |from, to, ctx| {
            ctx.set("route", json!(format!("{from}->{to}")));
            Ok(())
        })
        .execute("closed", "open", &mut ctx)
        .unwrap();
        assert_eq!(ctx.get("route"), Some(&json!("closed->open")));
    }
}
