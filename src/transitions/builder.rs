//! Fluent construction of transitions, plus the pre-packaged guard
//! compositions for conditional, timed, and event-triggered edges.

use crate::core::StateContext;
use crate::events::EventBus;
use crate::transitions::action::TransitionAction;
use crate::transitions::guard::{EventTrigger, TransitionGuard};
use crate::transitions::transition::StateTransition;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when building transitions.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("transition source state not specified; call .from(id)")]
    MissingFromState,

    #[error("transition target state not specified; call .to(id)")]
    MissingToState,
}

/// Builder for constructing transitions with a fluent API.
///
/// # Example
///
/// ```rust
/// use statecraft::transitions::{TransitionBuilder, TransitionGuard};
/// use serde_json::json;
///
/// let edge = TransitionBuilder::new()
///     .from("idle")
///     .to("alert")
///     .guard(TransitionGuard::data_entry("noise", json!(true)))
///     .priority(5)
///     .build()
///     .unwrap();
///
/// assert_eq!(edge.from, "idle");
/// assert_eq!(edge.priority, 5);
/// ```
#[derive(Default)]
pub struct TransitionBuilder {
    from: Option<String>,
    to: Option<String>,
    trigger: Option<String>,
    guards: Vec<TransitionGuard>,
    actions: Vec<TransitionAction>,
    priority: i32,
}

impl TransitionBuilder {
    /// Create a new transition builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source state (required).
    pub fn from(mut self, id: impl Into<String>) -> Self {
        self.from = Some(id.into());
        self
    }

    /// Set the target state (required).
    pub fn to(mut self, id: impl Into<String>) -> Self {
        self.to = Some(id.into());
        self
    }

    /// Attach a trigger label (optional).
    pub fn trigger(mut self, label: impl Into<String>) -> Self {
        self.trigger = Some(label.into());
        self
    }

    /// Append a guard (optional, repeatable).
    pub fn guard(mut self, guard: TransitionGuard) -> Self {
        self.guards.push(guard);
        self
    }

    /// Append a conditional guard from a closure.
    pub fn when<F>(self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&StateContext) -> bool + Send + Sync + 'static,
    {
        self.guard(TransitionGuard::conditional(name, predicate))
    }

    /// Append an action (optional, repeatable).
    pub fn action(mut self, action: TransitionAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Set the priority (defaults to 0).
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Build the transition.
    pub fn build(self) -> Result<StateTransition, BuildError> {
        let from = self.from.ok_or(BuildError::MissingFromState)?;
        let to = self.to.ok_or(BuildError::MissingToState)?;

        Ok(StateTransition {
            from,
            to,
            trigger: self.trigger,
            guards: self.guards,
            actions: self.actions,
            priority: self.priority,
        })
    }
}

/// A transition gated on an arbitrary predicate.
pub fn conditional_transition<F>(
    from: impl Into<String>,
    to: impl Into<String>,
    name: impl Into<String>,
    predicate: F,
) -> StateTransition
where
    F: Fn(&StateContext) -> bool + Send + Sync + 'static,
{
    StateTransition::new(from, to).with_guard(TransitionGuard::conditional(name, predicate))
}

/// A transition that becomes available once the source state has been active
/// for `after`. The guard is lazy - it fires on the first `update` or
/// `handle_event` after the threshold, never from a timer of its own.
pub fn timed_transition(
    from: impl Into<String>,
    to: impl Into<String>,
    after: Duration,
) -> StateTransition {
    StateTransition::new(from, to).with_guard(TransitionGuard::time_elapsed(after))
}

/// A transition armed by an event on the bus.
///
/// Registers a sticky [`EventTrigger`] latch as a bus listener: the latch is
/// set whenever `event_type` is dispatched (on whatever call stack), and the
/// transition fires on the machine's next `update`/`handle_event`. The latch
/// resets when the transition commits - one dispatch fires at most one
/// transition.
///
/// # Example
///
/// ```rust
/// use statecraft::events::EventBus;
/// use statecraft::transitions::event_transition;
///
/// let bus = EventBus::new();
/// let edge = event_transition("closed", "open", "door.opened", &bus);
/// assert_eq!(edge.trigger.as_deref(), Some("door.opened"));
/// assert_eq!(bus.listener_count(), 1);
/// ```
pub fn event_transition(
    from: impl Into<String>,
    to: impl Into<String>,
    event_type: impl Into<String>,
    bus: &EventBus,
) -> StateTransition {
    let event_type = event_type.into();
    let trigger = EventTrigger::new(event_type.clone());
    bus.register_listener(trigger.clone());

    let reset = Arc::clone(&trigger);
    StateTransition::new(from, to)
        .on_trigger(event_type)
        .with_guard(TransitionGuard::event_flag(trigger))
        .with_action(TransitionAction::custom("reset_trigger", move |_, _, _| {
            reset.reset();
            Ok(())
        }))
}
