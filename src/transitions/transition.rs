//! The declarative edge between two states.

use crate::core::StateContext;
use crate::transitions::action::TransitionAction;
use crate::transitions::guard::TransitionGuard;

/// A guarded, prioritized edge `from -> to`.
///
/// Transitions are registered per from-state and kept sorted by priority
/// (descending), ties broken by registration order. The first transition
/// whose guards all pass is taken - first match, not best match.
///
/// # Example
///
/// ```rust
/// use statecraft::core::StateContext;
/// use statecraft::transitions::{StateTransition, TransitionGuard};
/// use serde_json::json;
///
/// let edge = StateTransition::new("alive", "dead")
///     .with_guard(TransitionGuard::data_entry("hp", json!(0)))
///     .with_priority(10);
///
/// let mut ctx = StateContext::new();
/// assert!(!edge.guards_pass(&ctx));
/// ctx.set("hp", json!(0));
/// assert!(edge.guards_pass(&ctx));
/// ```
#[derive(Clone, Debug)]
pub struct StateTransition {
    /// Source state id.
    pub from: String,
    /// Target state id.
    pub to: String,
    /// Optional trigger label, e.g. the event type that arms the edge.
    pub trigger: Option<String>,
    /// Guards that must all pass. Empty means always allowed.
    pub guards: Vec<TransitionGuard>,
    /// Actions run in order once the transition commits.
    pub actions: Vec<TransitionAction>,
    /// Resolution priority; higher wins, ties resolve by registration order.
    pub priority: i32,
}

impl StateTransition {
    /// Create an unguarded, priority-0 edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            trigger: None,
            guards: Vec::new(),
            actions: Vec::new(),
            priority: 0,
        }
    }

    /// Attach a trigger label.
    pub fn on_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Append a guard.
    pub fn with_guard(mut self, guard: TransitionGuard) -> Self {
        self.guards.push(guard);
        self
    }

    /// Append an action.
    pub fn with_action(mut self, action: TransitionAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether every guard passes for the current context.
    pub fn guards_pass(&self, ctx: &StateContext) -> bool {
        self.guards
            .iter()
            .all(|g| g.can_transition(&self.from, &self.to, ctx))
    }
}
