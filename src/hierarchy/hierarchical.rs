//! A state that embeds a nested machine.

use crate::core::{NoopBehavior, StateBehavior, StateContext, StateMachine, StateResult};
use crate::events::Event;
use std::sync::Arc;
use std::time::Duration;

type ChildHook = Arc<dyn Fn(&str, &mut StateContext) + Send + Sync>;

/// A [`StateBehavior`] that drives an embedded child [`StateMachine`].
///
/// Modeled as composition rather than subclassing: the hierarchical state
/// *holds* its own inner behavior plus a child machine, and mirrors the
/// child's lifecycle onto the parent's. The child machine's lifetime is
/// strictly nested inside the parent's - entering the parent starts the
/// child at its default state, exiting the parent stops it.
///
/// Child change detection is polling-based: once per `on_update` tick the
/// child machine's current state id is compared against the last tracked
/// one, firing the `on_child_exit`/`on_child_enter` hooks on change.
///
/// # Example
///
/// ```rust
/// use statecraft::core::{State, StateMachine};
/// use statecraft::hierarchy::HierarchicalState;
///
/// let mut combat = StateMachine::new("combat");
/// combat.add_state(State::new("player_turn")).unwrap();
/// combat.add_state(State::new("enemy_turn")).unwrap();
///
/// let behavior = HierarchicalState::new(combat).with_default_child("player_turn");
///
/// let mut game = StateMachine::new("game");
/// game.add_state(State::with_behavior("combat", behavior)).unwrap();
/// game.start("combat").unwrap();
/// ```
pub struct HierarchicalState {
    inner: Box<dyn StateBehavior>,
    child: StateMachine,
    default_child: Option<String>,
    tracked_child: Option<String>,
    propagate_events: bool,
    on_child_enter: Option<ChildHook>,
    on_child_exit: Option<ChildHook>,
}

impl HierarchicalState {
    /// Wrap a child machine with no inner behavior of its own.
    pub fn new(child: StateMachine) -> Self {
        Self::wrapping(NoopBehavior, child)
    }

    /// Wrap a child machine around an inner behavior; the inner behavior
    /// always runs before the child machine is driven.
    pub fn wrapping(inner: impl StateBehavior + 'static, child: StateMachine) -> Self {
        Self {
            inner: Box::new(inner),
            child,
            default_child: None,
            tracked_child: None,
            propagate_events: true,
            on_child_enter: None,
            on_child_exit: None,
        }
    }

    /// Child state to start the embedded machine at when the parent enters.
    pub fn with_default_child(mut self, id: impl Into<String>) -> Self {
        self.default_child = Some(id.into());
        self
    }

    /// Whether unconsumed events flow into the child machine (default true).
    pub fn propagate_events(mut self, propagate: bool) -> Self {
        self.propagate_events = propagate;
        self
    }

    /// Hook fired (with the parent's context) when a child becomes active.
    pub fn on_child_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &mut StateContext) + Send + Sync + 'static,
    {
        self.on_child_enter = Some(Arc::new(hook));
        self
    }

    /// Hook fired (with the parent's context) when a child stops being active.
    pub fn on_child_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &mut StateContext) + Send + Sync + 'static,
    {
        self.on_child_exit = Some(Arc::new(hook));
        self
    }

    /// The embedded child machine.
    pub fn child(&self) -> &StateMachine {
        &self.child
    }

    /// Mutable access to the embedded child machine (for registering states
    /// and transitions before the parent is wired into a live machine).
    pub fn child_mut(&mut self) -> &mut StateMachine {
        &mut self.child
    }

    /// Id of the child state currently tracked as active.
    pub fn current_child(&self) -> Option<&str> {
        self.tracked_child.as_deref()
    }

    fn fire_child_exit(&mut self, id: &str, ctx: &mut StateContext) {
        if let Some(hook) = &self.on_child_exit {
            hook(id, ctx);
        }
    }

    fn fire_child_enter(&mut self, id: &str, ctx: &mut StateContext) {
        if let Some(hook) = &self.on_child_enter {
            hook(id, ctx);
        }
    }

    /// Compare the child machine's current state against the tracked one and
    /// fire hooks on change.
    fn poll_child_change(&mut self, ctx: &mut StateContext) {
        let now = self.child.current_state_id().map(str::to_string);
        if now != self.tracked_child {
            if let Some(old) = self.tracked_child.take() {
                self.fire_child_exit(&old, ctx);
            }
            if let Some(new) = &now {
                let new = new.clone();
                self.fire_child_enter(&new, ctx);
            }
            self.tracked_child = now;
        }
    }
}

impl StateBehavior for HierarchicalState {
    /// Inner enter first, then start the child machine at its default state.
    /// A child start failure fails the whole enter - no partial success.
    fn on_enter(&mut self, ctx: &mut StateContext) -> StateResult {
        let result = self.inner.on_enter(ctx);
        if result == StateResult::Error {
            return StateResult::Error;
        }

        if let Some(default_child) = self.default_child.clone() {
            if !self.child.is_running() {
                if let Err(err) = self.child.start(&default_child) {
                    log::error!(
                        "child machine '{}' failed to start at '{}': {}",
                        self.child.machine_id(),
                        default_child,
                        err
                    );
                    return StateResult::Error;
                }
                self.tracked_child = Some(default_child.clone());
                self.fire_child_enter(&default_child, ctx);
            }
        }
        result
    }

    /// Inner update, then drive the child machine and poll for child change.
    fn on_update(&mut self, ctx: &mut StateContext, dt: Duration) -> StateResult {
        let result = self.inner.on_update(ctx, dt);
        if result == StateResult::Error {
            return StateResult::Error;
        }

        if self.child.is_running() {
            self.child.update(dt);
        }
        self.poll_child_change(ctx);
        result
    }

    /// Stop the child machine first (firing a final child-exit), then run the
    /// inner exit.
    fn on_exit(&mut self, ctx: &mut StateContext) -> StateResult {
        if self.child.is_running() {
            self.child.stop();
        }
        if let Some(old) = self.tracked_child.take() {
            self.fire_child_exit(&old, ctx);
        }
        self.inner.on_exit(ctx)
    }

    /// The parent's own handler runs first; the child machine sees the event
    /// only when the parent reports `Continue` and propagation is enabled.
    /// Child-change hooks do not fire here; detection is polled once per
    /// update tick.
    fn on_event(&mut self, event: &Event, ctx: &mut StateContext) -> StateResult {
        let result = self.inner.on_event(event, ctx);
        if result == StateResult::Continue && self.propagate_events && self.child.is_running() {
            self.child.handle_event(event);
        }
        result
    }
}
