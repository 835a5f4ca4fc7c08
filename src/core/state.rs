//! States and the behavior contract their lifecycle hooks follow.

use crate::core::context::StateContext;
use crate::events::Event;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Result of a state lifecycle hook.
///
/// Failure is part of the signature: hooks report `Error` instead of
/// panicking, and the machine converts it into a logged fault rather than a
/// crash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateResult {
    /// Keep going; nothing to request.
    Continue,
    /// The state requests that the machine evaluate its outgoing transitions.
    Transition,
    /// Request to push a nested state (for stack-driven callers; the engine
    /// itself treats this like `Continue`).
    Push,
    /// Request to pop back to the previous stacked state (see `Push`).
    Pop,
    /// The hook failed. The machine logs the fault and stays alive.
    Error,
}

/// Behavior attached to a registered state.
///
/// All hooks default to no-op/`Continue`, so thin policy states implement
/// only what they need. Side effects are permitted only inside
/// `on_enter`/`on_exit`/`on_update`.
///
/// # Example
///
/// ```rust
/// use statecraft::core::{StateBehavior, StateContext, StateResult};
/// use serde_json::json;
///
/// struct Healing;
///
/// impl StateBehavior for Healing {
///     fn on_enter(&mut self, ctx: &mut StateContext) -> StateResult {
///         ctx.set("healing", json!(true));
///         StateResult::Continue
///     }
///
///     fn on_exit(&mut self, ctx: &mut StateContext) -> StateResult {
///         ctx.set("healing", json!(false));
///         StateResult::Continue
///     }
/// }
/// ```
pub trait StateBehavior: Send {
    /// Called when the state becomes current.
    fn on_enter(&mut self, _ctx: &mut StateContext) -> StateResult {
        StateResult::Continue
    }

    /// Called when the state stops being current.
    fn on_exit(&mut self, _ctx: &mut StateContext) -> StateResult {
        StateResult::Continue
    }

    /// Called once per machine tick while current.
    fn on_update(&mut self, _ctx: &mut StateContext, _dt: Duration) -> StateResult {
        StateResult::Continue
    }

    /// Called when the machine forwards an event while current.
    fn on_event(&mut self, _event: &Event, _ctx: &mut StateContext) -> StateResult {
        StateResult::Continue
    }
}

/// The no-op behavior used by plain policy states.
#[derive(Debug, Default)]
pub struct NoopBehavior;

impl StateBehavior for NoopBehavior {}

/// A registered unit of behavior with engine-owned bookkeeping.
///
/// The engine tracks activity flags and timing; the attached
/// [`StateBehavior`] supplies the lifecycle logic. States are reused across
/// many enter/exit cycles and destroyed only by explicit removal.
///
/// # Example
///
/// ```rust
/// use statecraft::core::State;
/// use serde_json::json;
///
/// let state = State::new("player_turn")
///     .named("Player turn")
///     .with_metadata("layer", json!("combat"));
///
/// assert_eq!(state.id(), "player_turn");
/// assert_eq!(state.name(), "Player turn");
/// assert!(!state.is_active());
/// assert!(state.duration().is_none()); // never entered
/// ```
pub struct State {
    id: String,
    name: String,
    behavior: Box<dyn StateBehavior>,
    active: bool,
    paused: bool,
    enter_time: Option<Instant>,
    exit_time: Option<Instant>,
    time_active: Duration,
    metadata: HashMap<String, Value>,
}

impl State {
    /// Create a plain state with no behavior of its own.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_behavior(id, NoopBehavior)
    }

    /// Create a state driven by the given behavior.
    pub fn with_behavior(id: impl Into<String>, behavior: impl StateBehavior + 'static) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            behavior: Box::new(behavior),
            active: false,
            paused: false,
            enter_time: None,
            exit_time: None,
            time_active: Duration::ZERO,
            metadata: HashMap::new(),
        }
    }

    /// Set a human-readable name (defaults to the id).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Unique id within the owning machine.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this state is currently entered.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether lifecycle callbacks are currently suspended.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Metadata mapping.
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Total time this state has been active across all enter/exit cycles.
    pub fn time_active(&self) -> Duration {
        self.time_active
    }

    /// Duration of the current activation while active, or of the most recent
    /// one once exited. `None` before the first entry.
    pub fn duration(&self) -> Option<Duration> {
        let entered = self.enter_time?;
        if self.active {
            Some(entered.elapsed())
        } else {
            self.exit_time.map(|exited| exited - entered)
        }
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub(crate) fn enter(&mut self, ctx: &mut StateContext) -> StateResult {
        let result = self.behavior.on_enter(ctx);
        if result != StateResult::Error {
            self.active = true;
            self.paused = false;
            self.enter_time = Some(Instant::now());
            self.exit_time = None;
        }
        result
    }

    pub(crate) fn exit(&mut self, ctx: &mut StateContext) -> StateResult {
        let result = self.behavior.on_exit(ctx);
        if result != StateResult::Error {
            let now = Instant::now();
            if let Some(entered) = self.enter_time {
                self.time_active += now - entered;
            }
            self.exit_time = Some(now);
            self.active = false;
        }
        result
    }

    pub(crate) fn update(&mut self, ctx: &mut StateContext, dt: Duration) -> StateResult {
        self.behavior.on_update(ctx, dt)
    }

    pub(crate) fn handle_event(&mut self, event: &Event, ctx: &mut StateContext) -> StateResult {
        self.behavior.on_event(event, ctx)
    }

    /// Force-clear the activity flags without running exit logic. Used when a
    /// machine is stopped after a failed exit left the state inconsistent.
    pub(crate) fn deactivate(&mut self) {
        self.active = false;
        self.paused = false;
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("paused", &self.paused)
            .field("time_active", &self.time_active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Flagging;

    impl StateBehavior for Flagging {
        fn on_enter(&mut self, ctx: &mut StateContext) -> StateResult {
            ctx.set("entered", json!(true));
            StateResult::Continue
        }

        fn on_exit(&mut self, ctx: &mut StateContext) -> StateResult {
            ctx.set("exited", json!(true));
            StateResult::Continue
        }
    }

    struct FailingEnter;

    impl StateBehavior for FailingEnter {
        fn on_enter(&mut self, _ctx: &mut StateContext) -> StateResult {
            StateResult::Error
        }
    }

    #[test]
    fn enter_and_exit_drive_behavior_and_flags() {
        let mut ctx = StateContext::new();
        let mut state = State::with_behavior("s", Flagging);

        assert_eq!(state.enter(&mut ctx), StateResult::Continue);
        assert!(state.is_active());
        assert_eq!(ctx.get("entered"), Some(&json!(true)));

        assert_eq!(state.exit(&mut ctx), StateResult::Continue);
        assert!(!state.is_active());
        assert_eq!(ctx.get("exited"), Some(&json!(true)));
    }

    #[test]
    fn failed_enter_leaves_state_inactive() {
        let mut ctx = StateContext::new();
        let mut state = State::with_behavior("s", FailingEnter);

        assert_eq!(state.enter(&mut ctx), StateResult::Error);
        assert!(!state.is_active());
        assert!(state.duration().is_none());
    }

    #[test]
    fn duration_covers_active_and_exited_phases() {
        let mut ctx = StateContext::new();
        let mut state = State::new("s");
        assert!(state.duration().is_none());

        state.enter(&mut ctx);
        std::thread::sleep(Duration::from_millis(5));
        let live = state.duration().unwrap();
        assert!(live >= Duration::from_millis(5));

        state.exit(&mut ctx);
        let settled = state.duration().unwrap();
        assert!(settled >= live);
        // A second read after exit is stable.
        assert_eq!(state.duration().unwrap(), settled);
    }

    #[test]
    fn time_active_accumulates_across_cycles() {
        let mut ctx = StateContext::new();
        let mut state = State::new("s");

        for _ in 0..2 {
            state.enter(&mut ctx);
            std::thread::sleep(Duration::from_millis(2));
            state.exit(&mut ctx);
        }

        assert!(state.time_active() >= Duration::from_millis(4));
    }

    #[test]
    fn default_hooks_are_noops() {
        let mut ctx = StateContext::new();
        let mut state = State::new("s");
        assert_eq!(
            state.update(&mut ctx, Duration::from_millis(16)),
            StateResult::Continue
        );
        assert_eq!(
            state.handle_event(&Event::new("anything"), &mut ctx),
            StateResult::Continue
        );
    }
}
