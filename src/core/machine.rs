//! The state machine: registry, transition table, and tick loop.

use crate::core::context::StateContext;
use crate::core::error::MachineError;
use crate::core::history::{StateHistory, TransitionRecord};
use crate::core::state::{State, StateResult};
use crate::events::{Event, EventBus, EventOutcome};
use crate::transitions::StateTransition;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Counters and per-state timing kept by a machine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineStats {
    /// Committed transitions, including forced ones.
    pub transitions_executed: u64,
    /// Successful state entries, including the initial one.
    pub states_entered: u64,
    /// Cumulative active time per state id, in seconds, accrued on exit.
    pub state_durations_secs: HashMap<String, f64>,
}

impl MachineStats {
    fn accrue(&mut self, id: &str, duration: Duration) {
        *self.state_durations_secs.entry(id.to_string()).or_insert(0.0) +=
            duration.as_secs_f64();
    }
}

/// A single-threaded, cooperatively driven state machine.
///
/// The machine owns a set of [`State`]s and a priority-ordered transition
/// table. An external driver calls [`start`](Self::start),
/// [`update`](Self::update), [`handle_event`](Self::handle_event), and
/// [`transition_to`](Self::transition_to); each call runs to completion
/// before the next. Per from-state, transitions are evaluated in strict
/// priority order (ties broken by registration order) and the first edge
/// whose guards all pass is taken - for a fixed configuration and
/// deterministic guards, resolution is fully deterministic.
///
/// # Example
///
/// ```rust
/// use statecraft::core::{State, StateMachine};
/// use statecraft::transitions::StateTransition;
///
/// let mut machine = StateMachine::new("door");
/// machine.add_state(State::new("closed")).unwrap();
/// machine.add_state(State::new("open")).unwrap();
/// machine.add_transition(StateTransition::new("closed", "open")).unwrap();
///
/// machine.start("closed").unwrap();
/// assert_eq!(machine.current_state_id(), Some("closed"));
///
/// assert!(machine.transition_to("open", false).unwrap());
/// assert_eq!(machine.current_state_id(), Some("open"));
/// assert_eq!(machine.previous_state_id(), Some("closed"));
/// ```
pub struct StateMachine {
    machine_id: String,
    states: HashMap<String, State>,
    transitions: HashMap<String, Vec<StateTransition>>,
    current: Option<String>,
    previous: Option<String>,
    running: bool,
    context: StateContext,
    stats: MachineStats,
    history: StateHistory,
    bus: Option<EventBus>,
}

impl StateMachine {
    /// Create an empty machine.
    pub fn new(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            states: HashMap::new(),
            transitions: HashMap::new(),
            current: None,
            previous: None,
            running: false,
            context: StateContext::new(),
            stats: MachineStats::default(),
            history: StateHistory::new(),
            bus: None,
        }
    }

    /// Inject an event bus handle. The handle is carried into every fresh
    /// context so actions can dispatch and event transitions can listen.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The machine's id, used in logs and snapshots.
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Whether the machine has been started and not stopped.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Id of the current state. `None` when not running, and transiently
    /// after a mid-transition failure (see [`transition_to`](Self::transition_to)).
    pub fn current_state_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Id of the previously current state, if any transition has committed.
    pub fn previous_state_id(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// The context of the current run.
    pub fn context(&self) -> &StateContext {
        &self.context
    }

    /// Mutable access to the context of the current run.
    pub fn context_mut(&mut self) -> &mut StateContext {
        &mut self.context
    }

    /// Counters and per-state timing.
    pub fn stats(&self) -> &MachineStats {
        &self.stats
    }

    /// Movement history of the current and past runs.
    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    /// The injected bus handle, if any.
    pub fn event_bus(&self) -> Option<&EventBus> {
        self.bus.as_ref()
    }

    /// Look up a registered state.
    pub fn state(&self, id: &str) -> Option<&State> {
        self.states.get(id)
    }

    /// Whether a state id is registered.
    pub fn has_state(&self, id: &str) -> bool {
        self.states.contains_key(id)
    }

    /// Ids of every registered state, in no particular order.
    pub fn state_ids(&self) -> Vec<&str> {
        self.states.keys().map(String::as_str).collect()
    }

    /// Registered transitions out of `from`, in evaluation order.
    pub fn transitions_from(&self, from: &str) -> &[StateTransition] {
        self.transitions.get(from).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Register a state.
    pub fn add_state(&mut self, state: State) -> Result<(), MachineError> {
        if self.states.contains_key(state.id()) {
            return Err(MachineError::DuplicateState(state.id().to_string()));
        }
        self.states.insert(state.id().to_string(), state);
        Ok(())
    }

    /// Remove a state, pruning every transition that references it.
    ///
    /// Fails when the state is current; a running machine never loses the
    /// state under its feet.
    pub fn remove_state(&mut self, id: &str) -> Result<State, MachineError> {
        if self.current.as_deref() == Some(id) {
            return Err(MachineError::RemoveCurrent(id.to_string()));
        }
        let state = self
            .states
            .remove(id)
            .ok_or_else(|| MachineError::UnknownState(id.to_string()))?;

        self.transitions.remove(id);
        for edges in self.transitions.values_mut() {
            edges.retain(|t| t.to != id);
        }
        if self.previous.as_deref() == Some(id) {
            self.previous = None;
        }
        Ok(state)
    }

    /// Register a transition. Both endpoints must already be registered; the
    /// from-state's edge list is re-sorted by priority (descending), with
    /// ties keeping registration order.
    pub fn add_transition(&mut self, transition: StateTransition) -> Result<(), MachineError> {
        if !self.states.contains_key(&transition.from) {
            return Err(MachineError::UnknownState(transition.from.clone()));
        }
        if !self.states.contains_key(&transition.to) {
            return Err(MachineError::UnknownState(transition.to.clone()));
        }
        let edges = self.transitions.entry(transition.from.clone()).or_default();
        edges.push(transition);
        // Stable sort: equal priorities keep their registration order.
        edges.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(())
    }

    /// Start the machine at `initial` with a fresh context.
    ///
    /// If entering the initial state reports an error, the machine rolls
    /// back to not-running - callers never observe a half-started machine.
    pub fn start(&mut self, initial: &str) -> Result<(), MachineError> {
        if self.running {
            return Err(MachineError::AlreadyRunning(self.machine_id.clone()));
        }
        if !self.states.contains_key(initial) {
            return Err(MachineError::UnknownState(initial.to_string()));
        }

        self.context = match &self.bus {
            Some(bus) => StateContext::with_bus(bus.clone()),
            None => StateContext::new(),
        };
        self.context.state_start_time = Some(Instant::now());
        self.running = true;
        self.current = Some(initial.to_string());
        self.previous = None;

        let state = self.states.get_mut(initial).expect("checked above");
        if state.enter(&mut self.context) == StateResult::Error {
            self.running = false;
            self.current = None;
            return Err(MachineError::EnterFailed(initial.to_string()));
        }

        self.stats.states_entered += 1;
        self.history.record_entry(initial);
        log::info!(
            "machine '{}' started in state '{}'",
            self.machine_id,
            initial
        );
        Ok(())
    }

    /// Stop the machine, exiting the current state. Idempotent.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        if let Some(cur) = self.current.take() {
            if let Some(state) = self.states.get_mut(&cur) {
                if state.exit(&mut self.context) == StateResult::Error {
                    log::error!("exit of '{}' failed during stop", cur);
                    state.deactivate();
                } else if let Some(duration) = state.duration() {
                    self.stats.accrue(&cur, duration);
                }
            }
        }
        self.previous = None;
        self.running = false;
        log::info!("machine '{}' stopped", self.machine_id);
    }

    /// Drive one tick: delegate to the current state's `on_update`, then
    /// evaluate the transition table.
    ///
    /// Guard evaluation is level-triggered - it happens on every call so
    /// that timed and event-armed transitions fire lazily; a `Transition`
    /// result from the state goes through the same first-match resolution.
    /// On `Error` the machine stays running with `current` unchanged and no
    /// transition check runs; the fault is logged, not escalated.
    pub fn update(&mut self, dt: Duration) -> StateResult {
        if !self.running {
            log::warn!("update on stopped machine '{}'", self.machine_id);
            return StateResult::Error;
        }
        let Some(cur) = self.current.clone() else {
            log::warn!(
                "update on machine '{}' with no current state",
                self.machine_id
            );
            return StateResult::Error;
        };

        self.context.last_update_time = Some(Instant::now());

        let result = {
            let state = self.states.get_mut(&cur).expect("current is registered");
            if state.is_paused() {
                return StateResult::Continue;
            }
            state.update(&mut self.context, dt)
        };

        if result == StateResult::Error {
            log::error!("update of state '{}' failed", cur);
            return StateResult::Error;
        }

        self.check_transitions();
        result
    }

    /// Forward an event to the current state, then evaluate the transition
    /// table exactly as [`update`](Self::update) does.
    ///
    /// Returns `Handled` when the state consumed the event or a transition
    /// executed, `Error` when the state's handler failed, and `Continue`
    /// otherwise (including when the machine is not running).
    pub fn handle_event(&mut self, event: &Event) -> EventOutcome {
        if !self.running {
            return EventOutcome::Continue;
        }
        let Some(cur) = self.current.clone() else {
            return EventOutcome::Continue;
        };

        self.context.last_update_time = Some(Instant::now());

        let result = {
            let state = self.states.get_mut(&cur).expect("current is registered");
            if state.is_paused() {
                return EventOutcome::Continue;
            }
            state.handle_event(event, &mut self.context)
        };

        if result == StateResult::Error {
            log::error!(
                "state '{}' failed handling event '{}'",
                cur,
                event.event_type
            );
            return EventOutcome::Error;
        }

        let fired = self.check_transitions();
        if fired || result == StateResult::Transition {
            EventOutcome::Handled
        } else {
            EventOutcome::Continue
        }
    }

    /// Request a transition to `target`.
    ///
    /// With `force == false`, only the registered `current -> target` edges
    /// matter: the first one (in priority order) whose own guards pass is
    /// executed. The priority of edges to *other* targets is irrelevant here;
    /// it applies to the automatic evaluation path only. Returns `Ok(false)`
    /// with `current` unchanged when no such edge passes.
    ///
    /// With `force == true`, the edge/guard lookup is bypassed and the
    /// exit/actions/enter sequence runs unconditionally - a matching edge's
    /// actions still run for side-effect completeness when one exists.
    ///
    /// If a later action or the enter of `target` fails after the old state
    /// exited, the machine goes stateless (`current == None`, still running);
    /// the caller must re-`start` or force a transition. There is no
    /// automatic rollback into the exited state.
    pub fn transition_to(&mut self, target: &str, force: bool) -> Result<bool, MachineError> {
        if !self.running {
            return Err(MachineError::NotRunning(self.machine_id.clone()));
        }
        if !self.states.contains_key(target) {
            return Err(MachineError::UnknownState(target.to_string()));
        }

        let from = self.current.clone();
        let edge = from.as_ref().and_then(|cur| {
            self.transitions.get(cur).and_then(|edges| {
                edges
                    .iter()
                    .find(|t| t.to == target && (force || t.guards_pass(&self.context)))
                    .cloned()
            })
        });

        if !force && edge.is_none() {
            return Ok(false);
        }
        Ok(self.run_transition(from, target.to_string(), edge))
    }

    /// Suspend lifecycle callbacks of the current state. While paused the
    /// machine ignores `update` and `handle_event` for that state.
    pub fn pause(&mut self) -> Result<(), MachineError> {
        self.set_current_paused(true)
    }

    /// Resume a paused current state.
    pub fn resume(&mut self) -> Result<(), MachineError> {
        self.set_current_paused(false)
    }

    /// Stop, clear history and stats, and start again at `initial`.
    pub fn reset(&mut self, initial: &str) -> Result<(), MachineError> {
        self.stop();
        self.history.clear();
        self.stats = MachineStats::default();
        self.start(initial)
    }

    fn set_current_paused(&mut self, paused: bool) -> Result<(), MachineError> {
        let cur = self
            .current
            .clone()
            .ok_or_else(|| MachineError::NotRunning(self.machine_id.clone()))?;
        if let Some(state) = self.states.get_mut(&cur) {
            state.set_paused(paused);
        }
        Ok(())
    }

    /// Evaluate the current state's edge list and execute the first
    /// transition whose guards all pass. Returns whether one fired.
    fn check_transitions(&mut self) -> bool {
        let Some(cur) = self.current.clone() else {
            return false;
        };
        let edge = self.transitions.get(&cur).and_then(|edges| {
            edges
                .iter()
                .find(|t| t.guards_pass(&self.context))
                .cloned()
        });
        match edge {
            Some(edge) => {
                let to = edge.to.clone();
                self.run_transition(Some(cur), to, Some(edge))
            }
            None => false,
        }
    }

    /// Execute a committed transition: exit(old) -> actions -> enter(new).
    ///
    /// An exit failure aborts before anything else and leaves `current`
    /// unchanged (the old state's partial exit is caller-visible, never
    /// silently repaired). Failures after a successful exit leave the
    /// machine stateless per the documented policy.
    fn run_transition(
        &mut self,
        from: Option<String>,
        to: String,
        edge: Option<StateTransition>,
    ) -> bool {
        let trigger = edge.as_ref().and_then(|e| e.trigger.clone());

        let mut transition_data = HashMap::new();
        transition_data.insert("from".to_string(), json!(from));
        transition_data.insert("to".to_string(), json!(to));
        transition_data.insert("trigger".to_string(), json!(trigger));
        self.context.set_transition_data(transition_data);

        if let Some(from_id) = &from {
            let state = self.states.get_mut(from_id).expect("current is registered");
            if state.exit(&mut self.context) == StateResult::Error {
                log::error!(
                    "exit of '{}' failed; transition to '{}' aborted",
                    from_id,
                    to
                );
                return false;
            }
            if let Some(duration) = state.duration() {
                self.stats.accrue(from_id, duration);
            }
            self.previous = self.current.take();
        }

        if let Some(edge) = &edge {
            let from_label = from.as_deref().unwrap_or("");
            for action in &edge.actions {
                if let Err(err) = action.execute(from_label, &to, &mut self.context) {
                    log::error!("transition to '{}' failed mid-flight: {}", to, err);
                    return false;
                }
            }
        }

        self.context.state_start_time = Some(Instant::now());
        let state = self.states.get_mut(&to).expect("target is registered");
        if state.enter(&mut self.context) == StateResult::Error {
            log::error!("enter of '{}' failed; machine left stateless", to);
            return false;
        }

        self.current = Some(to.clone());
        self.stats.transitions_executed += 1;
        self.stats.states_entered += 1;
        self.history.record_entry(to.as_str());
        if let Some(from_id) = from {
            log::debug!(
                "machine '{}': {} -> {} (trigger: {:?})",
                self.machine_id,
                from_id,
                to,
                trigger
            );
            self.history.record_transition(TransitionRecord {
                from: from_id,
                to,
                trigger,
                timestamp: Utc::now(),
            });
        }
        true
    }

    pub(crate) fn replace_context_data(&mut self, data: HashMap<String, serde_json::Value>) {
        *self.context.data_mut() = data;
    }

    pub(crate) fn set_previous(&mut self, previous: Option<String>) {
        self.previous = previous;
    }

    pub(crate) fn restore_stats(&mut self, stats: MachineStats) {
        self.stats = stats;
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("machine_id", &self.machine_id)
            .field("current", &self.current)
            .field("previous", &self.previous)
            .field("running", &self.running)
            .field("states", &self.states.len())
            .field(
                "transitions",
                &self.transitions.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}
