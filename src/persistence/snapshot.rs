//! Serializable capture of a machine's position.

use crate::core::{MachineStats, StateMachine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// A capture of machine *position*, not of the state/transition object graph.
///
/// A snapshot holds where the machine is (`current_state_id`,
/// `previous_state_id`, entered-state history), a deep copy of the context
/// data, the machine's counters, and free-form caller data. Restoring
/// requires the caller to re-register an identical set of states and
/// transitions first.
///
/// On the wire this projects to a JSON object with a numeric millisecond
/// `timestamp`; everything else is stringly keyed.
///
/// # Example
///
/// ```rust
/// use statecraft::core::{State, StateMachine};
/// use statecraft::persistence::StateSnapshot;
/// use std::collections::HashMap;
///
/// let mut machine = StateMachine::new("door");
/// machine.add_state(State::new("closed")).unwrap();
/// machine.start("closed").unwrap();
///
/// let snapshot = StateSnapshot::capture(&machine, HashMap::new());
/// assert!(snapshot.is_valid());
/// assert_eq!(snapshot.current_state_id.as_deref(), Some("closed"));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Id of the machine this snapshot was taken from.
    pub machine_id: String,
    /// When the snapshot was taken (milliseconds on the wire).
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Snapshot format version.
    pub version: String,
    /// Current state id, `None` when the machine was not positioned.
    pub current_state_id: Option<String>,
    /// Previous state id, if any transition had committed.
    pub previous_state_id: Option<String>,
    /// Deep copy of the context data at capture time.
    pub context_data: HashMap<String, Value>,
    /// Sequence of entered state ids.
    pub state_history: Vec<String>,
    /// Machine counters at capture time.
    pub stats: MachineStats,
    /// Free-form caller-supplied data.
    pub custom_data: HashMap<String, Value>,
}

impl StateSnapshot {
    /// Capture a machine's position and context data.
    pub fn capture(machine: &StateMachine, custom_data: HashMap<String, Value>) -> Self {
        Self {
            machine_id: machine.machine_id().to_string(),
            timestamp: Utc::now(),
            version: SNAPSHOT_VERSION.to_string(),
            current_state_id: machine.current_state_id().map(str::to_string),
            previous_state_id: machine.previous_state_id().map(str::to_string),
            context_data: machine.context().data().clone(),
            state_history: machine.history().entered_ids(),
            stats: machine.stats().clone(),
            custom_data,
        }
    }

    /// Whether the snapshot can be restored: machine id set and the version
    /// is one this crate understands.
    pub fn is_valid(&self) -> bool {
        !self.machine_id.is_empty() && self.version == SNAPSHOT_VERSION
    }
}
