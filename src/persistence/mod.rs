//! Snapshot-based persistence of machine position.
//!
//! [`StatePersistence`] produces and consumes [`StateSnapshot`]s through a
//! pluggable [`StorageBackend`]. Snapshots capture position and context data,
//! never the state/transition object graph - callers re-register an
//! identical configuration before restoring.

mod backend;
mod error;
mod snapshot;

pub use backend::{BackendError, JsonFileBackend, MemoryBackend, StorageBackend};
pub use error::PersistenceError;
pub use snapshot::{StateSnapshot, SNAPSHOT_VERSION};

use crate::core::StateMachine;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Default number of snapshots kept in the in-memory cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 10;

/// Creates, stores, and restores snapshots through a storage backend.
///
/// Recently created snapshots are kept in an in-memory cache; once the cache
/// exceeds its capacity the oldest-by-timestamp entries are evicted.
///
/// # Example
///
/// ```rust
/// use statecraft::core::{State, StateMachine};
/// use statecraft::persistence::{MemoryBackend, StatePersistence};
/// use serde_json::json;
/// use std::collections::HashMap;
/// use std::path::Path;
///
/// let mut machine = StateMachine::new("door");
/// machine.add_state(State::new("closed")).unwrap();
/// machine.add_state(State::new("open")).unwrap();
/// machine.start("closed").unwrap();
/// machine.context_mut().set("locked", json!(true));
///
/// let mut persistence = StatePersistence::new(MemoryBackend::new());
/// let snapshot = persistence.create_snapshot(&machine, HashMap::new());
/// persistence.save_snapshot(&snapshot, Path::new("slot1")).unwrap();
///
/// let loaded = persistence.load_snapshot(Path::new("slot1")).unwrap();
/// persistence.restore_state_machine(&mut machine, &loaded).unwrap();
/// assert_eq!(machine.current_state_id(), Some("closed"));
/// assert_eq!(machine.context().get("locked"), Some(&json!(true)));
/// ```
pub struct StatePersistence {
    backend: Box<dyn StorageBackend>,
    cache: Vec<StateSnapshot>,
    cache_capacity: usize,
}

impl StatePersistence {
    /// Create a persistence layer over the given backend.
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            cache: Vec::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Override the snapshot cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity.max(1);
        self
    }

    /// Capture a snapshot of the machine and add it to the cache.
    pub fn create_snapshot(
        &mut self,
        machine: &StateMachine,
        custom_data: HashMap<String, Value>,
    ) -> StateSnapshot {
        let snapshot = StateSnapshot::capture(machine, custom_data);
        self.cache.push(snapshot.clone());
        while self.cache.len() > self.cache_capacity {
            let oldest = self
                .cache
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.timestamp)
                .map(|(index, _)| index)
                .expect("cache is non-empty");
            self.cache.remove(oldest);
        }
        snapshot
    }

    /// Serialize a snapshot and hand it to the backend.
    pub fn save_snapshot(
        &self,
        snapshot: &StateSnapshot,
        path: &Path,
    ) -> Result<(), PersistenceError> {
        let value =
            serde_json::to_value(snapshot).map_err(|source| PersistenceError::Serialization {
                operation: "serialize",
                source,
            })?;
        self.backend
            .save(&value, path)
            .map_err(|source| PersistenceError::Backend {
                operation: "save",
                path: path.to_path_buf(),
                source,
            })
    }

    /// Load a snapshot from the backend and validate it.
    pub fn load_snapshot(&self, path: &Path) -> Result<StateSnapshot, PersistenceError> {
        let value = self
            .backend
            .load(path)
            .map_err(|source| PersistenceError::Backend {
                operation: "load",
                path: path.to_path_buf(),
                source,
            })?;
        let snapshot: StateSnapshot =
            serde_json::from_value(value).map_err(|source| PersistenceError::Serialization {
                operation: "deserialize",
                source,
            })?;
        if !snapshot.is_valid() {
            return Err(PersistenceError::InvalidSnapshot(format!(
                "machine_id '{}', version '{}'",
                snapshot.machine_id, snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Whether the backend holds data at `path`.
    pub fn exists(&self, path: &Path) -> bool {
        self.backend.exists(path)
    }

    /// Delete stored data at `path`. Returns whether anything was removed.
    pub fn delete_snapshot(&self, path: &Path) -> Result<bool, PersistenceError> {
        self.backend
            .delete(path)
            .map_err(|source| PersistenceError::Backend {
                operation: "delete",
                path: path.to_path_buf(),
                source,
            })
    }

    /// Restore a machine to a snapshot's position.
    ///
    /// The machine must already carry the same set of states and transitions
    /// it had at capture time; the snapshot holds position only. If the
    /// machine is running it is stopped; if the snapshot has a current state
    /// and the machine had been running, the machine is restarted there -
    /// this *re-runs* `enter()`, so entry side effects fire again (a
    /// re-entry, not a silent resume). Context data is then replaced
    /// wholesale with the snapshot's copy, so the snapshot wins over any
    /// entry side effects.
    pub fn restore_state_machine(
        &self,
        machine: &mut StateMachine,
        snapshot: &StateSnapshot,
    ) -> Result<(), PersistenceError> {
        if !snapshot.is_valid() {
            return Err(PersistenceError::InvalidSnapshot(format!(
                "machine_id '{}', version '{}'",
                snapshot.machine_id, snapshot.version
            )));
        }
        if snapshot.machine_id != machine.machine_id() {
            log::warn!(
                "restoring snapshot of '{}' into machine '{}'",
                snapshot.machine_id,
                machine.machine_id()
            );
        }

        let was_running = machine.is_running();
        if was_running {
            machine.stop();
        }

        if was_running {
            if let Some(current) = &snapshot.current_state_id {
                machine
                    .start(current)
                    .map_err(|source| PersistenceError::Restore {
                        state: current.clone(),
                        source,
                    })?;
            }
        }

        machine.replace_context_data(snapshot.context_data.clone());
        machine.set_previous(snapshot.previous_state_id.clone());
        machine.restore_stats(snapshot.stats.clone());
        Ok(())
    }

    /// Snapshots currently cached, in creation order.
    pub fn cached(&self) -> &[StateSnapshot] {
        &self.cache
    }

    /// Most recent cached snapshot for a machine id.
    pub fn latest_for(&self, machine_id: &str) -> Option<&StateSnapshot> {
        self.cache
            .iter()
            .filter(|s| s.machine_id == machine_id)
            .max_by_key(|s| s.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::State;
    use crate::transitions::StateTransition;
    use serde_json::json;

    fn door_machine() -> StateMachine {
        let mut machine = StateMachine::new("door");
        machine.add_state(State::new("closed")).unwrap();
        machine.add_state(State::new("open")).unwrap();
        machine
            .add_transition(StateTransition::new("closed", "open").on_trigger("door.opened"))
            .unwrap();
        machine
    }

    #[test]
    fn snapshot_save_load_restore_round_trips() {
        let mut machine = door_machine();
        machine.start("closed").unwrap();
        machine.transition_to("open", false).unwrap();
        machine.context_mut().set("locked", json!(false));
        machine.context_mut().set("keys", json!(["brass", "iron"]));

        let mut persistence = StatePersistence::new(MemoryBackend::new());
        let snapshot = persistence.create_snapshot(&machine, HashMap::new());
        persistence
            .save_snapshot(&snapshot, Path::new("slot1"))
            .unwrap();

        // Mutate past the capture point, then restore.
        machine.context_mut().set("locked", json!(true));
        machine.context_mut().set("extra", json!(1));

        let loaded = persistence.load_snapshot(Path::new("slot1")).unwrap();
        persistence
            .restore_state_machine(&mut machine, &loaded)
            .unwrap();

        assert_eq!(machine.current_state_id(), Some("open"));
        assert_eq!(machine.previous_state_id(), Some("closed"));
        assert_eq!(machine.context().get("locked"), Some(&json!(false)));
        assert_eq!(machine.context().get("keys"), Some(&json!(["brass", "iron"])));
        assert!(machine.context().get("extra").is_none());
        assert_eq!(machine.stats().transitions_executed, 1);
    }

    #[test]
    fn restore_reenters_the_current_state() {
        use crate::core::{StateBehavior, StateContext, StateResult};

        struct CountingEnter;
        impl StateBehavior for CountingEnter {
            fn on_enter(&mut self, ctx: &mut StateContext) -> StateResult {
                let count = ctx.get("enters").and_then(|v| v.as_i64()).unwrap_or(0);
                ctx.set("enters", json!(count + 1));
                StateResult::Continue
            }
        }

        let mut machine = StateMachine::new("door");
        machine
            .add_state(State::with_behavior("closed", CountingEnter))
            .unwrap();
        machine.start("closed").unwrap();

        let mut persistence = StatePersistence::new(MemoryBackend::new());
        let snapshot = persistence.create_snapshot(&machine, HashMap::new());
        persistence
            .restore_state_machine(&mut machine, &snapshot)
            .unwrap();

        // enter() ran again on restore, but the snapshot's context copy
        // (taken after the first enter) wins the wholesale replace.
        assert_eq!(machine.context().get("enters"), Some(&json!(1)));
        assert!(machine.is_running());
    }

    #[test]
    fn restore_leaves_a_stopped_machine_stopped() {
        let mut machine = door_machine();
        machine.start("closed").unwrap();

        let mut persistence = StatePersistence::new(MemoryBackend::new());
        let snapshot = persistence.create_snapshot(&machine, HashMap::new());

        machine.stop();
        persistence
            .restore_state_machine(&mut machine, &snapshot)
            .unwrap();

        assert!(!machine.is_running());
        assert_eq!(machine.current_state_id(), None);
        // Context data is still replaced.
        assert_eq!(machine.context().data(), &snapshot.context_data);
    }

    #[test]
    fn invalid_snapshots_are_rejected() {
        let mut machine = door_machine();
        machine.start("closed").unwrap();

        let persistence = StatePersistence::new(MemoryBackend::new());
        let mut snapshot = StateSnapshot::capture(&machine, HashMap::new());
        snapshot.version = "99.0".to_string();

        let err = persistence
            .restore_state_machine(&mut machine, &snapshot)
            .unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidSnapshot(_)));
    }

    #[test]
    fn load_wraps_backend_failures_with_operation_and_path() {
        let persistence = StatePersistence::new(MemoryBackend::new());
        let err = persistence.load_snapshot(Path::new("missing")).unwrap_err();
        match err {
            PersistenceError::Backend {
                operation, path, ..
            } => {
                assert_eq!(operation, "load");
                assert_eq!(path, Path::new("missing"));
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[test]
    fn cache_evicts_oldest_beyond_capacity() {
        let mut machine = door_machine();
        machine.start("closed").unwrap();

        let mut persistence =
            StatePersistence::new(MemoryBackend::new()).with_cache_capacity(3);
        for turn in 0..5 {
            machine.context_mut().set("turn", json!(turn));
            persistence.create_snapshot(&machine, HashMap::new());
        }

        assert_eq!(persistence.cached().len(), 3);
        let turns: Vec<i64> = persistence
            .cached()
            .iter()
            .map(|s| s.context_data["turn"].as_i64().unwrap())
            .collect();
        assert_eq!(turns, vec![2, 3, 4]);

        let latest = persistence.latest_for("door").unwrap();
        assert_eq!(latest.context_data["turn"], json!(4));
        assert!(persistence.latest_for("elsewhere").is_none());
    }

    #[test]
    fn restore_fails_when_states_are_missing() {
        let mut machine = door_machine();
        machine.start("closed").unwrap();
        machine.transition_to("open", false).unwrap();

        let mut persistence = StatePersistence::new(MemoryBackend::new());
        let snapshot = persistence.create_snapshot(&machine, HashMap::new());

        // A machine without the captured state cannot take the position.
        let mut other = StateMachine::new("door");
        other.add_state(State::new("closed")).unwrap();
        other.start("closed").unwrap();

        let err = persistence
            .restore_state_machine(&mut other, &snapshot)
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Restore { .. }));
    }
}
