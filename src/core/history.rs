//! Capped record of the positions a machine has moved through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Default number of entries kept before the oldest are evicted.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// Record of a single executed transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The state id transitioned from.
    pub from: String,
    /// The state id transitioned to.
    pub to: String,
    /// Trigger label of the edge, if it carried one.
    pub trigger: Option<String>,
    /// When the transition committed.
    pub timestamp: DateTime<Utc>,
}

/// Ordered, capped history of a machine's movement.
///
/// Tracks both the sequence of entered state ids (the `state_history`
/// projection used by snapshots) and full [`TransitionRecord`]s for
/// diagnostics. Once the cap is reached the oldest entries are evicted first.
///
/// # Example
///
/// ```rust
/// use statecraft::core::{StateHistory, TransitionRecord};
/// use chrono::Utc;
///
/// let mut history = StateHistory::new();
/// history.record_entry("closed");
/// history.record_transition(TransitionRecord {
///     from: "closed".to_string(),
///     to: "open".to_string(),
///     trigger: Some("door.opened".to_string()),
///     timestamp: Utc::now(),
/// });
/// history.record_entry("open");
///
/// assert_eq!(history.entered_ids(), vec!["closed", "open"]);
/// assert_eq!(history.records().len(), 1);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateHistory {
    entered: VecDeque<String>,
    records: VecDeque<TransitionRecord>,
    capacity: usize,
}

impl StateHistory {
    /// Create an empty history with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create an empty history evicting past `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entered: VecDeque::new(),
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record that a state was entered.
    pub fn record_entry(&mut self, id: impl Into<String>) {
        self.entered.push_back(id.into());
        while self.entered.len() > self.capacity {
            self.entered.pop_front();
        }
    }

    /// Record an executed transition.
    pub fn record_transition(&mut self, record: TransitionRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    /// The sequence of entered state ids, oldest first.
    pub fn entered_ids(&self) -> Vec<String> {
        self.entered.iter().cloned().collect()
    }

    /// Full transition records, oldest first.
    pub fn records(&self) -> &VecDeque<TransitionRecord> {
        &self.records
    }

    /// Elapsed time between the first and last recorded transition.
    /// `None` with fewer than one record.
    pub fn duration(&self) -> Option<Duration> {
        let first = self.records.front()?;
        let last = self.records.back()?;
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    /// Number of transition records kept.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether any transitions were recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entered.clear();
        self.records.clear();
    }
}

impl Default for StateHistory {
    fn default() -> Self {
        Self::new()
    }
}
