//! Statecraft: an embeddable hierarchical state machine engine.
//!
//! Statecraft drives turn-based control flow: an external driver owns the
//! loop and calls into the machine once per turn, while the machine owns
//! state lifecycle, guarded and prioritized transitions, hierarchical
//! composition, and snapshot persistence of its position.
//!
//! # Core Concepts
//!
//! - **State**: a unit of behavior with enter/exit/update/event hooks
//! - **Transition**: a declarative, guarded, prioritized edge between states
//! - **Context**: the mutable data bag shared by one machine run
//! - **Snapshot**: a serializable capture of position and context data
//!
//! # Example
//!
//! ```rust
//! use statecraft::core::{State, StateMachine};
//! use statecraft::transitions::{StateTransition, TransitionGuard};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let mut machine = StateMachine::new("door");
//! machine.add_state(State::new("closed")).unwrap();
//! machine.add_state(State::new("open")).unwrap();
//! machine.add_state(State::new("locked")).unwrap();
//!
//! // Edges are evaluated priority-first; the first passing guard set wins.
//! machine
//!     .add_transition(
//!         StateTransition::new("closed", "locked")
//!             .with_guard(TransitionGuard::data_entry("bolt", json!("thrown")))
//!             .with_priority(10),
//!     )
//!     .unwrap();
//! machine
//!     .add_transition(StateTransition::new("closed", "open").with_priority(5))
//!     .unwrap();
//!
//! machine.start("closed").unwrap();
//! machine.context_mut().set("bolt", json!("thrown"));
//! machine.update(Duration::from_millis(16));
//! assert_eq!(machine.current_state_id(), Some("locked"));
//! ```

pub mod core;
pub mod events;
pub mod hierarchy;
pub mod persistence;
pub mod transitions;

// Re-export commonly used types
pub use crate::core::{
    MachineError, MachineStats, State, StateBehavior, StateContext, StateHistory, StateMachine,
    StateResult,
};
pub use crate::events::{Event, EventBus, EventListener, EventOutcome};
pub use crate::hierarchy::{CompositeState, HierarchicalState, StateHierarchy};
pub use crate::persistence::{StatePersistence, StateSnapshot, StorageBackend};
pub use crate::transitions::{StateTransition, TransitionAction, TransitionGuard};
