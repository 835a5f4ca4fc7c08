//! The state machine engine proper: states, context, and the tick loop.
//!
//! This module contains the machine's explicit state and deterministic
//! transition resolution:
//! - [`State`] and the [`StateBehavior`] lifecycle contract
//! - [`StateContext`], the shared data bag of one machine run
//! - [`StateMachine`], owning the registry and the transition table
//! - [`StateHistory`], the capped record of machine movement

mod context;
mod error;
mod history;
mod machine;
mod state;

pub use context::StateContext;
pub use error::MachineError;
pub use history::{StateHistory, TransitionRecord, DEFAULT_HISTORY_CAPACITY};
pub use machine::{MachineStats, StateMachine};
pub use state::{NoopBehavior, State, StateBehavior, StateResult};
