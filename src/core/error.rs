//! Configuration errors raised by machine operations.

use thiserror::Error;

/// Errors raised synchronously by [`StateMachine`](crate::core::StateMachine)
/// configuration and control operations.
///
/// These are programmer errors - they propagate to the caller instead of
/// being swallowed. Runtime faults inside state hooks are not represented
/// here; those surface as [`StateResult::Error`](crate::core::StateResult)
/// and keep the machine alive.
#[derive(Debug, Error)]
pub enum MachineError {
    /// A state with this id is already registered.
    #[error("duplicate state id '{0}'")]
    DuplicateState(String),

    /// No state with this id is registered.
    #[error("unknown state id '{0}'")]
    UnknownState(String),

    /// The state is current and cannot be removed while the machine runs it.
    #[error("state '{0}' is the current state and cannot be removed")]
    RemoveCurrent(String),

    /// `start()` was called on a machine that is already running.
    #[error("machine '{0}' is already running")]
    AlreadyRunning(String),

    /// The operation requires a running machine.
    #[error("machine '{0}' is not running")]
    NotRunning(String),

    /// Entering the initial state reported an error; the machine rolled back
    /// to not-running.
    #[error("entering state '{0}' failed; machine was not started")]
    EnterFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_the_offending_id() {
        let err = MachineError::DuplicateState("idle".to_string());
        assert!(err.to_string().contains("idle"));

        let err = MachineError::UnknownState("missing".to_string());
        assert!(err.to_string().contains("missing"));
    }
}
