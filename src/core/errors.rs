/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use super::sync::{LockMode, LockState};
use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Result type for counter operations
pub type CounterResult<T> = Result<T, CounterError>;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for simulation runs
pub type SimulationResult<T> = Result<T, SimulationError>;

/// Reader/writer lock errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum LockError {
    /// A release or acquire that the current state does not allow.
    /// Always a bug in the lock itself; never retried.
    #[error("Lock protocol violation: {operation} while {state}")]
    #[diagnostic(
        code(lock::protocol_violation),
        help("The lock bookkeeping is corrupted. This is a bug in the lock, not in the caller.")
    )]
    ProtocolViolation {
        operation: &'static str,
        state: LockState,
    },

    #[error("Timed out after {waited:?} waiting for {mode} access")]
    #[diagnostic(
        code(lock::timeout),
        help("The request was withdrawn and left no trace in the lock. Retry or raise the timeout.")
    )]
    Timeout { mode: LockMode, waited: Duration },
}

impl LockError {
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }
}

/// Guarded counter errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum CounterError {
    #[error("Adding {delta} to {value} overflows the counter")]
    #[diagnostic(
        code(counter::overflow),
        help("The counter was left unchanged. Use a smaller delta.")
    )]
    Overflow { value: i64, delta: i64 },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lock(#[from] LockError),
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    #[diagnostic(
        code(config::invalid_value),
        help("Fix or unset the environment variable.")
    )]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Simulation driver errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SimulationError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Counter(#[from] CounterError),

    #[error("Simulation task failed: {0}")]
    #[diagnostic(
        code(simulation::task_failed),
        help("A reader or writer task panicked or was cancelled. Check the logs.")
    )]
    TaskFailed(String),
}
