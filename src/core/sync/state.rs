/*!
 * Lock State Machine
 *
 * The three states a reader/writer lock can be in, with checked transitions.
 * Holds no waiters and does no blocking; `RwLock` decides *when* a transition
 * is admissible and this type decides *whether* it is legal.
 */

use crate::core::errors::{LockError, LockResult};
use serde::Serialize;
use std::fmt;

/// Access mode requested from the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Many concurrent holders, none may mutate
    Shared,
    /// Exactly one holder, may mutate
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => f.write_str("shared"),
            LockMode::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Current holder state of a reader/writer lock
///
/// # Transitions
///
/// - `Free -> SharedBy(1)`, `SharedBy(n) -> SharedBy(n + 1)` on reader acquire
/// - `SharedBy(n) -> SharedBy(n - 1)`, `SharedBy(1) -> Free` on reader release
/// - `Free -> ExclusiveHeld` on writer acquire
/// - `ExclusiveHeld -> Free` on writer release
///
/// Anything else is a [`LockError::ProtocolViolation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Free,
    /// Held by `n >= 1` readers
    SharedBy(usize),
    ExclusiveHeld,
}

impl LockState {
    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self, LockState::Free)
    }

    #[inline]
    pub fn is_exclusive(&self) -> bool {
        matches!(self, LockState::ExclusiveHeld)
    }

    /// Number of active readers (0 unless shared)
    #[inline]
    pub fn readers(&self) -> usize {
        match self {
            LockState::SharedBy(n) => *n,
            _ => 0,
        }
    }

    /// Whether a reader could join right now, ignoring fairness
    #[inline]
    pub fn can_share(&self) -> bool {
        !self.is_exclusive()
    }

    /// Whether a writer could take the lock right now, ignoring fairness
    #[inline]
    pub fn can_exclude(&self) -> bool {
        self.is_free()
    }

    pub fn acquire_shared(&mut self) -> LockResult<()> {
        *self = match *self {
            LockState::Free => LockState::SharedBy(1),
            LockState::SharedBy(n) => LockState::SharedBy(n + 1),
            LockState::ExclusiveHeld => return Err(self.violation("acquire_shared")),
        };
        Ok(())
    }

    pub fn release_shared(&mut self) -> LockResult<()> {
        *self = match *self {
            LockState::SharedBy(1) => LockState::Free,
            LockState::SharedBy(n) if n > 1 => LockState::SharedBy(n - 1),
            _ => return Err(self.violation("release_shared")),
        };
        Ok(())
    }

    pub fn acquire_exclusive(&mut self) -> LockResult<()> {
        match *self {
            LockState::Free => {
                *self = LockState::ExclusiveHeld;
                Ok(())
            }
            _ => Err(self.violation("acquire_exclusive")),
        }
    }

    pub fn release_exclusive(&mut self) -> LockResult<()> {
        match *self {
            LockState::ExclusiveHeld => {
                *self = LockState::Free;
                Ok(())
            }
            _ => Err(self.violation("release_exclusive")),
        }
    }

    fn violation(&self, operation: &'static str) -> LockError {
        LockError::ProtocolViolation {
            operation,
            state: *self,
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Free => f.write_str("Free"),
            LockState::SharedBy(n) => write!(f, "SharedBy({})", n),
            LockState::ExclusiveHeld => f.write_str("ExclusiveHeld"),
        }
    }
}
