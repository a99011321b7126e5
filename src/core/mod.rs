/*!
 * Core Module
 * Synchronization primitives and error handling
 */

pub mod errors;
pub mod sync;

// Re-export for convenience
pub use errors::*;
pub use sync::{
    FairnessPolicy, LockConfig, LockMode, LockState, LockStatsSnapshot, ReadGuard, RwLock,
    WriteGuard,
};
