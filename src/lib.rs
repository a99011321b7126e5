/*!
 * Guarded Counter Library
 * A shared counter behind an explicit, fair reader/writer lock
 */

pub mod core;
pub mod counter;
pub mod monitoring;
pub mod simulation;

// Re-exports
pub use crate::core::errors::*;
pub use crate::core::sync::{
    FairnessPolicy, LockConfig, LockMode, LockState, LockStatsSnapshot, ReadGuard, RwLock,
    WriteGuard,
};
pub use counter::{CounterConfig, GuardedCounter};
pub use monitoring::init_tracing;
pub use simulation::{ReaderObservation, ReaderPhase, Simulation, SimulationConfig, SimulationReport};
