/*!
 * Synchronization Primitives
 *
 * A reader/writer lock implemented as an explicit state machine:
 * - `LockState`: the legal holder states and checked transitions
 * - `RwLock`: admission (fairness), parking and waking on top of it
 * - `ReadGuard` / `WriteGuard`: scoped release on every exit path
 *
 * # Architecture
 *
 * Lock bookkeeping sits behind a `parking_lot::Mutex`; waiters park on one
 * `parking_lot::Condvar` per mode. The protected value is only reachable
 * through a guard.
 *
 * # Fairness
 *
 * Writer-preferring (arrival-ordered) by default, strict FIFO on request.
 * See [`FairnessPolicy`].
 */

mod config;
mod guard;
mod rwlock;
mod state;
mod stats;

pub use config::{FairnessPolicy, LockConfig};
pub use guard::{ReadGuard, WriteGuard};
pub use rwlock::RwLock;
pub use state::{LockMode, LockState};
pub use stats::{LockStats, LockStatsSnapshot};
