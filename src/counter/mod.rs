/*!
 * Guarded Counter
 *
 * One `i64` behind a reader/writer lock. Reads run concurrently, adds are
 * serialized, and nobody ever sees a value mid-add.
 */

mod config;

pub use config::{
    CounterConfig, ENV_FAIRNESS, ENV_INITIAL, ENV_READ_DELAY_MS, ENV_WRITE_DELAY_MS,
};

use crate::core::errors::{CounterError, CounterResult};
use crate::core::sync::{LockState, LockStatsSnapshot, ReadGuard, RwLock, WriteGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Integer counter with shared reads and exclusive adds
///
/// Share it between threads with `Arc<GuardedCounter>`.
///
/// # Examples
///
/// ```
/// use guarded_counter::{CounterConfig, GuardedCounter};
///
/// let counter = GuardedCounter::with_config(CounterConfig::instant());
/// counter.add(10).unwrap();
/// counter.add(-3).unwrap();
/// assert_eq!(counter.read(), 7);
/// ```
#[derive(Debug)]
pub struct GuardedCounter {
    value: RwLock<i64>,
    config: CounterConfig,
}

impl GuardedCounter {
    /// Counter at 0 with the default simulated costs
    pub fn new() -> Self {
        Self::with_config(CounterConfig::default())
    }

    pub fn with_config(config: CounterConfig) -> Self {
        Self {
            value: RwLock::with_config(config.initial, config.lock),
            config,
        }
    }

    /// Read the current value under shared access
    pub fn read(&self) -> i64 {
        self.observe(self.value.read())
    }

    /// Add `delta` under exclusive access
    ///
    /// Overflow is an error and leaves the value unchanged.
    pub fn add(&self, delta: i64) -> CounterResult<()> {
        self.apply(self.value.write(), delta)
    }

    /// Like [`read`](Self::read), giving up if shared access isn't granted within `timeout`
    pub fn read_for(&self, timeout: Duration) -> CounterResult<i64> {
        let guard = self.value.read_for(timeout)?;
        Ok(self.observe(guard))
    }

    /// Like [`add`](Self::add), giving up if exclusive access isn't granted within `timeout`
    pub fn add_for(&self, delta: i64, timeout: Duration) -> CounterResult<()> {
        let guard = self.value.write_for(timeout)?;
        self.apply(guard, delta)
    }

    pub fn lock_state(&self) -> LockState {
        self.value.state()
    }

    pub fn stats(&self) -> LockStatsSnapshot {
        self.value.stats()
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    fn observe(&self, guard: ReadGuard<'_, i64>) -> i64 {
        simulate_cost(self.config.read_delay);
        let value = *guard;
        debug!(value, "counter read");
        value
    }

    fn apply(&self, mut guard: WriteGuard<'_, i64>, delta: i64) -> CounterResult<()> {
        info!(delta, "writer entering critical section");
        simulate_cost(self.config.write_delay);

        let value = *guard;
        let next = value
            .checked_add(delta)
            .ok_or(CounterError::Overflow { value, delta })?;
        *guard = next;

        info!(delta, value = next, "writer applied delta");
        Ok(())
    }
}

impl Default for GuardedCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn simulate_cost(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
