/*!
 * Client Simulation
 *
 * Drives a shared counter the way a busy server would see it: a wave of
 * readers, a few writers, then readers that arrive after the writers.
 * Every reader/writer runs on tokio's blocking pool because the counter
 * blocks its caller while waiting for the lock.
 */

use crate::core::errors::{SimulationError, SimulationResult};
use crate::core::sync::LockStatsSnapshot;
use crate::counter::GuardedCounter;
use crate::monitoring::TaskSpan;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{self, JoinError, JoinHandle};
use tracing::info;

/// Shape of the simulated workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Readers started before any writer
    pub early_readers: usize,
    /// One writer per delta
    pub writer_deltas: Vec<i64>,
    /// Readers started after the writers
    pub late_readers: usize,
    /// Pause between launching each wave
    pub phase_gap: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            early_readers: 10,
            writer_deltas: vec![10, 5],
            late_readers: 5,
            phase_gap: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderPhase {
    Early,
    Late,
}

/// What one reader saw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReaderObservation {
    pub reader_id: usize,
    pub phase: ReaderPhase,
    pub value: i64,
}

/// Outcome of a simulation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub initial: i64,
    /// Ordered by reader id
    pub observations: Vec<ReaderObservation>,
    /// Deltas that were applied
    pub writes: Vec<i64>,
    pub final_value: i64,
    pub stats: LockStatsSnapshot,
    pub elapsed_ms: u64,
}

impl SimulationReport {
    /// Initial value plus every applied delta, in application order
    ///
    /// Summed wide so a legal sequence of writes never overflows midway;
    /// `None` when the total falls outside the `i64` range.
    pub fn expected_final(&self) -> Option<i64> {
        let total = self
            .writes
            .iter()
            .fold(i128::from(self.initial), |acc, &delta| acc + i128::from(delta));
        i64::try_from(total).ok()
    }

    /// Final value equals the initial value plus every applied delta
    pub fn is_conserved(&self) -> bool {
        self.expected_final() == Some(self.final_value)
    }

    pub fn observations_in(&self, phase: ReaderPhase) -> impl Iterator<Item = &ReaderObservation> {
        self.observations.iter().filter(move |o| o.phase == phase)
    }
}

/// Concurrent reader/writer driver over a shared counter
pub struct Simulation {
    counter: Arc<GuardedCounter>,
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(counter: Arc<GuardedCounter>, config: SimulationConfig) -> Self {
        Self { counter, config }
    }

    pub fn counter(&self) -> &Arc<GuardedCounter> {
        &self.counter
    }

    /// Launch every wave, wait for all tasks and report
    ///
    /// Fails if any writer fails (e.g. overflow) or any task panics. Every
    /// task is awaited before the first failure is returned.
    pub async fn run(&self) -> SimulationResult<SimulationReport> {
        let started = Instant::now();
        info!(
            early_readers = self.config.early_readers,
            writers = self.config.writer_deltas.len(),
            late_readers = self.config.late_readers,
            "Starting client simulation"
        );

        let initial = self.read_blocking().await?;
        info!(value = initial, "Initial counter value");

        let mut readers: Vec<JoinHandle<ReaderObservation>> = (0..self.config.early_readers)
            .map(|id| self.spawn_reader(id, ReaderPhase::Early))
            .collect();

        tokio::time::sleep(self.config.phase_gap).await;
        let writers: Vec<_> = self
            .config
            .writer_deltas
            .iter()
            .enumerate()
            .map(|(id, &delta)| self.spawn_writer(id, delta))
            .collect();

        tokio::time::sleep(self.config.phase_gap).await;
        let first_late = self.config.early_readers;
        readers.extend(
            (first_late..first_late + self.config.late_readers)
                .map(|id| self.spawn_reader(id, ReaderPhase::Late)),
        );

        let (observations, writes) = join_tasks(readers, writers).await?;

        let final_value = self.read_blocking().await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(value = final_value, elapsed_ms, "Simulation complete");

        Ok(SimulationReport {
            initial,
            observations,
            writes,
            final_value,
            stats: self.counter.stats(),
            elapsed_ms,
        })
    }

    fn spawn_reader(&self, reader_id: usize, phase: ReaderPhase) -> JoinHandle<ReaderObservation> {
        let counter = self.counter.clone();
        task::spawn_blocking(move || {
            let span = TaskSpan::new("reader", reader_id);
            let _entered = span.enter();

            let value = counter.read();
            info!(reader_id, ?phase, value, "Reader observed value");

            ReaderObservation {
                reader_id,
                phase,
                value,
            }
        })
    }

    fn spawn_writer(&self, writer_id: usize, delta: i64) -> JoinHandle<SimulationResult<i64>> {
        let counter = self.counter.clone();
        task::spawn_blocking(move || -> SimulationResult<i64> {
            let span = TaskSpan::new("writer", writer_id);
            let _entered = span.enter();

            counter.add(delta)?;
            Ok(delta)
        })
    }

    async fn read_blocking(&self) -> SimulationResult<i64> {
        let counter = self.counter.clone();
        task_result(task::spawn_blocking(move || counter.read()).await)
    }
}

/// Await every reader and writer, then surface the first failure
async fn join_tasks(
    readers: Vec<JoinHandle<ReaderObservation>>,
    writers: Vec<JoinHandle<SimulationResult<i64>>>,
) -> SimulationResult<(Vec<ReaderObservation>, Vec<i64>)> {
    let reader_outcomes = join_all(readers).await;
    let writer_outcomes = join_all(writers).await;

    let observations = reader_outcomes
        .into_iter()
        .map(task_result)
        .collect::<SimulationResult<Vec<_>>>()?;
    let writes = writer_outcomes
        .into_iter()
        .map(|outcome| task_result(outcome).and_then(|write| write))
        .collect::<SimulationResult<Vec<_>>>()?;

    Ok((observations, writes))
}

fn task_result<T>(outcome: Result<T, JoinError>) -> SimulationResult<T> {
    outcome.map_err(|e| SimulationError::TaskFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::CounterConfig;

    fn report(initial: i64, writes: Vec<i64>, final_value: i64) -> SimulationReport {
        SimulationReport {
            initial,
            observations: Vec::new(),
            writes,
            final_value,
            stats: LockStatsSnapshot::default(),
            elapsed_ms: 0,
        }
    }

    #[test]
    fn test_conservation_check() {
        assert!(report(0, vec![10, 5], 15).is_conserved());
        assert!(!report(0, vec![10, 5], 10).is_conserved());
        assert_eq!(report(3, vec![-4], -1).expected_final(), Some(-1));
    }

    #[test]
    fn test_conservation_check_with_large_deltas() {
        // Legal when applied in order: -10 + MAX, then + 5
        let legal = report(-10, vec![i64::MAX, 5], i64::MAX - 5);
        assert_eq!(legal.expected_final(), Some(i64::MAX - 5));
        assert!(legal.is_conserved());

        let out_of_range = report(i64::MAX, vec![1], i64::MAX);
        assert_eq!(out_of_range.expected_final(), None);
        assert!(!out_of_range.is_conserved());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_reader_still_awaits_writers() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let finished = Arc::new(AtomicBool::new(false));
        let readers = vec![task::spawn_blocking(|| -> ReaderObservation {
            panic!("reader crashed")
        })];
        let writers = vec![{
            let finished = finished.clone();
            task::spawn_blocking(move || -> SimulationResult<i64> {
                std::thread::sleep(Duration::from_millis(50));
                finished.store(true, Ordering::SeqCst);
                Ok(1)
            })
        }];

        let err = join_tasks(readers, writers).await.unwrap_err();

        assert!(matches!(err, SimulationError::TaskFailed(_)));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_small_run() {
        let counter = Arc::new(GuardedCounter::with_config(CounterConfig::instant()));
        let config = SimulationConfig {
            early_readers: 2,
            writer_deltas: vec![1, 2, 3],
            late_readers: 2,
            phase_gap: Duration::from_millis(1),
        };

        let report = Simulation::new(counter, config).run().await.unwrap();

        assert_eq!(report.observations.len(), 4);
        assert_eq!(report.writes, vec![1, 2, 3]);
        assert_eq!(report.final_value, 6);
        assert!(report.is_conserved());
        assert_eq!(report.stats.exclusive_acquisitions, 3);
    }
}
