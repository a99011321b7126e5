/*!
 * Simulation Driver Tests
 */

use guarded_counter::{
    CounterConfig, CounterError, GuardedCounter, ReaderPhase, Simulation, SimulationConfig,
    SimulationError,
};
use std::sync::Arc;
use std::time::Duration;

fn simulation(config: CounterConfig, workload: SimulationConfig) -> Simulation {
    Simulation::new(Arc::new(GuardedCounter::with_config(config)), workload)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_default_workload() {
    let config = CounterConfig::instant()
        .with_delays(Duration::from_millis(20), Duration::from_millis(50));
    let workload = SimulationConfig {
        phase_gap: Duration::from_millis(50),
        ..Default::default()
    };

    let report = simulation(config, workload).run().await.unwrap();

    assert_eq!(report.initial, 0);
    assert_eq!(report.writes, vec![10, 5]);
    assert_eq!(report.final_value, 15);
    assert!(report.is_conserved());

    let ids: Vec<_> = report.observations.iter().map(|o| o.reader_id).collect();
    assert_eq!(ids, (0..15).collect::<Vec<_>>());

    // Early readers hold the lock before either writer shows up
    assert!(report.observations_in(ReaderPhase::Early).all(|o| o.value == 0));

    // Late readers queue behind the writers and see both writes
    for observation in report.observations_in(ReaderPhase::Late) {
        assert_eq!(
            observation.value, 15,
            "late reader {} overtook a writer",
            observation.reader_id
        );
    }

    assert_eq!(report.stats.exclusive_acquisitions, 2);
    assert!(report.stats.peak_readers >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_report_serializes() {
    let workload = SimulationConfig {
        early_readers: 1,
        writer_deltas: vec![3],
        late_readers: 1,
        phase_gap: Duration::from_millis(1),
    };

    let report = simulation(CounterConfig::instant(), workload)
        .run()
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["final_value"], 3);
    assert_eq!(json["observations"][0]["phase"], "early");
    assert_eq!(json["observations"][1]["phase"], "late");
    assert_eq!(json["stats"]["exclusive_acquisitions"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writer_overflow_fails_the_run() {
    let config = CounterConfig::instant().with_initial(i64::MAX);
    let workload = SimulationConfig {
        early_readers: 2,
        writer_deltas: vec![1],
        late_readers: 2,
        phase_gap: Duration::from_millis(1),
    };

    let sim = simulation(config, workload);
    let err = sim.run().await.unwrap_err();

    assert_eq!(
        err,
        SimulationError::Counter(CounterError::Overflow {
            value: i64::MAX,
            delta: 1
        })
    );
    // The failed writer released the lock
    assert_eq!(sim.counter().read(), i64::MAX);
}
