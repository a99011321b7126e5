/*!
 * Counter Simulation - Main Entry Point
 *
 * Runs readers and writers against one shared guarded counter:
 * - 10 readers
 * - 2 writers (+10, +5)
 * - 5 more readers arriving after the writers
 */

use guarded_counter::{init_tracing, CounterConfig, GuardedCounter, Simulation, SimulationConfig};
use miette::IntoDiagnostic;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();

    let config = CounterConfig::from_env()?;
    info!(
        initial = config.initial,
        read_delay_ms = config.read_delay.as_millis() as u64,
        write_delay_ms = config.write_delay.as_millis() as u64,
        policy = %config.lock.policy,
        "Counter configured"
    );

    let counter = Arc::new(GuardedCounter::with_config(config));
    let report = Simulation::new(counter, SimulationConfig::default())
        .run()
        .await?;

    info!(
        initial = report.initial,
        final_value = report.final_value,
        peak_readers = report.stats.peak_readers,
        "Final counter value"
    );
    if !report.is_conserved() {
        warn!(
            expected = ?report.expected_final(),
            actual = report.final_value,
            "Final value does not match the applied writes"
        );
    }

    let print_json = std::env::var("COUNTER_REPORT_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);
    if print_json {
        println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
    }

    Ok(())
}
