/*!
 * Structured Tracing
 * Logging setup and per-task spans using the tracing crate
 *
 * Features:
 * - Env-filtered output (RUST_LOG)
 * - JSON-formatted logs for structured parsing
 * - Spans around simulated reader/writer tasks with their duration
 */

use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Tasks slower than this are logged at warn level
pub const SLOW_TASK_THRESHOLD: Duration = Duration::from_secs(1);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - COUNTER_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("COUNTER_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::NONE)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

/// Span around one simulated reader or writer task
pub struct TaskSpan {
    span: tracing::Span,
    start: Instant,
    role: &'static str,
    id: usize,
}

impl TaskSpan {
    pub fn new(role: &'static str, id: usize) -> Self {
        let span = span!(
            Level::DEBUG,
            "task",
            role = role,
            id = id,
            duration_ms = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            role,
            id,
        }
    }

    /// Enter the span context for the task body
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TaskSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_ms", duration.as_millis() as u64);
        let _entered = self.span.enter();

        if duration > SLOW_TASK_THRESHOLD {
            warn!(
                role = self.role,
                id = self.id,
                duration_ms = duration.as_millis() as u64,
                "slow task"
            );
        } else {
            debug!(
                role = self.role,
                id = self.id,
                duration_ms = duration.as_millis() as u64,
                "task completed"
            );
        }
    }
}
