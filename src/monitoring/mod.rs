/*!
 * Monitoring
 * Structured logging setup and task tracing
 */

mod tracer;

pub use tracer::{init_tracing, TaskSpan, SLOW_TASK_THRESHOLD};
