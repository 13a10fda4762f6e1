// ABOUTME: Run lifecycle metrics recorded through the `metrics` facade.
// ABOUTME: No exporter is installed here; the embedding process chooses one.

use switchyard_agent::RuntimeKind;

/// Runs started (counter, labels: runtime, operation)
pub const RUNS_STARTED_TOTAL: &str = "switchyard_runs_started_total";
/// Runs cancelled because a newer submission arrived (counter)
pub const RUNS_SUPERSEDED_TOTAL: &str = "switchyard_runs_superseded_total";
/// Runs cancelled by an explicit cancel or surface teardown (counter)
pub const RUNS_CANCELLED_TOTAL: &str = "switchyard_runs_cancelled_total";
/// Runs that reached a terminal event (counter, labels: outcome)
pub const RUNS_FINISHED_TOTAL: &str = "switchyard_runs_finished_total";
/// Runs currently holding a slot (gauge)
pub const RUNS_ACTIVE: &str = "switchyard_runs_active";
/// Wall-clock duration of finished runs (histogram)
pub const RUN_DURATION_SECONDS: &str = "switchyard_run_duration_seconds";
/// Selector resolutions (counter, labels: runtime, source)
pub const RUNTIME_RESOLUTIONS_TOTAL: &str = "switchyard_runtime_resolutions_total";

pub fn record_run_started(runtime: RuntimeKind, operation: &'static str) {
    ::metrics::counter!(RUNS_STARTED_TOTAL, "runtime" => runtime.as_str(), "operation" => operation)
        .increment(1);
}

pub fn record_run_superseded() {
    ::metrics::counter!(RUNS_SUPERSEDED_TOTAL).increment(1);
}

pub fn record_run_cancelled() {
    ::metrics::counter!(RUNS_CANCELLED_TOTAL).increment(1);
}

pub fn record_run_finished(outcome: &'static str, duration: std::time::Duration) {
    ::metrics::counter!(RUNS_FINISHED_TOTAL, "outcome" => outcome).increment(1);
    ::metrics::histogram!(RUN_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub fn set_active_runs(count: usize) {
    ::metrics::gauge!(RUNS_ACTIVE).set(count as f64);
}

pub fn record_runtime_resolution(runtime: RuntimeKind, source: &'static str) {
    ::metrics::counter!(RUNTIME_RESOLUTIONS_TOTAL, "runtime" => runtime.as_str(), "source" => source)
        .increment(1);
}
