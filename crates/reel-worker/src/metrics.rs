//! Job metrics recorded through the `metrics` facade.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const GENERATIONS_SUBMITTED_TOTAL: &str = "reel_generations_submitted_total";
    pub const GENERATIONS_COMPLETED_TOTAL: &str = "reel_generations_completed_total";
    pub const GENERATIONS_FAILED_TOTAL: &str = "reel_generations_failed_total";
    pub const GENERATION_POLL_ERRORS_TOTAL: &str = "reel_generation_poll_errors_total";
    pub const GENERATION_DURATION_SECONDS: &str = "reel_generation_duration_seconds";
    pub const MERGES_TOTAL: &str = "reel_merges_total";
    pub const MERGE_DURATION_SECONDS: &str = "reel_merge_duration_seconds";
    pub const RESULTS_LOCALIZED_TOTAL: &str = "reel_results_localized_total";
}

pub fn record_generation_submitted(provider: &str) {
    let labels = [("provider", provider.to_string())];
    counter!(names::GENERATIONS_SUBMITTED_TOTAL, &labels).increment(1);
}

/// `elapsed_secs` is wall-clock time since the job was created.
pub fn record_generation_completed(provider: &str, elapsed_secs: f64) {
    let labels = [("provider", provider.to_string())];
    counter!(names::GENERATIONS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::GENERATION_DURATION_SECONDS, &labels).record(elapsed_secs);
}

pub fn record_generation_failed(provider: &str) {
    let labels = [("provider", provider.to_string())];
    counter!(names::GENERATIONS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_poll_error(provider: &str) {
    let labels = [("provider", provider.to_string())];
    counter!(names::GENERATION_POLL_ERRORS_TOTAL, &labels).increment(1);
}

pub fn record_merge(status: &str, duration_secs: f64) {
    let labels = [("status", status.to_string())];
    counter!(names::MERGES_TOTAL, &labels).increment(1);
    histogram!(names::MERGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_result_localized(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::RESULTS_LOCALIZED_TOTAL, &labels).increment(1);
}
