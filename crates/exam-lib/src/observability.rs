//! Observability infrastructure for job examination
//!
//! Provides:
//! - Prometheus metrics (per-test job outcomes, evaluation latency)
//! - Structured logging with tracing

use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for per-job evaluation latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ExamMetricsInner> = OnceLock::new();

struct ExamMetricsInner {
    job_outcomes: IntCounterVec,
    evaluation_latency_seconds: HistogramVec,
}

impl ExamMetricsInner {
    fn new() -> Self {
        Self {
            job_outcomes: register_int_counter_vec!(
                "job_exam_job_outcomes_total",
                "Jobs examined, by test and outcome",
                &["test", "outcome"]
            )
            .expect("Failed to register job_outcomes"),

            evaluation_latency_seconds: register_histogram_vec!(
                "job_exam_evaluation_latency_seconds",
                "Time spent preparing and evaluating a single job",
                &["test"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_latency_seconds"),
        }
    }
}

/// Outcome label for the job outcome counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeLabel {
    Flagged,
    Passed,
    Skipped,
    Panicked,
}

impl OutcomeLabel {
    fn as_str(self) -> &'static str {
        match self {
            OutcomeLabel::Flagged => "flagged",
            OutcomeLabel::Passed => "passed",
            OutcomeLabel::Skipped => "skipped",
            OutcomeLabel::Panicked => "panicked",
        }
    }
}

/// Handle to the process-wide exam metrics
#[derive(Clone)]
pub struct ExamMetrics {
    _private: (),
}

impl Default for ExamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExamMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ExamMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ExamMetricsInner {
        GLOBAL_METRICS.get_or_init(ExamMetricsInner::new)
    }

    pub fn inc_outcome(&self, test: &str, outcome: OutcomeLabel) {
        self.inner()
            .job_outcomes
            .with_label_values(&[test, outcome.as_str()])
            .inc();
    }

    pub fn outcome_count(&self, test: &str, outcome: OutcomeLabel) -> u64 {
        self.inner()
            .job_outcomes
            .with_label_values(&[test, outcome.as_str()])
            .get()
    }

    pub fn observe_evaluation_latency(&self, test: &str, duration_secs: f64) {
        self.inner()
            .evaluation_latency_seconds
            .with_label_values(&[test])
            .observe(duration_secs);
    }
}

/// Structured logger for examination events
#[derive(Clone)]
pub struct StructuredLogger {
    test: &'static str,
}

impl StructuredLogger {
    pub fn new(test: &'static str) -> Self {
        Self { test }
    }

    pub fn log_run_started(&self, jobs: usize, processes: usize, threshold: f64, comparison: &str) {
        info!(
            event = "run_started",
            test = self.test,
            jobs = jobs,
            processes = processes,
            threshold = threshold,
            comparison = %comparison,
            "Starting examination run"
        );
    }

    pub fn log_job_flagged(&self, job_id: &str, statistic: Option<f64>) {
        info!(
            event = "job_flagged",
            test = self.test,
            job_id = %job_id,
            statistic = ?statistic,
            "Job flagged"
        );
    }

    pub fn log_comparison_ignored(&self, configured: &str, fixed: &str) {
        warn!(
            event = "comparison_ignored",
            test = self.test,
            configured = %configured,
            fixed = %fixed,
            "Configured comparison ignored, test uses a fixed direction"
        );
    }

    pub fn log_worker_panic(&self, details: &str) {
        warn!(
            event = "worker_panicked",
            test = self.test,
            details = %details,
            "Examination worker panicked, job skipped"
        );
    }

    pub fn log_run_finished(&self, recorded: usize, flagged: usize, skipped: usize) {
        info!(
            event = "run_finished",
            test = self.test,
            recorded = recorded,
            flagged = flagged,
            skipped = skipped,
            "Examination run complete"
        );
    }

    pub fn log_top_user(&self, rank: usize, owner: &str, max_ratio: f64, jobs: &[String]) {
        info!(
            event = "top_user",
            test = self.test,
            rank = rank,
            owner = %owner,
            max_ratio = max_ratio,
            jobs = %jobs.join(" "),
            "Imbalance top user"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counter() {
        let metrics = ExamMetrics::new();
        let before = metrics.outcome_count("observability_test", OutcomeLabel::Flagged);
        metrics.inc_outcome("observability_test", OutcomeLabel::Flagged);
        metrics.observe_evaluation_latency("observability_test", 0.002);
        assert_eq!(
            metrics.outcome_count("observability_test", OutcomeLabel::Flagged),
            before + 1
        );
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("mem_bw");
        assert_eq!(logger.test, "mem_bw");
    }
}
