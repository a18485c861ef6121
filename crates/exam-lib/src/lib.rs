//! Anomaly detection for completed HPC batch jobs
//!
//! This crate provides:
//! - Rate and aggregation helpers over cumulative hardware counters
//! - Six statistical tests flagging anomalous resource usage
//! - A worker pool running one test across many jobs
//! - Job eligibility checks and time-series sources
//! - Metrics and structured logging

pub mod anomaly;
pub mod eligibility;
pub mod exam;
pub mod models;
pub mod observability;
pub mod series;
pub mod source;
pub mod threshold;

pub use eligibility::{Eligibility, EligibilityFilter, JobFilter};
pub use exam::{
    AnomalyTest, Exam, ExamConfig, RunSummary, SkipReason, TestKind, TestOutcome, TestRecord,
    UserRanking, Verdict,
};
pub use models::*;
pub use observability::{ExamMetrics, StructuredLogger};
pub use source::{DirectorySource, InMemorySource, JobRecord, SourceError, TimeSeriesSource};
pub use threshold::{Comparison, Threshold};
