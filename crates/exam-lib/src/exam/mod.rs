//! Test contract and execution engine
//!
//! Every anomaly test declares the counters it needs and evaluates one
//! prepared job at a time. [`Exam`] runs a test over a list of job ids
//! on a bounded worker pool and collects the per-job results.

mod pool;


pub use pool::{Exam, RunSummary, TestRecord, UserRanking};

use crate::anomaly::{Catastrophe, CoreIdle, Imbalance, LowFlops, MemBw, MetadataRate};
use crate::eligibility::EligibilityFilter;
use crate::models::{CounterSet, JobTimeSeries};
use crate::threshold::{Comparison, Threshold};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A statistical test flagging one kind of anomalous job
pub trait AnomalyTest: Send + Sync {
    /// Short identifier used in logs and metrics
    fn name(&self) -> &'static str;

    /// Counters the test needs, per platform where they differ
    fn counters(&self) -> CounterSet;

    /// Comparison direction the test always uses, ignoring configuration
    fn fixed_comparison(&self) -> Option<Comparison> {
        None
    }

    /// Evaluate a single prepared job
    fn evaluate(&self, ts: &JobTimeSeries, ctx: &TestContext<'_>) -> TestOutcome;
}

/// Per-job inputs shared by every test
pub struct TestContext<'a> {
    pub threshold: Threshold,
    pub filter: &'a dyn EligibilityFilter,
}

/// Why a job produced no result
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Data could not be loaded for the job
    Unavailable(String),
    /// Job does not meet the test's criteria
    Ineligible(String),
    /// Hosts with missing or corrupted samples
    LostData(Vec<String>),
    /// The worker evaluating the job panicked
    Panicked(String),
}

/// Imbalance statistic recorded per job for owner ranking
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerRatio {
    pub ratio: f64,
    pub owner: String,
}

/// Recorded result for a tested job
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub flagged: bool,
    /// `None` when the test decided without computing its statistic
    pub statistic: Option<f64>,
    pub ratio: Option<OwnerRatio>,
}

impl Verdict {
    pub fn compared(statistic: f64, threshold: &Threshold) -> Self {
        Self {
            flagged: threshold.check(statistic),
            statistic: Some(statistic),
            ratio: None,
        }
    }

    pub fn not_flagged() -> Self {
        Self {
            flagged: false,
            statistic: None,
            ratio: None,
        }
    }
}

/// Result of testing one job
#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Skipped(SkipReason),
    Recorded(Verdict),
}

impl TestOutcome {
    pub fn ineligible(reason: impl Into<String>) -> Self {
        TestOutcome::Skipped(SkipReason::Ineligible(reason.into()))
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            TestOutcome::Recorded(v) => Some(v),
            TestOutcome::Skipped(_) => None,
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.verdict().map(|v| v.flagged).unwrap_or(false)
    }
}

/// Selects a concrete test at construction time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestKind {
    MemBw,
    CoreIdle,
    Imbalance { family: String, metric: String },
    Catastrophe,
    LowFlops,
    MetadataRate,
}

impl TestKind {
    pub fn build(&self) -> Arc<dyn AnomalyTest> {
        match self {
            TestKind::MemBw => Arc::new(MemBw),
            TestKind::CoreIdle => Arc::new(CoreIdle),
            TestKind::Imbalance { family, metric } => {
                Arc::new(Imbalance::new(family.clone(), metric.clone()))
            }
            TestKind::Catastrophe => Arc::new(Catastrophe),
            TestKind::LowFlops => Arc::new(LowFlops),
            TestKind::MetadataRate => Arc::new(MetadataRate),
        }
    }
}

fn default_processes() -> usize {
    1
}

fn default_aggregate() -> bool {
    true
}

/// Engine configuration, immutable once an [`Exam`] is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamConfig {
    /// Worker pool size
    #[serde(default = "default_processes")]
    pub processes: usize,

    pub threshold: f64,

    /// Overrides the test's default comparison direction
    #[serde(default)]
    pub comparison: Option<Comparison>,

    /// Also load job-wide sums across hosts
    #[serde(default = "default_aggregate")]
    pub aggregate: bool,
}

impl ExamConfig {
    pub fn new(threshold: f64) -> Self {
        Self {
            processes: default_processes(),
            threshold,
            comparison: None,
            aggregate: default_aggregate(),
        }
    }

    pub fn with_processes(mut self, processes: usize) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = Some(comparison);
        self
    }

    pub fn with_aggregate(mut self, aggregate: bool) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.processes >= 1, "processes must be at least 1");
        anyhow::ensure!(
            self.threshold.is_finite(),
            "threshold must be finite, got {}",
            self.threshold
        );
        Ok(())
    }
}
