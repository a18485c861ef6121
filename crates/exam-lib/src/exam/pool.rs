//! Worker pool running one test over many jobs
//!
//! Jobs are evaluated on blocking worker tasks bounded by a semaphore.
//! Each worker sends its `(job_id, outcome)` pair back over a channel and
//! the run loop, as the single owner, records it.

use super::{AnomalyTest, ExamConfig, OwnerRatio, SkipReason, TestContext, TestOutcome};
use crate::eligibility::EligibilityFilter;
use crate::models::Aggregation;
use crate::observability::{ExamMetrics, OutcomeLabel, StructuredLogger};
use crate::source::TimeSeriesSource;
use crate::threshold::{Comparison, Threshold};
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::debug;

/// Number of owners reported by [`Exam::find_top_users`]
pub const TOP_USERS: usize = 10;

/// Recorded result for one job
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestRecord {
    pub flagged: bool,
    pub statistic: Option<f64>,
}

/// Counts from a single [`Exam::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatched: usize,
    pub recorded: usize,
    pub flagged: usize,
    pub skipped: usize,
    pub panicked: usize,
}

/// An owner's worst imbalance across their jobs
#[derive(Debug, Clone, PartialEq)]
pub struct UserRanking {
    pub owner: String,
    pub max_ratio: f64,
    pub jobs: Vec<String>,
}

/// Everything a worker needs to test one job
struct Worker {
    test: Arc<dyn AnomalyTest>,
    source: Arc<dyn TimeSeriesSource>,
    filter: Arc<dyn EligibilityFilter>,
    threshold: Threshold,
    aggregation: Aggregation,
    metrics: ExamMetrics,
}

impl Worker {
    fn test(&self, job_id: &str) -> TestOutcome {
        let start = Instant::now();
        let name = self.test.name();

        let ts = match self
            .source
            .load(job_id, &self.test.counters(), self.aggregation)
        {
            Ok(ts) => ts,
            Err(e) => {
                debug!(test = name, job_id = %job_id, error = %e, "Job data unavailable");
                return TestOutcome::Skipped(SkipReason::Unavailable(e.to_string()));
            }
        };

        let ctx = TestContext {
            threshold: self.threshold,
            filter: self.filter.as_ref(),
        };
        let outcome = self.test.evaluate(&ts, &ctx);

        self.metrics
            .observe_evaluation_latency(name, start.elapsed().as_secs_f64());
        outcome
    }

    /// Test a job, converting a panic into a skip for that job alone
    fn test_isolated(&self, job_id: &str) -> TestOutcome {
        match catch_unwind(AssertUnwindSafe(|| self.test(job_id))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let details = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                TestOutcome::Skipped(SkipReason::Panicked(details))
            }
        }
    }
}

/// Runs one anomaly test across jobs and holds the results
pub struct Exam {
    worker: Arc<Worker>,
    config: ExamConfig,
    results: DashMap<String, TestRecord>,
    ratios: DashMap<String, OwnerRatio>,
    logger: StructuredLogger,
}

impl Exam {
    pub fn new(
        test: Arc<dyn AnomalyTest>,
        source: Arc<dyn TimeSeriesSource>,
        filter: Arc<dyn EligibilityFilter>,
        config: ExamConfig,
    ) -> Result<Self> {
        config.validate().context("invalid exam configuration")?;

        let logger = StructuredLogger::new(test.name());
        let comparison = match (test.fixed_comparison(), config.comparison) {
            (Some(fixed), Some(configured)) if fixed != configured => {
                logger.log_comparison_ignored(configured.symbol(), fixed.symbol());
                fixed
            }
            (Some(fixed), _) => fixed,
            (None, configured) => configured.unwrap_or(Comparison::Gt),
        };
        let threshold = Threshold::new(config.threshold, comparison);
        let worker = Worker {
            test,
            source,
            filter,
            threshold,
            aggregation: Aggregation::from_flag(config.aggregate),
            metrics: ExamMetrics::new(),
        };

        Ok(Self {
            worker: Arc::new(worker),
            config,
            results: DashMap::new(),
            ratios: DashMap::new(),
            logger,
        })
    }

    pub fn name(&self) -> &'static str {
        self.worker.test.name()
    }

    pub fn config(&self) -> &ExamConfig {
        &self.config
    }

    pub fn threshold(&self) -> Threshold {
        self.worker.threshold
    }

    /// Test every job on the worker pool and wait for all of them
    pub async fn run(&self, job_ids: &[String]) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        if job_ids.is_empty() {
            return Ok(summary);
        }

        let threshold = self.threshold();
        self.logger.log_run_started(
            job_ids.len(),
            self.config.processes,
            threshold.value,
            threshold.comparison.symbol(),
        );

        let permits = Arc::new(Semaphore::new(self.config.processes));
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, TestOutcome)>();
        let mut workers = JoinSet::new();

        for job_id in job_ids {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .context("worker pool closed")?;
            let worker = Arc::clone(&self.worker);
            let tx = tx.clone();
            let job_id = job_id.clone();

            workers.spawn_blocking(move || {
                let _permit = permit;
                let outcome = worker.test_isolated(&job_id);
                let _ = tx.send((job_id, outcome));
            });
            summary.dispatched += 1;
        }
        drop(tx);

        while let Some((job_id, outcome)) = rx.recv().await {
            self.record(job_id, outcome, &mut summary);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                self.logger.log_worker_panic(&e.to_string());
                summary.panicked += 1;
            }
        }

        self.logger
            .log_run_finished(summary.recorded, summary.flagged, summary.skipped);
        Ok(summary)
    }

    /// Test a single job on the calling thread and record its result
    pub fn test_job(&self, job_id: &str) -> TestOutcome {
        let outcome = self.worker.test_isolated(job_id);
        self.record(job_id.to_string(), outcome.clone(), &mut RunSummary::default());
        outcome
    }

    fn record(&self, job_id: String, outcome: TestOutcome, summary: &mut RunSummary) {
        let name = self.name();
        let metrics = &self.worker.metrics;

        match outcome {
            TestOutcome::Skipped(SkipReason::Panicked(details)) => {
                self.logger.log_worker_panic(&details);
                metrics.inc_outcome(name, OutcomeLabel::Panicked);
                summary.panicked += 1;
            }
            TestOutcome::Skipped(reason) => {
                debug!(test = name, job_id = %job_id, reason = ?reason, "Job skipped");
                metrics.inc_outcome(name, OutcomeLabel::Skipped);
                summary.skipped += 1;
            }
            TestOutcome::Recorded(verdict) => {
                if let Some(ratio) = verdict.ratio {
                    self.ratios.insert(job_id.clone(), ratio);
                }
                if verdict.flagged {
                    self.logger.log_job_flagged(&job_id, verdict.statistic);
                    metrics.inc_outcome(name, OutcomeLabel::Flagged);
                    summary.flagged += 1;
                } else {
                    metrics.inc_outcome(name, OutcomeLabel::Passed);
                }
                summary.recorded += 1;
                self.results.insert(
                    job_id,
                    TestRecord {
                        flagged: verdict.flagged,
                        statistic: verdict.statistic,
                    },
                );
            }
        }
    }

    /// Ids of every job flagged by the test, sorted
    pub fn failed(&self) -> Vec<String> {
        let mut jobs: Vec<String> = self
            .results
            .iter()
            .filter(|entry| entry.value().flagged)
            .map(|entry| entry.key().clone())
            .collect();
        jobs.sort();
        jobs
    }

    /// Snapshot of every recorded result
    pub fn results(&self) -> BTreeMap<String, TestRecord> {
        self.results
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn record_for(&self, job_id: &str) -> Option<TestRecord> {
        self.results.get(job_id).map(|r| *r)
    }

    /// Snapshot of the per-job imbalance ratios
    pub fn ratios(&self) -> BTreeMap<String, OwnerRatio> {
        self.ratios
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Rank job owners by their largest imbalance ratio
    pub fn find_top_users(&self) -> Vec<UserRanking> {
        let mut users: HashMap<String, UserRanking> = HashMap::new();
        for entry in self.ratios.iter() {
            let ratio = entry.value();
            let user = users
                .entry(ratio.owner.clone())
                .or_insert_with(|| UserRanking {
                    owner: ratio.owner.clone(),
                    max_ratio: f64::NEG_INFINITY,
                    jobs: Vec::new(),
                });
            user.max_ratio = user.max_ratio.max(ratio.ratio);
            user.jobs.push(entry.key().clone());
        }

        let mut ranked: Vec<UserRanking> = users.into_values().collect();
        for user in &mut ranked {
            user.jobs.sort();
        }
        ranked.sort_by(|a, b| {
            b.max_ratio
                .total_cmp(&a.max_ratio)
                .then_with(|| a.owner.cmp(&b.owner))
        });
        ranked.truncate(TOP_USERS);

        for (rank, user) in ranked.iter().enumerate() {
            self.logger
                .log_top_user(rank + 1, &user.owner, user.max_ratio, &user.jobs);
        }
        ranked
    }
}
