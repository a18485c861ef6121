//! Job Exam - flags completed HPC jobs with anomalous counter behaviour
//!
//! Runs one anomaly test across the given job ids, reading job records
//! from an archive directory, and prints the ids of flagged jobs.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use exam_lib::{Comparison, DirectorySource, Exam, JobFilter, TestKind};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

/// Job Exam CLI
#[derive(Parser)]
#[command(name = "job-exam")]
#[command(author, version, about = "Flag HPC jobs with anomalous resource usage", long_about = None)]
struct Cli {
    /// Test to run
    test: TestName,

    /// Job ids to examine
    #[arg(required = true)]
    jobs: Vec<String>,

    /// Configuration file
    #[arg(long, short, env = "EXAM_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding `<job_id>.json` records
    #[arg(long)]
    archive_dir: Option<PathBuf>,

    /// Worker pool size
    #[arg(long, short)]
    processes: Option<usize>,

    /// Threshold the test statistic is compared against
    #[arg(long, short)]
    threshold: Option<f64>,

    /// Comparison operator: >, >=, <, <=, ==
    #[arg(long)]
    comparison: Option<Comparison>,

    /// Keep per-host series only, without job-wide sums
    #[arg(long)]
    per_host: bool,

    /// Counter family examined by the imbalance test
    #[arg(long, default_value = "intel_snb")]
    family: String,

    /// Metric examined by the imbalance test
    #[arg(long, default_value = "LOAD_L1D_ALL")]
    metric: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TestName {
    MemBw,
    CoreIdle,
    Imbalance,
    Catastrophe,
    LowFlops,
    MetadataRate,
}

impl Cli {
    fn test_kind(&self) -> TestKind {
        match self.test {
            TestName::MemBw => TestKind::MemBw,
            TestName::CoreIdle => TestKind::CoreIdle,
            TestName::Imbalance => TestKind::Imbalance {
                family: self.family.clone(),
                metric: self.metric.clone(),
            },
            TestName::Catastrophe => TestKind::Catastrophe,
            TestName::LowFlops => TestKind::LowFlops,
            TestName::MetadataRate => TestKind::MetadataRate,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut settings = config::RunnerConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.archive_dir {
        settings.archive_dir = dir.clone();
    }
    if let Some(processes) = cli.processes {
        settings.processes = processes;
    }
    if let Some(threshold) = cli.threshold {
        settings.threshold = Some(threshold);
    }
    if let Some(comparison) = cli.comparison {
        settings.comparison = Some(comparison);
    }
    if cli.per_host {
        settings.aggregate = false;
    }

    let kind = cli.test_kind();
    info!(
        test = ?kind,
        archive_dir = %settings.archive_dir.display(),
        jobs = cli.jobs.len(),
        "Job exam configured"
    );

    let exam = Exam::new(
        kind.build(),
        Arc::new(DirectorySource::new(&settings.archive_dir)),
        Arc::new(JobFilter),
        settings.exam_config()?,
    )?;

    let summary = exam.run(&cli.jobs).await?;

    for job_id in exam.failed() {
        println!("{job_id}");
    }
    if matches!(kind, TestKind::Imbalance { .. }) {
        exam.find_top_users();
    }

    info!(
        dispatched = summary.dispatched,
        recorded = summary.recorded,
        flagged = summary.flagged,
        skipped = summary.skipped,
        panicked = summary.panicked,
        "Job exam finished"
    );

    Ok(())
}
