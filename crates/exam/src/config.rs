//! Runner configuration

use anyhow::{Context, Result};
use exam_lib::{Comparison, ExamConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Runner configuration, from an optional file and `EXAM_*` variables
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Directory holding `<job_id>.json` records
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Worker pool size
    #[serde(default = "default_processes")]
    pub processes: usize,

    #[serde(default)]
    pub threshold: Option<f64>,

    #[serde(default)]
    pub comparison: Option<Comparison>,

    /// Load job-wide sums across hosts
    #[serde(default = "default_aggregate")]
    pub aggregate: bool,
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_processes() -> usize {
    1
}

fn default_aggregate() -> bool {
    true
}

impl RunnerConfig {
    /// Load configuration from an optional file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("EXAM"))
            .build()
            .context("failed to read configuration")?;

        config
            .try_deserialize()
            .context("failed to parse configuration")
    }

    /// Engine configuration; a threshold must be set by now
    pub fn exam_config(&self) -> Result<ExamConfig> {
        let threshold = self
            .threshold
            .context("no threshold configured (set EXAM_THRESHOLD or --threshold)")?;

        let mut exam = ExamConfig::new(threshold)
            .with_processes(self.processes)
            .with_aggregate(self.aggregate);
        if let Some(comparison) = self.comparison {
            exam = exam.with_comparison(comparison);
        }
        exam.validate()?;
        Ok(exam)
    }
}
