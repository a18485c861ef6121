//! Time-series sources for job counter data
//!
//! A source turns a job id and a requested counter set into a prepared
//! [`JobTimeSeries`]. Job records are stored as JSON, one file per job.

use crate::models::{Aggregation, Counter, CounterSet, JobInfo, JobTimeSeries};
use crate::series;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reasons a job's time series cannot be prepared
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no data available for job {job_id}")]
    NoData { job_id: String },

    #[error("malformed record for job {job_id}: {reason}")]
    Malformed { job_id: String, reason: String },

    #[error("job {job_id} ran on unsupported platform {platform}")]
    UnsupportedPlatform { job_id: String, platform: String },

    #[error("job {job_id} has no data for counter {counter}")]
    MissingCounter { job_id: String, counter: String },

    #[error("failed to read record for job {job_id}")]
    Io {
        job_id: String,
        #[source]
        source: std::io::Error,
    },
}

/// Loads counter data for a job
pub trait TimeSeriesSource: Send + Sync {
    fn load(
        &self,
        job_id: &str,
        counters: &CounterSet,
        aggregation: Aggregation,
    ) -> Result<JobTimeSeries, SourceError>;
}

/// Raw stored job record: metadata, time grid and every collected counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job: JobInfo,
    pub t: Vec<f64>,
    /// `family.metric` -> host -> cumulative samples
    pub counters: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
}

impl JobRecord {
    /// Select the requested counters into a prepared time series
    pub fn select(
        &self,
        counters: &CounterSet,
        aggregation: Aggregation,
    ) -> Result<JobTimeSeries, SourceError> {
        let job_id = &self.job.id;

        if self.t.len() < 2 {
            return Err(SourceError::NoData {
                job_id: job_id.clone(),
            });
        }
        if self.t.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(SourceError::Malformed {
                job_id: job_id.clone(),
                reason: "time grid is not strictly increasing".to_string(),
            });
        }

        let wanted =
            counters
                .resolve(self.job.platform)
                .ok_or_else(|| SourceError::UnsupportedPlatform {
                    job_id: job_id.clone(),
                    platform: self.job.platform.to_string(),
                })?;

        let mut data = Vec::with_capacity(wanted.len());
        for counter in wanted {
            let by_host = self.counters.get(&counter.key()).ok_or_else(|| {
                SourceError::MissingCounter {
                    job_id: job_id.clone(),
                    counter: counter.key(),
                }
            })?;
            self.check_hosts(counter, by_host)?;
            data.push(by_host.clone());
        }

        let totals = match aggregation {
            Aggregation::PerHost => None,
            Aggregation::Job => Some(
                data.iter()
                    .map(|by_host| {
                        let mut sum = vec![0.0; self.t.len()];
                        for values in by_host.values() {
                            series::accumulate(&mut sum, values);
                        }
                        sum
                    })
                    .collect(),
            ),
        };

        Ok(JobTimeSeries {
            job: self.job.clone(),
            t: self.t.clone(),
            data,
            totals,
        })
    }

    /// Every job host must carry exactly one array per counter, aligned with `t`
    fn check_hosts(
        &self,
        counter: &Counter,
        by_host: &BTreeMap<String, Vec<f64>>,
    ) -> Result<(), SourceError> {
        let malformed = |reason: String| SourceError::Malformed {
            job_id: self.job.id.clone(),
            reason,
        };

        let expected: BTreeSet<&str> = self.job.hosts.iter().map(String::as_str).collect();
        let found: BTreeSet<&str> = by_host.keys().map(String::as_str).collect();
        if expected != found || expected.len() != self.job.hosts.len() {
            return Err(malformed(format!(
                "hosts of {counter} do not match the job's host list"
            )));
        }

        if let Some((host, values)) = by_host.iter().find(|(_, v)| v.len() != self.t.len()) {
            return Err(malformed(format!(
                "{counter} on {host} has {} samples, expected {}",
                values.len(),
                self.t.len()
            )));
        }
        Ok(())
    }
}

/// Source backed by records held in memory
#[derive(Debug, Default)]
pub struct InMemorySource {
    records: HashMap<String, JobRecord>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: JobRecord) {
        self.records.insert(record.job.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<JobRecord> for InMemorySource {
    fn from_iter<I: IntoIterator<Item = JobRecord>>(iter: I) -> Self {
        let mut source = Self::new();
        for record in iter {
            source.insert(record);
        }
        source
    }
}

impl TimeSeriesSource for InMemorySource {
    fn load(
        &self,
        job_id: &str,
        counters: &CounterSet,
        aggregation: Aggregation,
    ) -> Result<JobTimeSeries, SourceError> {
        self.records
            .get(job_id)
            .ok_or_else(|| SourceError::NoData {
                job_id: job_id.to_string(),
            })?
            .select(counters, aggregation)
    }
}

/// Source reading `<root>/<job_id>.json` records
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn record_path(&self, job_id: &str) -> PathBuf {
        self.root.join(format!("{job_id}.json"))
    }

    fn read_record(&self, job_id: &str) -> Result<JobRecord, SourceError> {
        let path = self.record_path(job_id);
        let raw = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SourceError::NoData {
                job_id: job_id.to_string(),
            },
            _ => SourceError::Io {
                job_id: job_id.to_string(),
                source: e,
            },
        })?;

        if raw.is_empty() {
            return Err(SourceError::NoData {
                job_id: job_id.to_string(),
            });
        }

        serde_json::from_slice(&raw).map_err(|e| SourceError::Malformed {
            job_id: job_id.to_string(),
            reason: e.to_string(),
        })
    }
}

impl TimeSeriesSource for DirectorySource {
    fn load(
        &self,
        job_id: &str,
        counters: &CounterSet,
        aggregation: Aggregation,
    ) -> Result<JobTimeSeries, SourceError> {
        self.read_record(job_id)?.select(counters, aggregation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use tempfile::TempDir;

    fn record() -> JobRecord {
        let mut counters = BTreeMap::new();
        counters.insert(
            "intel_snb.LOAD_L1D_ALL".to_string(),
            BTreeMap::from([
                ("c1".to_string(), vec![0.0, 10.0, 20.0]),
                ("c2".to_string(), vec![0.0, 5.0, 10.0]),
            ]),
        );
        JobRecord {
            job: JobInfo {
                id: "42".to_string(),
                owner: "bob".to_string(),
                queue: "normal".to_string(),
                wayness: 16,
                platform: Platform::IntelSnb,
                hosts: vec!["c1".to_string(), "c2".to_string()],
            },
            t: vec![0.0, 600.0, 1200.0],
            counters,
        }
    }

    fn l1d() -> CounterSet {
        CounterSet::PerPlatform(vec![
            (Platform::Amd64, vec![Counter::new("amd64_sock", "DRAM")]),
            (
                Platform::IntelSnb,
                vec![Counter::new("intel_snb", "LOAD_L1D_ALL")],
            ),
        ])
    }

    #[test]
    fn test_select_job_aggregation() {
        let ts = record().select(&l1d(), Aggregation::Job).unwrap();
        assert_eq!(ts.totals, Some(vec![vec![0.0, 15.0, 30.0]]));
        assert_eq!(ts.series(0, "c2"), Some(&[0.0, 5.0, 10.0][..]));

        let per_host = record().select(&l1d(), Aggregation::PerHost).unwrap();
        assert!(per_host.totals.is_none());
    }

    #[test]
    fn test_select_missing_counter() {
        let set = CounterSet::fixed(&[("llite", "open")]);
        let err = record().select(&set, Aggregation::Job).unwrap_err();
        assert!(matches!(err, SourceError::MissingCounter { .. }));
    }

    #[test]
    fn test_select_unsupported_platform() {
        let set = CounterSet::PerPlatform(vec![(
            Platform::Amd64,
            vec![Counter::new("amd64_sock", "DRAM")],
        )]);
        let err = record().select(&set, Aggregation::Job).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn test_select_rejects_non_increasing_grid() {
        let mut rec = record();
        rec.t = vec![0.0, 600.0, 600.0];
        let err = rec.select(&l1d(), Aggregation::Job).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }

    #[test]
    fn test_select_rejects_misaligned_hosts() {
        let mut short = record();
        if let Some(by_host) = short.counters.get_mut("intel_snb.LOAD_L1D_ALL") {
            by_host.insert("c2".to_string(), vec![0.0, 5.0]);
        }
        let err = short.select(&l1d(), Aggregation::Job).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
        assert!(err.to_string().contains("c2 has 2 samples, expected 3"));

        let mut missing_host = record();
        missing_host.job.hosts.push("c3".to_string());
        assert!(matches!(
            missing_host.select(&l1d(), Aggregation::PerHost),
            Err(SourceError::Malformed { .. })
        ));

        let mut extra_host = record();
        extra_host.job.hosts.pop();
        assert!(matches!(
            extra_host.select(&l1d(), Aggregation::PerHost),
            Err(SourceError::Malformed { .. })
        ));
    }

    #[test]
    fn test_in_memory_source_missing_job() {
        let source: InMemorySource = vec![record()].into_iter().collect();
        assert_eq!(source.len(), 1);
        assert!(source.load("42", &l1d(), Aggregation::Job).is_ok());
        assert!(matches!(
            source.load("43", &l1d(), Aggregation::Job),
            Err(SourceError::NoData { .. })
        ));
    }

    #[test]
    fn test_directory_source() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("42.json"),
            serde_json::to_vec(&record()).unwrap(),
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("7.json"), b"{ not json").unwrap();
        std::fs::write(temp_dir.path().join("8.json"), b"").unwrap();

        let source = DirectorySource::new(temp_dir.path());
        let ts = source.load("42", &l1d(), Aggregation::PerHost).unwrap();
        assert_eq!(ts.num_hosts(), 2);

        assert!(matches!(
            source.load("7", &l1d(), Aggregation::Job),
            Err(SourceError::Malformed { .. })
        ));
        assert!(matches!(
            source.load("8", &l1d(), Aggregation::Job),
            Err(SourceError::NoData { .. })
        ));
        assert!(matches!(
            source.load("9", &l1d(), Aggregation::Job),
            Err(SourceError::NoData { .. })
        ));
    }
}
