//! Core data models for job examination

use crate::series;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Hardware performance-counter platform a job ran on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Amd64,
    IntelSnb,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Amd64 => write!(f, "amd64"),
            Platform::IntelSnb => write!(f, "intel_snb"),
        }
    }
}

/// A single (counter family, metric) pair, e.g. `intel_snb_imc` / `CAS_READS`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counter {
    pub family: String,
    pub metric: String,
}

impl Counter {
    pub fn new(family: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            metric: metric.into(),
        }
    }

    /// Key used by job records: `family.metric`
    pub fn key(&self) -> String {
        format!("{}.{}", self.family, self.metric)
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.family, self.metric)
    }
}

/// Counters a test requires, either fixed or chosen by platform
#[derive(Debug, Clone, PartialEq)]
pub enum CounterSet {
    Fixed(Vec<Counter>),
    PerPlatform(Vec<(Platform, Vec<Counter>)>),
}

impl CounterSet {
    /// Build a fixed set from `(family, metric)` pairs
    pub fn fixed(pairs: &[(&str, &str)]) -> Self {
        CounterSet::Fixed(pairs.iter().map(|(f, m)| Counter::new(*f, *m)).collect())
    }

    /// Counters to load for a job on `platform`, `None` when unsupported
    pub fn resolve(&self, platform: Platform) -> Option<&[Counter]> {
        match self {
            CounterSet::Fixed(counters) => Some(counters),
            CounterSet::PerPlatform(table) => table
                .iter()
                .find(|(p, _)| *p == platform)
                .map(|(_, counters)| counters.as_slice()),
        }
    }
}

/// Whether the source should also provide job-wide sums across hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Per-host arrays plus precomputed job-wide totals per counter
    Job,
    /// Per-host arrays only
    PerHost,
}

impl Aggregation {
    pub fn from_flag(aggregate: bool) -> Self {
        if aggregate {
            Aggregation::Job
        } else {
            Aggregation::PerHost
        }
    }
}

/// Batch job metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub owner: String,
    pub queue: String,
    /// Requested cores per node
    pub wayness: u32,
    pub platform: Platform,
    pub hosts: Vec<String>,
}

/// Cumulative counter data for one job, prepared for a single test
///
/// `data[i]` holds the samples of counter `i` (in the order the test
/// requested them) keyed by host id. Every array has the length of `t`.
#[derive(Debug, Clone)]
pub struct JobTimeSeries {
    pub job: JobInfo,
    pub t: Vec<f64>,
    pub data: Vec<BTreeMap<String, Vec<f64>>>,
    /// Job-wide sum across hosts per counter, present in `Aggregation::Job`
    pub totals: Option<Vec<Vec<f64>>>,
}

impl JobTimeSeries {
    /// Number of samples on the time grid
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn num_hosts(&self) -> usize {
        self.job.hosts.len()
    }

    /// Host ids in a stable (sorted) order
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.data
            .first()
            .into_iter()
            .flat_map(|by_host| by_host.keys().map(String::as_str))
    }

    /// Elapsed wall time covered by the samples, in seconds
    pub fn duration(&self) -> f64 {
        match (self.t.first(), self.t.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Cumulative samples of counter `index` on `host`
    pub fn series(&self, index: usize, host: &str) -> Option<&[f64]> {
        self.data
            .get(index)
            .and_then(|by_host| by_host.get(host))
            .map(Vec::as_slice)
    }

    /// Element-wise sum of several counters on one host
    pub fn assemble(&self, indices: &[usize], host: &str) -> Vec<f64> {
        let mut out = vec![0.0; self.len()];
        for &i in indices {
            if let Some(values) = self.series(i, host) {
                series::accumulate(&mut out, values);
            }
        }
        out
    }

    /// Element-wise sum of several counters across every host
    pub fn total(&self, indices: &[usize]) -> Vec<f64> {
        let mut out = vec![0.0; self.len()];
        match &self.totals {
            Some(totals) => {
                for &i in indices {
                    if let Some(values) = totals.get(i) {
                        series::accumulate(&mut out, values);
                    }
                }
            }
            None => {
                let hosts: Vec<&str> = self.hosts().collect();
                for host in hosts {
                    series::accumulate(&mut out, &self.assemble(indices, host));
                }
            }
        }
        out
    }

    /// Per-host series summed over all loaded counters, in host order
    pub fn host_sums(&self) -> Vec<(String, Vec<f64>)> {
        let all: Vec<usize> = (0..self.data.len()).collect();
        self.hosts()
            .map(|h| (h.to_string(), self.assemble(&all, h)))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Build cumulative samples from per-interval rates on a uniform grid
    pub fn cumulative(rates: &[f64], dt: f64) -> Vec<f64> {
        let mut acc = 0.0;
        let mut out = Vec::with_capacity(rates.len() + 1);
        out.push(0.0);
        for r in rates {
            acc += r * dt;
            out.push(acc);
        }
        out
    }

    pub fn job_info(hosts: &[&str]) -> JobInfo {
        JobInfo {
            id: "1001".to_string(),
            owner: "alice".to_string(),
            queue: "normal".to_string(),
            wayness: 16,
            platform: Platform::IntelSnb,
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
        }
    }

    /// Job whose counter `i` on host `h` follows `rates[i][h]` every `dt` seconds
    pub fn job_from_rates(hosts: &[&str], rates: &[Vec<Vec<f64>>], dt: f64) -> JobTimeSeries {
        let steps = rates[0][0].len();
        let t = (0..=steps).map(|i| i as f64 * dt).collect();
        let data = rates
            .iter()
            .map(|per_host| {
                hosts
                    .iter()
                    .zip(per_host)
                    .map(|(h, r)| (h.to_string(), cumulative(r, dt)))
                    .collect()
            })
            .collect();
        JobTimeSeries {
            job: job_info(hosts),
            t,
            data,
            totals: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_counter_set_resolution() {
        let set = CounterSet::PerPlatform(vec![(
            Platform::Amd64,
            vec![Counter::new("amd64_sock", "DRAM")],
        )]);
        assert_eq!(set.resolve(Platform::Amd64).map(|c| c.len()), Some(1));
        assert!(set.resolve(Platform::IntelSnb).is_none());

        let fixed = CounterSet::fixed(&[("llite", "open")]);
        assert_eq!(fixed.resolve(Platform::IntelSnb).unwrap()[0].key(), "llite.open");
    }

    #[test]
    fn test_assemble_and_total() {
        let ts = job_from_rates(
            &["c1", "c2"],
            &[
                vec![vec![1.0, 1.0], vec![2.0, 2.0]],
                vec![vec![10.0, 10.0], vec![20.0, 20.0]],
            ],
            1.0,
        );

        assert_eq!(ts.assemble(&[0, 1], "c1"), vec![0.0, 11.0, 22.0]);
        assert_eq!(ts.total(&[0]), vec![0.0, 3.0, 6.0]);
        assert_eq!(ts.total(&[0, 1]), vec![0.0, 33.0, 66.0]);
        assert_eq!(ts.duration(), 2.0);
        assert_eq!(ts.hosts().collect::<Vec<_>>(), vec!["c1", "c2"]);
    }

    #[test]
    fn test_total_prefers_precomputed_sums() {
        let mut ts = job_from_rates(&["c1"], &[vec![vec![1.0]]], 1.0);
        ts.totals = Some(vec![vec![5.0, 7.0]]);
        assert_eq!(ts.total(&[0]), vec![5.0, 7.0]);
    }
}
