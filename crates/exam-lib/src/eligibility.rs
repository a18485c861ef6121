//! Job eligibility checks
//!
//! Restricts analysis to jobs that ran long enough, on a supported core
//! count and outside excluded queues, and reports hosts whose data is
//! incomplete.

use crate::models::JobTimeSeries;
use std::ops::RangeInclusive;
use tracing::debug;

/// Queues holding visualization and GPU jobs, excluded from most tests
pub const EXCLUDED_QUEUES: &[&str] = &["gpu", "gpudev", "vis", "visdev"];

/// One hour, the minimum run time for every test
pub const MIN_DURATION_SECS: f64 = 3600.0;

/// Criteria a job must meet to be tested
#[derive(Debug, Clone, PartialEq)]
pub struct Eligibility {
    pub min_duration_secs: f64,
    /// Allowed requested cores per node
    pub cores: RangeInclusive<u32>,
    pub excluded_queues: &'static [&'static str],
}

impl Eligibility {
    /// One hour, 1-32 cores, GPU and visualization queues excluded
    pub fn standard() -> Self {
        Self {
            min_duration_secs: MIN_DURATION_SECS,
            cores: 1..=32,
            excluded_queues: EXCLUDED_QUEUES,
        }
    }

    /// One hour, 16-way jobs only, GPU and visualization queues excluded
    pub fn sixteen_way() -> Self {
        Self {
            cores: 16..=16,
            ..Self::standard()
        }
    }

    /// One hour, 1-32 cores, any queue
    pub fn any_queue() -> Self {
        Self {
            excluded_queues: &[],
            ..Self::standard()
        }
    }
}

/// Decides whether a prepared job should be tested
pub trait EligibilityFilter: Send + Sync {
    fn check_job(&self, ts: &JobTimeSeries, criteria: &Eligibility) -> bool;

    /// Hosts with missing or corrupted samples
    fn lost_data(&self, ts: &JobTimeSeries) -> Vec<String>;
}

/// Default filter working from the job metadata and time grid
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFilter;

impl EligibilityFilter for JobFilter {
    fn check_job(&self, ts: &JobTimeSeries, criteria: &Eligibility) -> bool {
        let job = &ts.job;

        if ts.duration() < criteria.min_duration_secs {
            debug!(job_id = %job.id, duration = ts.duration(), "Job too short");
            return false;
        }
        if !criteria.cores.contains(&job.wayness) {
            debug!(job_id = %job.id, wayness = job.wayness, "Unsupported core count");
            return false;
        }
        if criteria.excluded_queues.contains(&job.queue.as_str()) {
            debug!(job_id = %job.id, queue = %job.queue, "Excluded queue");
            return false;
        }
        true
    }

    fn lost_data(&self, ts: &JobTimeSeries) -> Vec<String> {
        ts.job
            .hosts
            .iter()
            .filter(|host| {
                ts.data.iter().any(|by_host| match by_host.get(host.as_str()) {
                    None => true,
                    Some(values) => {
                        values.len() != ts.len() || values.iter().any(|v| !v.is_finite())
                    }
                })
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::job_from_rates;

    fn hour_long_job() -> JobTimeSeries {
        // 6 intervals of 10 minutes
        job_from_rates(&["c1", "c2"], &[vec![vec![1.0; 6], vec![1.0; 6]]], 600.0)
    }

    #[test]
    fn test_standard_criteria() {
        let filter = JobFilter;
        let ts = hour_long_job();
        assert!(filter.check_job(&ts, &Eligibility::standard()));

        let mut gpu = ts.clone();
        gpu.job.queue = "gpu".to_string();
        assert!(!filter.check_job(&gpu, &Eligibility::standard()));
        assert!(filter.check_job(&gpu, &Eligibility::any_queue()));
    }

    #[test]
    fn test_short_job_rejected() {
        let ts = job_from_rates(&["c1"], &[vec![vec![1.0; 5]]], 600.0);
        assert!(!JobFilter.check_job(&ts, &Eligibility::standard()));
    }

    #[test]
    fn test_sixteen_way_only() {
        let mut ts = hour_long_job();
        assert!(JobFilter.check_job(&ts, &Eligibility::sixteen_way()));
        ts.job.wayness = 12;
        assert!(!JobFilter.check_job(&ts, &Eligibility::sixteen_way()));
        assert!(JobFilter.check_job(&ts, &Eligibility::standard()));
        ts.job.wayness = 64;
        assert!(!JobFilter.check_job(&ts, &Eligibility::standard()));
    }

    #[test]
    fn test_lost_data() {
        let mut ts = hour_long_job();
        assert!(JobFilter.lost_data(&ts).is_empty());

        if let Some(values) = ts.data[0].get_mut("c2") {
            values.pop();
        }
        ts.job.hosts.push("c3".to_string());
        assert_eq!(JobFilter.lost_data(&ts), vec!["c2", "c3"]);
    }
}
