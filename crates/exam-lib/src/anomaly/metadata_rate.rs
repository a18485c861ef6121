//! Filesystem metadata operation rate
//!
//! Sums every Lustre client metadata operation across hosts and flags jobs
//! whose peak per-host metadata rate is excessive.

use crate::eligibility::Eligibility;
use crate::exam::{AnomalyTest, SkipReason, TestContext, TestOutcome, Verdict};
use crate::models::{CounterSet, JobTimeSeries};
use crate::series;

/// Lustre client (`llite`) metadata operations
pub const METADATA_OPS: &[&str] = &[
    "open",
    "close",
    "mmap",
    "fsync",
    "setattr",
    "truncate",
    "flock",
    "getattr",
    "statfs",
    "alloc_inode",
    "setxattr",
    "listxattr",
    "removexattr",
    "readdir",
    "create",
    "lookup",
    "link",
    "unlink",
    "symlink",
    "mkdir",
    "rmdir",
    "mknod",
    "rename",
];

/// Flags jobs with a high peak metadata operation rate per host
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataRate;

impl MetadataRate {
    /// Peak over time of the per-host mean metadata operation rate
    pub fn peak_rate(ts: &JobTimeSeries) -> f64 {
        let all: Vec<usize> = (0..ts.data.len()).collect();
        let hosts = ts.num_hosts() as f64;
        let per_host: Vec<f64> = series::rate(&ts.total(&all), &ts.t)
            .into_iter()
            .map(|r| r / hosts)
            .collect();
        series::finite_max(&per_host)
    }
}

impl AnomalyTest for MetadataRate {
    fn name(&self) -> &'static str {
        "metadata_rate"
    }

    fn counters(&self) -> CounterSet {
        let pairs: Vec<(&str, &str)> = METADATA_OPS.iter().map(|op| ("llite", *op)).collect();
        CounterSet::fixed(&pairs)
    }

    fn evaluate(&self, ts: &JobTimeSeries, ctx: &TestContext<'_>) -> TestOutcome {
        if !ctx.filter.check_job(ts, &Eligibility::any_queue()) {
            return TestOutcome::ineligible("job does not meet duration or core criteria");
        }

        let lost = ctx.filter.lost_data(ts);
        if !lost.is_empty() {
            return TestOutcome::Skipped(SkipReason::LostData(lost));
        }

        let peak = Self::peak_rate(ts);
        TestOutcome::Recorded(Verdict::compared(peak, &ctx.threshold))
    }
}
