//! Memory bandwidth utilization
//!
//! Compares the mean per-host DRAM bandwidth, derived from memory
//! controller CAS counts, against the peak bandwidth of a node.

use crate::eligibility::Eligibility;
use crate::exam::{AnomalyTest, TestContext, TestOutcome, Verdict};
use crate::models::{CounterSet, JobTimeSeries};
use crate::series;

/// Peak DRAM bandwidth of one node in bytes per second
pub const PEAK_BANDWIDTH: f64 = 76.0e9;

/// Bytes moved by one CAS read or write
pub const BYTES_PER_CAS: f64 = 64.0;

/// Flags jobs by their fraction of peak memory bandwidth
#[derive(Debug, Clone, Copy, Default)]
pub struct MemBw;

impl MemBw {
    /// Mean per-host bandwidth as a fraction of [`PEAK_BANDWIDTH`]
    pub fn bandwidth_fraction(ts: &JobTimeSeries) -> f64 {
        let transfers = ts.total(&[0, 1]);
        let bandwidth = series::scaled_rate(&transfers, &ts.t, BYTES_PER_CAS);
        let per_host = series::robust_mean(&bandwidth) / ts.num_hosts() as f64;
        per_host / PEAK_BANDWIDTH
    }
}

impl AnomalyTest for MemBw {
    fn name(&self) -> &'static str {
        "mem_bw"
    }

    fn counters(&self) -> CounterSet {
        CounterSet::fixed(&[("intel_snb_imc", "CAS_READS"), ("intel_snb_imc", "CAS_WRITES")])
    }

    fn evaluate(&self, ts: &JobTimeSeries, ctx: &TestContext<'_>) -> TestOutcome {
        if !ctx.filter.check_job(ts, &Eligibility::standard()) {
            return TestOutcome::ineligible("job does not meet standard criteria");
        }

        let fraction = Self::bandwidth_fraction(ts);
        TestOutcome::Recorded(Verdict::compared(fraction, &ctx.threshold))
    }
}
