//! Idle core detection
//!
//! For each counter family, every host's rate is compared against the
//! busiest host at each interval. A host that persistently trails the
//! group's peak activity indicates idle or poorly balanced cores.

use super::host_rates;
use crate::eligibility::Eligibility;
use crate::exam::{AnomalyTest, TestContext, TestOutcome, Verdict};
use crate::models::{Counter, CounterSet, JobTimeSeries, Platform};
use crate::series;

/// Flags jobs with a host far below the per-interval maximum activity
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreIdle;

impl CoreIdle {
    /// Mean fractional deficit from the cross-host maximum, per (counter, host)
    ///
    /// Non-finite deficits (all hosts idle, so the maximum is zero) count as zero.
    pub fn deficits(ts: &JobTimeSeries) -> Vec<(usize, String, f64)> {
        let intervals = ts.len().saturating_sub(1);
        let mut out = Vec::new();

        for index in 0..ts.data.len() {
            let rates = host_rates(ts, index);
            let peak = series::max_across(rates.iter().map(|(_, r)| r.as_slice()), intervals);

            for (host, rate) in rates {
                let total: f64 = peak
                    .iter()
                    .zip(&rate)
                    .map(|(max, r)| (max - r) / max)
                    .sum();
                let deficit = total / intervals as f64;
                let deficit = if deficit.is_finite() { deficit } else { 0.0 };
                out.push((index, host, deficit));
            }
        }
        out
    }

    /// Largest deficit over every (counter, host) pair
    pub fn max_deficit(ts: &JobTimeSeries) -> f64 {
        Self::deficits(ts)
            .into_iter()
            .map(|(_, _, d)| d)
            .fold(0.0, f64::max)
    }
}

impl AnomalyTest for CoreIdle {
    fn name(&self) -> &'static str {
        "core_idle"
    }

    fn counters(&self) -> CounterSet {
        CounterSet::PerPlatform(vec![
            (
                Platform::Amd64,
                vec![
                    Counter::new("amd64_core", "SSE_FLOPS"),
                    Counter::new("amd64_sock", "DRAM"),
                    Counter::new("cpu", "user"),
                ],
            ),
            (
                Platform::IntelSnb,
                vec![
                    Counter::new("intel_snb", "SIMD_D_256"),
                    Counter::new("intel_snb", "LOAD_L1D_ALL"),
                    Counter::new("cpu", "user"),
                ],
            ),
        ])
    }

    fn evaluate(&self, ts: &JobTimeSeries, ctx: &TestContext<'_>) -> TestOutcome {
        if !ctx.filter.check_job(ts, &Eligibility::standard()) {
            return TestOutcome::ineligible("job does not meet standard criteria");
        }
        if ts.num_hosts() < 2 {
            return TestOutcome::ineligible("fewer than 2 hosts");
        }

        let deficit = Self::max_deficit(ts);
        TestOutcome::Recorded(Verdict::compared(deficit, &ctx.threshold))
    }
}
