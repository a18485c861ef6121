//! Cross-host load imbalance
//!
//! Measures how unevenly a metric is spread across the hosts of a 16-way
//! job. The statistic is the mean over time of the per-interval
//! coefficient of variation across hosts. Every evaluated job also records
//! its statistic against the job owner for ranking.

use super::host_sum_rates;
use crate::eligibility::Eligibility;
use crate::exam::{AnomalyTest, OwnerRatio, TestContext, TestOutcome, Verdict};
use crate::models::{Counter, CounterSet, JobTimeSeries};
use crate::series;
use tracing::debug;

/// Per-interval imbalance measures, first and last interval dropped
#[derive(Debug, Clone, PartialEq)]
pub struct ImbalanceProfile {
    /// Interval midpoints
    pub tmid: Vec<f64>,
    /// Standard deviation over mean across hosts
    pub cv: Vec<f64>,
    /// (max - min) / max across hosts
    pub spread: Vec<f64>,
}

impl ImbalanceProfile {
    pub fn build(ts: &JobTimeSeries) -> Self {
        let tmid = series::midpoints(&ts.t);
        let kept = 1..tmid.len().saturating_sub(1).max(1);

        let rates: Vec<Vec<f64>> = host_sum_rates(ts)
            .into_iter()
            .map(|(_, rate)| rate[kept.clone()].to_vec())
            .collect();
        let steps = kept.len();

        let max = series::max_across(rates.iter().map(Vec::as_slice), steps);
        let min = series::min_across(rates.iter().map(Vec::as_slice), steps);

        let mut cv = Vec::with_capacity(steps);
        for j in 0..steps {
            let at_step: Vec<f64> = rates.iter().map(|r| r[j]).collect();
            cv.push(series::robust_std(&at_step) / series::robust_mean(&at_step));
        }
        let spread = max.iter().zip(&min).map(|(hi, lo)| (hi - lo) / hi).collect();

        Self {
            tmid: tmid[kept].to_vec(),
            cv,
            spread,
        }
    }

    /// Mean coefficient of variation, zero when undefined
    pub fn statistic(&self) -> f64 {
        let mean = series::robust_mean(&self.cv);
        if mean.is_finite() {
            mean
        } else {
            0.0
        }
    }
}

/// Flags 16-way jobs whose hosts diverge on one metric
#[derive(Debug, Clone)]
pub struct Imbalance {
    counter: Counter,
}

impl Imbalance {
    pub fn new(family: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            counter: Counter::new(family, metric),
        }
    }

    pub fn counter(&self) -> &Counter {
        &self.counter
    }
}

impl AnomalyTest for Imbalance {
    fn name(&self) -> &'static str {
        "imbalance"
    }

    fn counters(&self) -> CounterSet {
        CounterSet::Fixed(vec![self.counter.clone()])
    }

    fn evaluate(&self, ts: &JobTimeSeries, ctx: &TestContext<'_>) -> TestOutcome {
        if !ctx.filter.check_job(ts, &Eligibility::sixteen_way()) {
            return TestOutcome::ineligible("job is not a 16-way job of at least one hour");
        }
        if ts.num_hosts() < 2 {
            return TestOutcome::ineligible("fewer than 2 hosts");
        }

        let profile = ImbalanceProfile::build(ts);
        let ratio = profile.statistic();
        debug!(
            job_id = %ts.job.id,
            counter = %self.counter,
            ratio = ratio,
            mean_spread = series::robust_mean(&profile.spread),
            "Imbalance computed"
        );

        TestOutcome::Recorded(Verdict {
            flagged: ctx.threshold.check(ratio.abs()),
            statistic: Some(ratio),
            ratio: Some(OwnerRatio {
                ratio,
                owner: ts.job.owner.clone(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::JobFilter;
    use crate::models::fixtures::job_from_rates;
    use crate::threshold::{Comparison, Threshold};

    fn ctx() -> TestContext<'static> {
        TestContext {
            threshold: Threshold::new(0.25, Comparison::Gt),
            filter: &JobFilter,
        }
    }

    #[test]
    fn test_profile_drops_edge_intervals() {
        // Edge intervals are wildly imbalanced, the interior is not
        let a = vec![1000.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 0.0];
        let b = vec![0.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 1000.0];
        let ts = job_from_rates(&["c1", "c2"], &[vec![a, b]], 600.0);

        let profile = ImbalanceProfile::build(&ts);
        assert_eq!(profile.cv.len(), 6);
        assert_eq!(profile.tmid.len(), 6);
        assert_eq!(profile.tmid[0], 900.0);
        assert_eq!(profile.statistic(), 0.0);
        assert!(profile.spread.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_imbalanced_hosts() {
        let ts = job_from_rates(
            &["c1", "c2"],
            &[vec![vec![30.0; 8], vec![10.0; 8]]],
            600.0,
        );
        let profile = ImbalanceProfile::build(&ts);
        // mean 20, sample std sqrt(200)
        let expected = 200.0f64.sqrt() / 20.0;
        assert!((profile.statistic() - expected).abs() < 1e-12);
        assert!((profile.spread[0] - 2.0 / 3.0).abs() < 1e-12);

        let outcome = Imbalance::new("intel_snb", "LOAD_L1D_ALL").evaluate(&ts, &ctx());
        let verdict = outcome.verdict().unwrap();
        assert!(verdict.flagged);
        assert_eq!(verdict.ratio.as_ref().unwrap().owner, "alice");
    }

    #[test]
    fn test_ratio_recorded_when_not_flagged() {
        let ts = job_from_rates(
            &["c1", "c2"],
            &[vec![vec![10.0; 8], vec![10.0; 8]]],
            600.0,
        );
        let outcome = Imbalance::new("intel_snb", "LOAD_L1D_ALL").evaluate(&ts, &ctx());
        let verdict = outcome.verdict().unwrap();
        assert!(!verdict.flagged);
        assert_eq!(verdict.ratio.as_ref().map(|r| r.ratio), Some(0.0));
    }

    #[test]
    fn test_non_sixteen_way_and_single_host_skipped() {
        let test = Imbalance::new("intel_snb", "LOAD_L1D_ALL");

        let mut ts = job_from_rates(
            &["c1", "c2"],
            &[vec![vec![30.0; 8], vec![10.0; 8]]],
            600.0,
        );
        ts.job.wayness = 8;
        assert!(test.evaluate(&ts, &ctx()).verdict().is_none());

        let single = job_from_rates(&["c1"], &[vec![vec![30.0; 8]]], 600.0);
        assert!(test.evaluate(&single, &ctx()).verdict().is_none());
    }
}
