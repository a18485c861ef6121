//! Mid-run performance collapse
//!
//! Searches every interior split point of each host's rate curve for the
//! one minimizing the ratio of the time-normalized integral after the
//! split to the one before it. A host whose best split falls below the
//! threshold collapsed part way through the run.

use super::host_sum_rates;
use crate::eligibility::Eligibility;
use crate::exam::{AnomalyTest, SkipReason, TestContext, TestOutcome, Verdict};
use crate::models::{Counter, CounterSet, JobTimeSeries, Platform};
use crate::series;
use crate::threshold::Comparison;
use std::collections::BTreeMap;
use tracing::debug;

/// Samples excluded from the split search at either end of the grid
const EDGE_SAMPLES: usize = 2;

/// Best split found for one host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Changepoint {
    /// Rate-interval index where the later segment starts
    pub index: usize,
    /// Post-split over pre-split normalized integral
    pub ratio: f64,
}

/// Flags jobs where some host's activity collapses part way through
#[derive(Debug, Clone, Copy, Default)]
pub struct Catastrophe;

impl Catastrophe {
    /// Post/pre integral ratio for a split at rate index `split`
    fn split_ratio(rate: &[f64], tmid: &[f64], split: usize) -> f64 {
        let last = tmid.len() - 1;
        let before = series::trapz(&rate[..split], &tmid[..split]) / (tmid[split] - tmid[0]);
        let after = series::trapz(&rate[split..], &tmid[split..]) / (tmid[last] - tmid[split]);
        after / before
    }

    /// Minimum-ratio split for every host, keyed by host id
    ///
    /// Hosts whose ratios are all undefined are omitted.
    pub fn changepoints(ts: &JobTimeSeries) -> BTreeMap<String, Changepoint> {
        let tmid = series::midpoints(&ts.t);
        let candidates = EDGE_SAMPLES..ts.len().saturating_sub(EDGE_SAMPLES);

        host_sum_rates(ts)
            .into_iter()
            .filter_map(|(host, rate)| {
                let mut best: Option<Changepoint> = None;
                for split in candidates.clone() {
                    let ratio = Self::split_ratio(&rate, &tmid, split);
                    if ratio.is_nan() {
                        continue;
                    }
                    if best.map_or(true, |b| ratio < b.ratio) {
                        best = Some(Changepoint {
                            index: split,
                            ratio,
                        });
                    }
                }
                best.map(|cp| (host, cp))
            })
            .collect()
    }
}

impl AnomalyTest for Catastrophe {
    fn name(&self) -> &'static str {
        "catastrophe"
    }

    fn counters(&self) -> CounterSet {
        CounterSet::PerPlatform(vec![
            (Platform::Amd64, vec![Counter::new("amd64_sock", "DRAM")]),
            (
                Platform::IntelSnb,
                vec![Counter::new("intel_snb", "LOAD_L1D_ALL")],
            ),
        ])
    }

    fn fixed_comparison(&self) -> Option<Comparison> {
        Some(Comparison::Lt)
    }

    fn evaluate(&self, ts: &JobTimeSeries, ctx: &TestContext<'_>) -> TestOutcome {
        if !ctx.filter.check_job(ts, &Eligibility::standard()) {
            return TestOutcome::ineligible("job does not meet standard criteria");
        }
        if ts.num_hosts() < 2 {
            debug!(job_id = %ts.job.id, "Single-host job, testing anyway");
        }

        let lost = ctx.filter.lost_data(ts);
        if !lost.is_empty() {
            return TestOutcome::Skipped(SkipReason::LostData(lost));
        }

        let changepoints = Self::changepoints(ts);
        if changepoints.is_empty() {
            return TestOutcome::ineligible("too few samples for a changepoint search");
        }

        // First host (in host order) breaching the threshold decides the job
        for (host, cp) in &changepoints {
            if ctx.threshold.check(cp.ratio) {
                debug!(
                    job_id = %ts.job.id,
                    host = %host,
                    index = cp.index,
                    ratio = cp.ratio,
                    "Collapse detected"
                );
                return TestOutcome::Recorded(Verdict {
                    flagged: true,
                    statistic: Some(cp.ratio),
                    ratio: None,
                });
            }
        }

        let lowest = changepoints
            .values()
            .map(|cp| cp.ratio)
            .fold(f64::INFINITY, f64::min);
        TestOutcome::Recorded(Verdict {
            flagged: false,
            statistic: Some(lowest),
            ratio: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::JobFilter;
    use crate::models::fixtures::job_from_rates;
    use crate::threshold::Threshold;

    fn ctx() -> TestContext<'static> {
        TestContext {
            threshold: Threshold::new(0.5, Comparison::Lt),
            filter: &JobFilter,
        }
    }

    /// Rate `high` for intervals before `k`, `low` from `k` on
    fn step(len: usize, k: usize, high: f64, low: f64) -> Vec<f64> {
        (0..len).map(|i| if i < k { high } else { low }).collect()
    }

    #[test]
    fn test_step_drop_located() {
        let k = 12;
        let ts = job_from_rates(
            &["c1", "c2"],
            &[vec![step(24, k, 100.0, 10.0), vec![100.0; 24]]],
            300.0,
        );

        let cps = Catastrophe::changepoints(&ts);
        let c1 = cps["c1"];
        assert!(c1.index.abs_diff(k) <= 1, "index {}", c1.index);
        assert!(c1.ratio < 0.2);
        assert!((cps["c2"].ratio - 1.0).abs() < 0.1);

        let outcome = Catastrophe.evaluate(&ts, &ctx());
        let verdict = outcome.verdict().unwrap();
        assert!(verdict.flagged);
        assert_eq!(verdict.statistic, Some(c1.ratio));
    }

    #[test]
    fn test_steady_job_not_flagged() {
        let ts = job_from_rates(
            &["c1", "c2"],
            &[vec![vec![50.0; 24], vec![80.0; 24]]],
            300.0,
        );
        let outcome = Catastrophe.evaluate(&ts, &ctx());
        assert!(!outcome.is_flagged());
        assert!(outcome.verdict().is_some());
    }

    #[test]
    fn test_job_host_order_does_not_matter() {
        // Both hosts collapse, c1 less severely than c2
        let forward = job_from_rates(
            &["c1", "c2"],
            &[vec![step(24, 8, 100.0, 20.0), step(24, 16, 60.0, 5.0)]],
            300.0,
        );
        let mut reversed = forward.clone();
        reversed.job.hosts.reverse();
        assert_eq!(reversed.job.hosts, vec!["c2", "c1"]);

        let cps = Catastrophe::changepoints(&forward);
        assert!(cps["c1"].ratio < 0.5 && cps["c2"].ratio < cps["c1"].ratio);
        assert_eq!(Catastrophe::changepoints(&reversed), cps);

        // The first breaching host by id decides, whatever the listed order
        let expected = TestOutcome::Recorded(Verdict {
            flagged: true,
            statistic: Some(cps["c1"].ratio),
            ratio: None,
        });
        assert_eq!(Catastrophe.evaluate(&forward, &ctx()), expected);
        assert_eq!(Catastrophe.evaluate(&reversed, &ctx()), expected);
    }

    #[test]
    fn test_single_host_still_tested() {
        let ts = job_from_rates(&["c1"], &[vec![step(24, 12, 100.0, 1.0)]], 300.0);
        assert!(Catastrophe.evaluate(&ts, &ctx()).is_flagged());
    }

    #[test]
    fn test_lost_data_skips_job() {
        let mut ts = job_from_rates(
            &["c1", "c2"],
            &[vec![step(24, 12, 100.0, 1.0), vec![100.0; 24]]],
            300.0,
        );
        if let Some(values) = ts.data[0].get_mut("c2") {
            values[3] = f64::NAN;
        }
        assert_eq!(
            Catastrophe.evaluate(&ts, &ctx()),
            TestOutcome::Skipped(SkipReason::LostData(vec!["c2".to_string()]))
        );
    }
}
