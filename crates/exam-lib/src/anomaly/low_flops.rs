//! Floating-point intensity
//!
//! For compute-bound jobs, compares achieved FLOP rate against achieved
//! DRAM activity, each normalized by the platform's peak. A low ratio
//! means the job moves a lot of memory for little arithmetic.

use crate::eligibility::Eligibility;
use crate::exam::{AnomalyTest, TestContext, TestOutcome, Verdict};
use crate::models::{Counter, CounterSet, JobTimeSeries, Platform};
use crate::series;
use crate::threshold::Comparison;
use tracing::debug;

/// Fraction of peak CPU utilization a job must exceed to be tested
const CPU_GATE: f64 = 0.5;

/// Peak capacities of a platform and where its counters sit
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformPeaks {
    pub flops: f64,
    pub dram: f64,
    pub cpu: f64,
    flop_counters: &'static [usize],
    dram_counter: usize,
    cpu_counter: usize,
}

impl PlatformPeaks {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Amd64 => Self {
                flops: 2.3e9 * 16.0 * 2.0,
                dram: 24e9,
                cpu: 1.0,
                flop_counters: &[0],
                dram_counter: 1,
                cpu_counter: 2,
            },
            Platform::IntelSnb => Self {
                flops: 16.0 * 2.7e9 * 2.0,
                dram: 16.0 * 2.7e9 / 2.0 * 64.0,
                cpu: 1.0,
                flop_counters: &[0, 1],
                dram_counter: 2,
                cpu_counter: 3,
            },
        }
    }
}

/// Normalized utilization figures for one job
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlopsIntensity {
    /// Mean CPU busy fraction per requested core
    pub cpu_utilization: f64,
    /// (FLOP rate / FLOP peak) / (DRAM rate / DRAM peak)
    pub ratio: f64,
}

/// Flags compute-bound jobs with low FLOP-to-DRAM intensity
#[derive(Debug, Clone, Copy, Default)]
pub struct LowFlops;

impl LowFlops {
    pub fn intensity(ts: &JobTimeSeries) -> FlopsIntensity {
        let peaks = PlatformPeaks::for_platform(ts.job.platform);
        let hosts = ts.num_hosts() as f64;

        let mean_rate = |indices: &[usize]| {
            series::robust_mean(&series::rate(&ts.total(indices), &ts.t)) / hosts
        };
        let flops = mean_rate(peaks.flop_counters);
        let dram = mean_rate(&[peaks.dram_counter][..]);
        let cpu = mean_rate(&[peaks.cpu_counter][..]) / (ts.job.wayness as f64 * 100.0);

        FlopsIntensity {
            cpu_utilization: cpu / peaks.cpu,
            ratio: (flops / peaks.flops) / (dram / peaks.dram),
        }
    }
}

impl AnomalyTest for LowFlops {
    fn name(&self) -> &'static str {
        "low_flops"
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
                    Counter::new("intel_snb", "SSE_D_ALL"),
                    Counter::new("intel_snb", "LOAD_L1D_ALL"),
                    Counter::new("cpu", "user"),
                ],
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
            return TestOutcome::ineligible("fewer than 2 hosts");
        }

        let intensity = Self::intensity(ts);
        if intensity.cpu_utilization <= CPU_GATE {
            debug!(
                job_id = %ts.job.id,
                cpu_utilization = intensity.cpu_utilization,
                "Job not compute bound"
            );
            return TestOutcome::Recorded(Verdict::not_flagged());
        }

        TestOutcome::Recorded(Verdict::compared(intensity.ratio, &ctx.threshold))
    }
}
