//! Anomaly tests over hardware-counter time series
//!
//! Each test derives a scalar statistic from per-host rate series and
//! compares it against the configured threshold:
//! - Memory bandwidth starvation
//! - Idle or imbalanced cores
//! - Per-host load imbalance (with owner ranking)
//! - Sudden mid-run performance collapse
//! - Low floating-point intensity
//! - Excessive filesystem metadata operations

mod catastrophe;
mod core_idle;
mod imbalance;
mod low_flops;
mod mem_bw;
mod metadata_rate;

pub use catastrophe::{Catastrophe, Changepoint};
pub use core_idle::CoreIdle;
pub use imbalance::{Imbalance, ImbalanceProfile};
pub use low_flops::{FlopsIntensity, LowFlops, PlatformPeaks};
pub use mem_bw::{MemBw, BYTES_PER_CAS, PEAK_BANDWIDTH};
pub use metadata_rate::{MetadataRate, METADATA_OPS};

use crate::models::JobTimeSeries;
use crate::series;

/// Rate series of counter `index` for every host, in host order
pub(crate) fn host_rates(ts: &JobTimeSeries, index: usize) -> Vec<(String, Vec<f64>)> {
    ts.hosts()
        .filter_map(|host| {
            ts.series(index, host)
                .map(|values| (host.to_string(), series::rate(values, &ts.t)))
        })
        .collect()
}

/// Rate series of each host's sum over all loaded counters
pub(crate) fn host_sum_rates(ts: &JobTimeSeries) -> Vec<(String, Vec<f64>)> {
    ts.host_sums()
        .into_iter()
        .map(|(host, values)| {
            let rate = series::rate(&values, &ts.t);
            (host, rate)
        })
        .collect()
}
