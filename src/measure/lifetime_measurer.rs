use crate::error::CalcError;
use hdrhistogram::Histogram;
use std::fmt::{Display, Formatter};

/// Distribution of FIB entry lifetimes, in trace time units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LifetimeStats {
    /// Total number of samples.
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    /// 50th percentile (median).
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub p999: u64,
}

impl Display for LifetimeStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return write!(f, "No lifetimes recorded");
        }
        write!(
            f,
            "count={},\tmin={},\tmax={},\tmean={:.1},\tp50={},\tp90={},\tp99={},\tp999={}",
            self.count, self.min, self.max, self.mean, self.p50, self.p90, self.p99, self.p999,
        )
    }
}

/// Records lifetimes into an HdrHistogram.
///
/// The histogram resizes itself, so arbitrarily long traces fit.
pub struct LifetimeMeasurer {
    histogram: Histogram<u64>,
}

impl LifetimeMeasurer {
    pub fn new() -> Result<Self, CalcError> {
        // 3 significant figures
        let histogram =
            Histogram::<u64>::new(3).map_err(|e| CalcError::Histogram(format!("{e:?}")))?;
        Ok(Self { histogram })
    }

    /// Negative lifetimes (a free before its allocate in trace time) count as 0.
    pub fn record(&mut self, lifetime: i128) {
        let value = u64::try_from(lifetime.max(0)).unwrap_or(u64::MAX);
        if self.histogram.record(value).is_err() {
            self.histogram.saturating_record(value);
        }
    }

    pub fn get_stats(&self) -> LifetimeStats {
        let count = self.histogram.len();
        if count == 0 {
            return LifetimeStats::default();
        }

        LifetimeStats {
            count,
            min: self.histogram.min(),
            max: self.histogram.max(),
            mean: self.histogram.mean(),
            p50: self.histogram.value_at_quantile(0.5),
            p90: self.histogram.value_at_quantile(0.9),
            p99: self.histogram.value_at_quantile(0.99),
            p999: self.histogram.value_at_quantile(0.999),
        }
    }

    pub fn format_stats(&self) -> String {
        self.get_stats().to_string()
    }
}
