//! Append-only metric series and their point-in-time statistics

use crate::models::MetricKind;
use serde::Serialize;
use std::time::Duration;

/// Accumulator behind one metric name
#[derive(Debug, Clone)]
pub(crate) enum Series {
    Counter { total: f64, samples: u64 },
    Rate { hits: u64, total: u64 },
    Trend(TrendValues),
    Gauge { value: f64, max: f64 },
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TrendValues {
    values: Vec<f64>,
    sum: f64,
    min: f64,
    max: f64,
}

impl Series {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Series::Counter {
                total: 0.0,
                samples: 0,
            },
            MetricKind::Rate => Series::Rate { hits: 0, total: 0 },
            MetricKind::Trend => Series::Trend(TrendValues::default()),
            MetricKind::Gauge => Series::Gauge {
                value: 0.0,
                max: 0.0,
            },
        }
    }

    pub(crate) fn kind(&self) -> MetricKind {
        match self {
            Series::Counter { .. } => MetricKind::Counter,
            Series::Rate { .. } => MetricKind::Rate,
            Series::Trend(_) => MetricKind::Trend,
            Series::Gauge { .. } => MetricKind::Gauge,
        }
    }

    pub(crate) fn record(&mut self, value: f64) {
        match self {
            Series::Counter { total, samples } => {
                *total += value;
                *samples += 1;
            }
            Series::Rate { hits, total } => {
                if value != 0.0 {
                    *hits += 1;
                }
                *total += 1;
            }
            Series::Trend(trend) => {
                if trend.values.is_empty() {
                    trend.min = value;
                    trend.max = value;
                } else {
                    trend.min = trend.min.min(value);
                    trend.max = trend.max.max(value);
                }
                trend.sum += value;
                trend.values.push(value);
            }
            Series::Gauge { value: current, max } => {
                *current += value;
                if *current > *max {
                    *max = *current;
                }
            }
        }
    }

    pub(crate) fn snapshot(&self, elapsed: Duration) -> SeriesSnapshot {
        match self {
            Series::Counter { total, samples } => {
                let secs = elapsed.as_secs_f64();
                SeriesSnapshot::Counter(CounterStats {
                    total: *total,
                    samples: *samples,
                    rate: if secs > 0.0 { total / secs } else { 0.0 },
                })
            }
            Series::Rate { hits, total } => SeriesSnapshot::Rate(RateStats {
                rate: if *total > 0 {
                    *hits as f64 / *total as f64
                } else {
                    0.0
                },
                passes: *hits,
                fails: total - hits,
            }),
            Series::Trend(trend) => SeriesSnapshot::Trend(TrendStats::from_values(
                trend.values.clone(),
                trend.sum,
                trend.min,
                trend.max,
            )),
            Series::Gauge { value, max } => SeriesSnapshot::Gauge(GaugeStats {
                value: *value,
                max: *max,
            }),
        }
    }
}

/// Point-in-time view of one series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SeriesSnapshot {
    Counter(CounterStats),
    Rate(RateStats),
    Trend(TrendStats),
    Gauge(GaugeStats),
}

impl SeriesSnapshot {
    pub fn kind(&self) -> MetricKind {
        match self {
            SeriesSnapshot::Counter(_) => MetricKind::Counter,
            SeriesSnapshot::Rate(_) => MetricKind::Rate,
            SeriesSnapshot::Trend(_) => MetricKind::Trend,
            SeriesSnapshot::Gauge(_) => MetricKind::Gauge,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterStats {
    pub total: f64,
    pub samples: u64,
    /// Total per second of elapsed run time
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateStats {
    pub rate: f64,
    pub passes: u64,
    pub fails: u64,
}

impl RateStats {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeStats {
    pub value: f64,
    pub max: f64,
}

/// Distribution statistics for a trend series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendStats {
    pub count: u64,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    #[serde(skip)]
    sorted: Vec<f64>,
}

impl TrendStats {
    fn from_values(mut values: Vec<f64>, sum: f64, min: f64, max: f64) -> Self {
        values.sort_by(f64::total_cmp);
        let count = values.len() as u64;
        let at = |p: f64| percentile(&values, p).unwrap_or(0.0);

        Self {
            count,
            sum,
            avg: if count > 0 { sum / count as f64 } else { 0.0 },
            min,
            max,
            med: at(50.0),
            p90: at(90.0),
            p95: at(95.0),
            p99: at(99.0),
            sorted: values,
        }
    }

    /// Build statistics from raw observations
    pub fn from_observations(values: &[f64]) -> Self {
        let sum = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if values.is_empty() {
            return Self::from_values(Vec::new(), 0.0, 0.0, 0.0);
        }
        Self::from_values(values.to_vec(), sum, min, max)
    }

    /// Percentile `p` (0..=100) by linear interpolation between ranks
    pub fn percentile(&self, p: f64) -> f64 {
        percentile(&self.sorted, p).unwrap_or(0.0)
    }
}

/// Linear-interpolation percentile over an ascending slice
///
/// The rank is `p / 100 * (n - 1)`; values between two ranks are
/// interpolated. Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(sorted[0]);
    }

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();

        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 100.0), Some(10.0));
        assert!((percentile(&values, 50.0).unwrap() - 5.5).abs() < 1e-9);
        assert!((percentile(&values, 95.0).unwrap() - 9.55).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_edge_cases() {
        assert_eq!(percentile(&[], 95.0), None);
        assert_eq!(percentile(&[42.0], 1.0), Some(42.0));
        assert_eq!(percentile(&[42.0], 99.0), Some(42.0));
    }

    #[test]
    fn test_percentile_is_monotonic() {
        let mut values: Vec<f64> = [250.0, 12.0, 980.0, 33.0, 33.0, 4100.0, 77.5, 610.0, 1.0]
            .to_vec();
        values.sort_by(f64::total_cmp);

        let mut previous = f64::NEG_INFINITY;
        for p in (0..=1000).map(|i| i as f64 / 10.0) {
            let current = percentile(&values, p).unwrap();
            assert!(current >= previous, "p{} = {} < {}", p, current, previous);
            previous = current;
        }
    }

    #[test]
    fn test_trend_series_tracks_min_max_avg() {
        let mut series = Series::new(MetricKind::Trend);
        for v in [30.0, 10.0, 20.0] {
            series.record(v);
        }

        let SeriesSnapshot::Trend(stats) = series.snapshot(Duration::from_secs(1)) else {
            panic!("expected trend snapshot");
        };
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.avg, 20.0);
        assert_eq!(stats.med, 20.0);
    }

    #[test]
    fn test_rate_series() {
        let mut series = Series::new(MetricKind::Rate);
        for hit in [true, false, true, true] {
            series.record(if hit { 1.0 } else { 0.0 });
        }

        let SeriesSnapshot::Rate(stats) = series.snapshot(Duration::ZERO) else {
            panic!("expected rate snapshot");
        };
        assert_eq!(stats.rate, 0.75);
        assert_eq!(stats.passes, 3);
        assert_eq!(stats.fails, 1);
    }

    #[test]
    fn test_counter_rate_per_second() {
        let mut series = Series::new(MetricKind::Counter);
        for _ in 0..50 {
            series.record(1.0);
        }

        let SeriesSnapshot::Counter(stats) = series.snapshot(Duration::from_secs(10)) else {
            panic!("expected counter snapshot");
        };
        assert_eq!(stats.total, 50.0);
        assert_eq!(stats.rate, 5.0);
    }

    #[test]
    fn test_gauge_tracks_peak() {
        let mut series = Series::new(MetricKind::Gauge);
        for delta in [1.0, 1.0, 1.0, -1.0, 1.0, -3.0] {
            series.record(delta);
        }

        let SeriesSnapshot::Gauge(stats) = series.snapshot(Duration::ZERO) else {
            panic!("expected gauge snapshot");
        };
        assert_eq!(stats.value, 0.0);
        assert_eq!(stats.max, 3.0);
    }
}
