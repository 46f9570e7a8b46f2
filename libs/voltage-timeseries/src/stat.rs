//! Statistics engine
//!
//! Weighted numeric reductions over a window of time-stamped samples.
//!
//! Each sample represents the half-way span to its neighbours: with samples
//! at `t0 < t1 < t2` the sample at `t1` is valid for
//! `[(t0 + t1) / 2, (t1 + t2) / 2]`, the first and last sample only for their
//! single inner half. When a window is given, a sample's weight is the part
//! of its span that falls inside the window.
//!
//! Missing samples are stored as `NaN`. Any missing sample inside the window
//! turns the result into "no data" (`Ok(None)`), except for `count`, which
//! skips them, and `nearest` and `interpolate`, which only look at valid
//! samples.
//!
//! # Circular mode
//!
//! With [`Stat::with_directional`] values are angles in degrees. Successive
//! differences take the shortest arc, so `mean([350, 10])` is `0`, not `180`.

use crate::data_function::FunctionId;
use crate::error::{Result, TimeSeriesError};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

const SECONDS_PER_HOUR: f64 = 3600.0;
const FULL_CIRCLE: f64 = 360.0;
const HALF_CIRCLE: f64 = 180.0;

/// Input sample of the statistics engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// `None` marks an invalid timestamp
    pub time: Option<DateTime<Utc>>,
    /// `NaN` marks a missing value
    pub value: f64,
    /// Seconds of influence, filled in by [`Stat`]
    pub weight: f64,
}

impl Sample {
    pub fn new(time: DateTime<Utc>, value: f64) -> Self {
        Self {
            time: Some(time),
            value,
            weight: 1.0,
        }
    }

    /// Sample without a valid timestamp
    pub fn untimed(value: f64) -> Self {
        Self {
            time: None,
            value,
            weight: 1.0,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.value.is_nan()
    }
}

/// Time range a statistic is restricted to
///
/// Half-open `[start, end)` unless built with [`TimeWindow::closed`]. A
/// missing bound leaves that side open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    inclusive_end: bool,
}

impl TimeWindow {
    /// The whole series
    pub fn all() -> Self {
        Self {
            start: None,
            end: None,
            inclusive_end: false,
        }
    }

    pub fn half_open(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            inclusive_end: false,
        }
    }

    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            inclusive_end: true,
        }
    }

    /// Half-open window with optional bounds
    pub fn between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start,
            end,
            inclusive_end: false,
        }
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// `start > end`
    pub fn is_inverted(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s > e)
    }

    fn is_degenerate(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s == e)
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        let after_start = self.start.map_or(true, |s| time >= s);
        let before_end = match self.end {
            None => true,
            Some(e) if self.inclusive_end => time <= e,
            Some(e) => time < e,
        };
        after_start && before_end
    }

    /// Bounds in milliseconds, open sides as infinities
    fn bounds_ms(&self) -> (f64, f64) {
        (
            self.start.map_or(f64::NEG_INFINITY, to_ms),
            self.end.map_or(f64::INFINITY, to_ms),
        )
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::all()
    }
}

/// Statistics over one sample list
#[derive(Debug, Clone)]
pub struct Stat {
    samples: Vec<Sample>,
    weighted: bool,
    directional: bool,
    lower_limit: f64,
    upper_limit: f64,
    invalid_times: bool,
}

impl Stat {
    /// Create a weighted, non-circular statistics engine
    pub fn new(samples: Vec<Sample>) -> Self {
        let mut stat = Self {
            samples: Vec::new(),
            weighted: true,
            directional: false,
            lower_limit: f64::NEG_INFINITY,
            upper_limit: f64::INFINITY,
            invalid_times: false,
        };
        stat.set_data(samples);
        stat
    }

    /// Enable or disable time weighting (`sum` never weights)
    pub fn with_weights(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    /// Treat values as angles in degrees
    pub fn with_directional(mut self, directional: bool) -> Self {
        self.directional = directional;
        self
    }

    /// Inclusive range used by `percentage` and `count`
    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.lower_limit = lower;
        self.upper_limit = upper;
        self
    }

    /// Replace the samples and recompute their weights
    pub fn set_data(&mut self, mut samples: Vec<Sample>) {
        self.invalid_times = samples.iter().any(|s| s.time.is_none());
        if !self.invalid_times && !samples.windows(2).all(|w| w[0].time <= w[1].time) {
            samples.sort_by(|a, b| a.time.cmp(&b.time));
        }
        self.samples = samples;
        self.calculate_weights();
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// True when some sample has an invalid timestamp; only whole-series
    /// statistics are available then
    pub fn has_invalid_times(&self) -> bool {
        self.invalid_times
    }

    fn calculate_weights(&mut self) {
        if self.invalid_times || self.samples.len() == 1 {
            for sample in &mut self.samples {
                sample.weight = 1.0;
            }
            return;
        }

        let times: Vec<f64> = self.samples.iter().map(sample_ms).collect();
        let last = times.len().saturating_sub(1);
        for (i, sample) in self.samples.iter_mut().enumerate() {
            let mut weight_ms = 0.0;
            if i > 0 {
                weight_ms += 0.5 * (times[i] - times[i - 1]);
            }
            if i < last {
                weight_ms += 0.5 * (times[i + 1] - times[i]);
            }
            sample.weight = weight_ms / 1000.0;
        }
    }

    // ------------------------------------------------------------------
    // Window extraction
    // ------------------------------------------------------------------

    /// Samples inside the window with their in-window weights
    ///
    /// `Ok(None)` when the window is inverted.
    fn extract(&self, window: &TimeWindow, use_weights: bool) -> Result<Option<Vec<Sample>>> {
        if window.is_inverted() {
            return Ok(None);
        }
        if self.samples.is_empty() {
            return Ok(Some(Vec::new()));
        }
        if window.is_unbounded() {
            let samples = self
                .samples
                .iter()
                .map(|s| Sample {
                    weight: if use_weights { s.weight } else { 1.0 },
                    ..*s
                })
                .collect();
            return Ok(Some(samples));
        }
        if self.invalid_times {
            return Err(TimeSeriesError::invalid_window(
                "samples with invalid timestamps only support whole-series statistics",
            ));
        }

        if !use_weights || self.samples.len() == 1 || window.is_degenerate() {
            return Ok(Some(self.members(window)));
        }

        let (start, end) = window.bounds_ms();
        let times: Vec<f64> = self.samples.iter().map(sample_ms).collect();
        let last = times.len() - 1;
        let mut selected = Vec::new();
        for (i, sample) in self.samples.iter().enumerate() {
            let lo = if i > 0 {
                0.5 * (times[i - 1] + times[i])
            } else {
                times[i]
            };
            let hi = if i < last {
                0.5 * (times[i] + times[i + 1])
            } else {
                times[i]
            };
            let overlap = hi.min(end) - lo.max(start);
            if overlap > 0.0 {
                selected.push(Sample {
                    weight: overlap / 1000.0,
                    ..*sample
                });
            }
        }
        // A window touching only the outer edge of a span
        if selected.is_empty() {
            return Ok(Some(self.members(window)));
        }
        Ok(Some(selected))
    }

    /// Samples inside the window, each with unit weight
    fn members(&self, window: &TimeWindow) -> Vec<Sample> {
        self.samples
            .iter()
            .filter(|s| s.time.is_some_and(|t| window.contains(t)))
            .map(|s| Sample { weight: 1.0, ..*s })
            .collect()
    }

    /// Extraction under the propagate-missing policy
    fn strict(&self, window: &TimeWindow, use_weights: bool) -> Result<Option<Vec<Sample>>> {
        let Some(samples) = self.extract(window, use_weights)? else {
            return Ok(None);
        };
        if samples.is_empty() || samples.iter().any(Sample::is_missing) {
            return Ok(None);
        }
        Ok(Some(samples))
    }

    /// Values in time order, unwrapped to a continuous angle in circular mode
    fn values(&self, samples: &[Sample]) -> Vec<f64> {
        let raw = samples.iter().map(|s| s.value);
        if !self.directional {
            return raw.collect();
        }
        let mut unwrapped = Vec::with_capacity(samples.len());
        let mut previous: Option<(f64, f64)> = None;
        for value in raw {
            let current = match previous {
                None => value,
                Some((prev_raw, prev_unwrapped)) => prev_unwrapped + angle_diff(prev_raw, value),
            };
            unwrapped.push(current);
            previous = Some((value, current));
        }
        unwrapped
    }

    fn finish_angle(&self, value: f64) -> f64 {
        if self.directional {
            normalize_angle(value)
        } else {
            value
        }
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    /// Dispatch by function id; `reference` is the target time of
    /// `nearest` and `interpolate`
    pub fn compute(
        &self,
        id: FunctionId,
        window: &TimeWindow,
        reference: Option<DateTime<Utc>>,
    ) -> Result<Option<f64>> {
        let result = match id {
            FunctionId::Mean => self.mean(window),
            FunctionId::Max => self.max(window),
            FunctionId::Min => self.min(window),
            FunctionId::Median => self.median(window),
            FunctionId::Sum => self.sum(window),
            FunctionId::Integ => self.integ(window),
            FunctionId::StdDev => self.stddev(window),
            FunctionId::Variance => self.variance(window),
            FunctionId::Percentage => self.percentage(window),
            FunctionId::Count => self.count(window),
            FunctionId::Change => self.change(window),
            FunctionId::Trend => self.trend(window),
            FunctionId::Nearest | FunctionId::Interpolate => {
                let reference = reference.ok_or_else(|| {
                    TimeSeriesError::computation(format!("{} needs a reference time", id))
                })?;
                if id == FunctionId::Nearest {
                    self.nearest(reference, window)
                } else {
                    self.interpolate(reference, window)
                }
            },
            FunctionId::Null => Err(TimeSeriesError::computation(
                "null function has no statistic",
            )),
        }?;
        tracing::trace!(function = %id, ?result, "Computed statistic");
        Ok(result)
    }

    /// Time-weighted mean
    pub fn mean(&self, window: &TimeWindow) -> Result<Option<f64>> {
        let Some(samples) = self.strict(window, self.weighted)? else {
            return Ok(None);
        };
        let values = self.values(&samples);
        Ok(weighted_mean(&values, &samples).map(|m| self.finish_angle(m)))
    }

    /// Plain sum, never weighted
    pub fn sum(&self, window: &TimeWindow) -> Result<Option<f64>> {
        let Some(samples) = self.strict(window, false)? else {
            return Ok(None);
        };
        let total: f64 = samples.iter().map(|s| s.value).sum();
        Ok(Some(self.finish_angle(total)))
    }

    /// Time integral in value-hours
    pub fn integ(&self, window: &TimeWindow) -> Result<Option<f64>> {
        let Some(samples) = self.strict(window, self.weighted)? else {
            return Ok(None);
        };
        let total: f64 = samples.iter().map(|s| s.value * s.weight).sum();
        Ok(Some(self.finish_angle(total / SECONDS_PER_HOUR)))
    }

    pub fn min(&self, window: &TimeWindow) -> Result<Option<f64>> {
        let Some(samples) = self.strict(window, false)? else {
            return Ok(None);
        };
        Ok(samples
            .iter()
            .map(|s| s.value)
            .min_by(|a, b| a.total_cmp(b)))
    }

    pub fn max(&self, window: &TimeWindow) -> Result<Option<f64>> {
        let Some(samples) = self.strict(window, false)? else {
            return Ok(None);
        };
        Ok(samples
            .iter()
            .map(|s| s.value)
            .max_by(|a, b| a.total_cmp(b)))
    }

    /// Weighted median
    ///
    /// Each sample counts `ceil(weight)` times; with an even total the two
    /// middle values are averaged.
    pub fn median(&self, window: &TimeWindow) -> Result<Option<f64>> {
        let Some(samples) = self.strict(window, self.weighted)? else {
            return Ok(None);
        };
        let values = self.values(&samples);
        let items: Vec<(f64, u64)> = values
            .into_iter()
            .zip(samples.iter())
            .map(|(v, s)| (v, s.weight.ceil() as u64))
            .filter(|(_, count)| *count > 0)
            .collect();
        Ok(weighted_median(items).map(|m| self.finish_angle(m)))
    }

    /// Weighted population variance
    pub fn variance(&self, window: &TimeWindow) -> Result<Option<f64>> {
        let Some(samples) = self.strict(window, self.weighted)? else {
            return Ok(None);
        };
        let values = self.values(&samples);
        let Some(mean) = weighted_mean(&values, &samples) else {
            return Ok(None);
        };
        let total_weight: f64 = samples.iter().map(|s| s.weight).sum();
        let squares: f64 = values
            .iter()
            .zip(samples.iter())
            .map(|(v, s)| s.weight * (v - mean).powi(2))
            .sum();
        Ok(Some(squares / total_weight))
    }

    pub fn stddev(&self, window: &TimeWindow) -> Result<Option<f64>> {
        Ok(self.variance(window)?.map(f64::sqrt))
    }

    /// Share of time (or of samples when unweighted) spent inside the
    /// limits, in percent
    pub fn percentage(&self, window: &TimeWindow) -> Result<Option<f64>> {
        let Some(samples) = self.strict(window, self.weighted)? else {
            return Ok(None);
        };
        let total: f64 = samples.iter().map(|s| s.weight).sum();
        if total <= 0.0 {
            return Ok(None);
        }
        let inside: f64 = samples
            .iter()
            .filter(|s| self.in_range(s.value))
            .map(|s| s.weight)
            .sum();
        Ok(Some(100.0 * inside / total))
    }

    /// Number of valid samples inside the limits; missing samples are skipped
    pub fn count(&self, window: &TimeWindow) -> Result<Option<f64>> {
        let Some(samples) = self.extract(window, false)? else {
            return Ok(None);
        };
        let count = samples
            .iter()
            .filter(|s| !s.is_missing() && self.in_range(s.value))
            .count();
        Ok(Some(count as f64))
    }

    /// Last minus first value; in circular mode the sum of shortest-arc steps
    pub fn change(&self, window: &TimeWindow) -> Result<Option<f64>> {
        let Some(samples) = self.strict(window, false)? else {
            return Ok(None);
        };
        let values = self.values(&samples);
        match (values.first(), values.last()) {
            (Some(first), Some(last)) => Ok(Some(last - first)),
            _ => Ok(None),
        }
    }

    /// `(rising steps - falling steps) / steps * 100`
    pub fn trend(&self, window: &TimeWindow) -> Result<Option<f64>> {
        let Some(samples) = self.strict(window, false)? else {
            return Ok(None);
        };
        let values = self.values(&samples);
        let steps = values.len().saturating_sub(1);
        if steps == 0 {
            return Ok(None);
        }
        let (rising, falling) = values
            .windows(2)
            .fold((0i64, 0i64), |(up, down), w| match w[1].total_cmp(&w[0]) {
                Ordering::Greater => (up + 1, down),
                Ordering::Less => (up, down + 1),
                Ordering::Equal => (up, down),
            });
        Ok(Some((rising - falling) as f64 / steps as f64 * 100.0))
    }

    /// Value of the valid sample closest in time to `reference`; missing
    /// samples are skipped and ties go to the earlier sample
    pub fn nearest(&self, reference: DateTime<Utc>, window: &TimeWindow) -> Result<Option<f64>> {
        if self.invalid_times {
            return Err(TimeSeriesError::invalid_window(
                "nearest needs valid sample timestamps",
            ));
        }
        let Some(samples) = self.extract(window, false)? else {
            return Ok(None);
        };
        let nearest = samples
            .iter()
            .filter(|s| !s.is_missing())
            .filter_map(|s| s.time.map(|t| ((t - reference).num_milliseconds().abs(), s)))
            .min_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, s)| s.value);
        Ok(nearest)
    }

    /// Linear interpolation at `reference`
    ///
    /// An exact timestamp match wins. Otherwise the closest samples on both
    /// sides are used, or the two closest samples on one side when the
    /// reference lies outside the data. Needs two valid samples.
    pub fn interpolate(
        &self,
        reference: DateTime<Utc>,
        window: &TimeWindow,
    ) -> Result<Option<f64>> {
        if self.invalid_times {
            return Err(TimeSeriesError::invalid_window(
                "interpolate needs valid sample timestamps",
            ));
        }
        let Some(samples) = self.extract(window, false)? else {
            return Ok(None);
        };
        let valid: Vec<(f64, f64)> = samples
            .iter()
            .filter(|s| !s.is_missing())
            .filter_map(|s| s.time.map(|t| (to_ms(t), s.value)))
            .collect();

        let target = to_ms(reference);
        if let Some((_, value)) = valid.iter().find(|(t, _)| *t == target) {
            return Ok(Some(*value));
        }
        if valid.len() < 2 {
            return Ok(None);
        }

        let split = valid.partition_point(|(t, _)| *t < target);
        let (a, b) = if split == 0 {
            (valid[0], valid[1])
        } else if split == valid.len() {
            (valid[split - 2], valid[split - 1])
        } else {
            (valid[split - 1], valid[split])
        };
        if a.0 == b.0 {
            return Ok(None);
        }

        let step = if self.directional {
            angle_diff(a.1, b.1)
        } else {
            b.1 - a.1
        };
        let value = a.1 + step * (target - a.0) / (b.0 - a.0);
        Ok(Some(self.finish_angle(value)))
    }

    fn in_range(&self, value: f64) -> bool {
        value >= self.lower_limit && value <= self.upper_limit
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn to_ms(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64
}

fn sample_ms(sample: &Sample) -> f64 {
    sample.time.map_or(0.0, to_ms)
}

/// Shortest signed arc from `from` to `to`, in `(-180, 180]`
pub fn angle_diff(from: f64, to: f64) -> f64 {
    let diff = (to - from).rem_euclid(FULL_CIRCLE);
    if diff > HALF_CIRCLE {
        diff - FULL_CIRCLE
    } else {
        diff
    }
}

/// Reduce an angle into `[0, 360)`
pub fn normalize_angle(angle: f64) -> f64 {
    let reduced = angle.rem_euclid(FULL_CIRCLE);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if reduced >= FULL_CIRCLE {
        0.0
    } else {
        reduced
    }
}

fn weighted_mean(values: &[f64], samples: &[Sample]) -> Option<f64> {
    let total_weight: f64 = samples.iter().map(|s| s.weight).sum();
    if total_weight <= 0.0 {
        return None;
    }
    let total: f64 = values
        .iter()
        .zip(samples.iter())
        .map(|(v, s)| v * s.weight)
        .sum();
    Some(total / total_weight)
}

/// Median of values repeated `count` times, without materialising them
fn weighted_median(mut items: Vec<(f64, u64)>) -> Option<f64> {
    items.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: u64 = items.iter().map(|(_, count)| count).sum();
    if total == 0 {
        return None;
    }

    let nth = |position: u64| -> Option<f64> {
        let mut seen = 0;
        for (value, count) in &items {
            seen += count;
            if position < seen {
                return Some(*value);
            }
        }
        None
    };

    let lower = nth((total - 1) / 2)?;
    if total % 2 == 1 {
        return Some(lower);
    }
    let upper = nth(total / 2)?;
    Some((lower + upper) / 2.0)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn stat(points: &[(i64, f64)]) -> Stat {
        Stat::new(points.iter().map(|(m, v)| Sample::new(t(*m), *v)).collect())
    }

    fn approx(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("expected a value");
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_weights_are_half_intervals() {
        let s = stat(&[(0, 1.0), (10, 2.0), (30, 3.0)]);
        let weights: Vec<f64> = s.samples().iter().map(|s| s.weight).collect();
        assert_eq!(weights, vec![300.0, 900.0, 600.0]);
    }

    #[test]
    fn test_weighted_mean_two_samples() {
        let s = stat(&[(0, 10.0), (60, 20.0)]);
        approx(s.mean(&TimeWindow::all()).unwrap(), 15.0);
        approx(s.mean(&TimeWindow::half_open(t(0), t(60))).unwrap(), 15.0);
    }

    #[test]
    fn test_weighted_mean_uneven_spacing() {
        // weights 300, 900, 600
        let s = stat(&[(0, 1.0), (10, 2.0), (30, 3.0)]);
        approx(
            s.mean(&TimeWindow::all()).unwrap(),
            (300.0 + 1800.0 + 1800.0) / 1800.0,
        );
    }

    #[test]
    fn test_window_splits_intervals_at_midpoint() {
        // Window [0, 15) takes 5 min of the first sample and 10 min of the second
        let s = stat(&[(0, 0.0), (10, 30.0), (20, 60.0)]);
        approx(
            s.mean(&TimeWindow::half_open(t(0), t(15))).unwrap(),
            (0.0 * 300.0 + 30.0 * 600.0) / 900.0,
        );
    }

    #[test]
    fn test_unweighted_mean() {
        let s = stat(&[(0, 1.0), (10, 2.0), (30, 6.0)]).with_weights(false);
        approx(s.mean(&TimeWindow::all()).unwrap(), 3.0);
    }

    #[test]
    fn test_directional_mean_wraps() {
        let s = stat(&[(0, 350.0), (10, 10.0)]).with_directional(true);
        approx(s.mean(&TimeWindow::all()).unwrap(), 0.0);

        let s = stat(&[(0, 340.0), (10, 350.0), (20, 20.0)]).with_directional(true);
        // unwrapped 340, 350, 380 with weights 300, 600, 300
        approx(
            s.mean(&TimeWindow::all()).unwrap(),
            (340.0 * 300.0 + 350.0 * 600.0 + 380.0 * 300.0) / 1200.0,
        );
    }

    #[test]
    fn test_sum_and_integ() {
        let s = stat(&[(0, 10.0), (60, 20.0), (120, 30.0)]);
        approx(s.sum(&TimeWindow::all()).unwrap(), 60.0);
        // 10 * 1800 + 20 * 3600 + 30 * 1800 seconds
        approx(s.integ(&TimeWindow::all()).unwrap(), 40.0);

        let s = stat(&[(0, 350.0), (60, 20.0)]).with_directional(true);
        approx(s.sum(&TimeWindow::all()).unwrap(), 10.0);
    }

    #[test]
    fn test_min_max() {
        let s = stat(&[(0, 3.0), (10, -1.0), (20, 7.5)]);
        approx(s.min(&TimeWindow::all()).unwrap(), -1.0);
        approx(s.max(&TimeWindow::all()).unwrap(), 7.5);
        approx(s.max(&TimeWindow::half_open(t(0), t(20))).unwrap(), 3.0);
    }

    #[test]
    fn test_weighted_median() {
        // weights 300, 600, 300: value 2 covers the middle of the 1200 units
        let s = stat(&[(0, 1.0), (10, 2.0), (20, 100.0)]);
        approx(s.median(&TimeWindow::all()).unwrap(), 2.0);

        // unweighted even count averages the middle pair
        let s = stat(&[(0, 4.0), (10, 1.0), (20, 3.0), (30, 2.0)]).with_weights(false);
        approx(s.median(&TimeWindow::all()).unwrap(), 2.5);
    }

    #[test]
    fn test_weighted_median_even_split() {
        assert_eq!(weighted_median(vec![(1.0, 2), (5.0, 2)]), Some(3.0));
        assert_eq!(weighted_median(vec![(1.0, 1), (5.0, 2)]), Some(5.0));
        assert_eq!(weighted_median(vec![]), None);
    }

    #[test]
    fn test_variance_and_stddev() {
        let s = stat(&[(0, 2.0), (10, 4.0), (20, 4.0), (30, 4.0), (40, 5.0), (50, 5.0), (60, 7.0), (70, 9.0)])
            .with_weights(false);
        approx(s.variance(&TimeWindow::all()).unwrap(), 4.0);
        approx(s.stddev(&TimeWindow::all()).unwrap(), 2.0);
    }

    #[test]
    fn test_percentage_and_count() {
        let s = stat(&[(0, 1.0), (10, 5.0), (20, 9.0), (30, 5.0)]).with_limits(4.0, 6.0);
        // weights 300, 600, 600, 300; in range: 600 + 300
        approx(s.percentage(&TimeWindow::all()).unwrap(), 50.0);
        approx(s.count(&TimeWindow::all()).unwrap(), 2.0);
    }

    #[test]
    fn test_change_and_trend() {
        let s = stat(&[(0, 1.0), (10, 3.0), (20, 2.0), (30, 5.0), (40, 5.0)]);
        approx(s.change(&TimeWindow::all()).unwrap(), 4.0);
        // 2 rising, 1 falling, 4 steps
        approx(s.trend(&TimeWindow::all()).unwrap(), 25.0);

        let s = stat(&[(0, 350.0), (10, 10.0), (20, 30.0)]).with_directional(true);
        approx(s.change(&TimeWindow::all()).unwrap(), 40.0);
        approx(s.trend(&TimeWindow::all()).unwrap(), 100.0);
    }

    #[test]
    fn test_nearest() {
        let s = stat(&[(0, 1.0), (10, 2.0), (20, 3.0)]);
        approx(s.nearest(t(14), &TimeWindow::all()).unwrap(), 2.0);
        approx(s.nearest(t(15), &TimeWindow::all()).unwrap(), 2.0);
        approx(s.nearest(t(100), &TimeWindow::all()).unwrap(), 3.0);
    }

    #[test]
    fn test_nearest_skips_missing() {
        let s = stat(&[(0, 1.0), (10, f64::NAN), (20, 3.0)]);
        approx(s.nearest(t(0), &TimeWindow::all()).unwrap(), 1.0);
        // The gap itself resolves to the earlier valid neighbour on a tie
        approx(s.nearest(t(10), &TimeWindow::all()).unwrap(), 1.0);
        approx(s.nearest(t(12), &TimeWindow::all()).unwrap(), 3.0);

        let gap = stat(&[(0, f64::NAN), (10, f64::NAN)]);
        assert_eq!(gap.nearest(t(5), &TimeWindow::all()).unwrap(), None);
    }

    #[test]
    fn test_interpolate_and_extrapolate() {
        let s = stat(&[(0, 0.0), (10, 10.0)]);
        approx(s.interpolate(t(5), &TimeWindow::all()).unwrap(), 5.0);
        approx(s.interpolate(t(10), &TimeWindow::all()).unwrap(), 10.0);
        approx(s.interpolate(t(15), &TimeWindow::all()).unwrap(), 15.0);
        approx(s.interpolate(t(-5), &TimeWindow::all()).unwrap(), -5.0);

        let single = stat(&[(0, 4.0)]);
        assert_eq!(single.interpolate(t(5), &TimeWindow::all()).unwrap(), None);
    }

    #[test]
    fn test_interpolate_skips_missing() {
        let s = stat(&[(0, 0.0), (5, f64::NAN), (10, 10.0)]);
        approx(s.interpolate(t(5), &TimeWindow::all()).unwrap(), 5.0);
    }

    #[test]
    fn test_directional_interpolation() {
        let s = stat(&[(0, 350.0), (10, 10.0)]).with_directional(true);
        approx(s.interpolate(t(5), &TimeWindow::all()).unwrap(), 0.0);
        approx(s.interpolate(t(20), &TimeWindow::all()).unwrap(), 30.0);
    }

    #[test]
    fn test_missing_propagates() {
        let s = stat(&[(0, 1.0), (10, f64::NAN), (20, 3.0)]);
        assert_eq!(s.mean(&TimeWindow::all()).unwrap(), None);
        assert_eq!(s.max(&TimeWindow::all()).unwrap(), None);
        assert_eq!(s.sum(&TimeWindow::all()).unwrap(), None);
        approx(s.count(&TimeWindow::all()).unwrap(), 2.0);
        // the window avoids the missing sample's span
        approx(s.mean(&TimeWindow::half_open(t(0), t(5))).unwrap(), 1.0);
    }

    #[test]
    fn test_empty_and_inverted_windows() {
        let s = stat(&[(0, 1.0), (10, 2.0)]);
        assert_eq!(s.mean(&TimeWindow::half_open(t(10), t(0))).unwrap(), None);
        assert_eq!(s.count(&TimeWindow::half_open(t(10), t(0))).unwrap(), None);
        assert_eq!(s.mean(&TimeWindow::half_open(t(100), t(200))).unwrap(), None);
        approx(s.count(&TimeWindow::half_open(t(100), t(200))).unwrap(), 0.0);

        let empty = Stat::new(Vec::new());
        assert_eq!(empty.mean(&TimeWindow::all()).unwrap(), None);
        approx(empty.count(&TimeWindow::all()).unwrap(), 0.0);
        assert_eq!(empty.mean(&TimeWindow::half_open(t(0), t(60))).unwrap(), None);
        assert_eq!(empty.median(&TimeWindow::closed(t(0), t(60))).unwrap(), None);
        approx(empty.count(&TimeWindow::closed(t(0), t(60))).unwrap(), 0.0);
    }

    #[test]
    fn test_point_window_selects_exact_sample() {
        let s = stat(&[(0, 1.0), (10, 2.0), (20, 3.0)]);
        approx(s.mean(&TimeWindow::closed(t(10), t(10))).unwrap(), 2.0);
        assert_eq!(s.mean(&TimeWindow::half_open(t(10), t(10))).unwrap(), None);
    }

    #[test]
    fn test_invalid_times_disable_windows() {
        let s = Stat::new(vec![Sample::untimed(1.0), Sample::untimed(3.0)]);
        assert!(s.has_invalid_times());
        approx(s.mean(&TimeWindow::all()).unwrap(), 2.0);
        let err = s.mean(&TimeWindow::half_open(t(0), t(10))).unwrap_err();
        assert!(matches!(err, TimeSeriesError::InvalidWindow(_)));
    }

    #[test]
    fn test_compute_requires_reference_for_nearest() {
        let s = stat(&[(0, 1.0)]);
        assert!(s.compute(FunctionId::Nearest, &TimeWindow::all(), None).is_err());
        approx(
            s.compute(FunctionId::Nearest, &TimeWindow::all(), Some(t(3))).unwrap(),
            1.0,
        );
    }

    #[test]
    fn test_angle_helpers() {
        assert_eq!(angle_diff(350.0, 10.0), 20.0);
        assert_eq!(angle_diff(10.0, 350.0), -20.0);
        assert_eq!(angle_diff(0.0, 180.0), 180.0);
        assert_eq!(normalize_angle(-10.0), 350.0);
        assert_eq!(normalize_angle(720.0), 0.0);
    }
}
