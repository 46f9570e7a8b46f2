//! Time and area aggregation
//!
//! Applies a [`DataFunctions`] pair to a series or a group of per-location
//! series. Time functions produce one windowed result per original
//! timestep; area functions reduce all group members at a timestep into one
//! value.
//!
//! | inner | outer | result |
//! |-------|-------|--------|
//! | time  | -     | each member time-aggregated |
//! | area  | -     | one area-reduced series |
//! | time  | area  | members time-aggregated, then area-reduced |
//! | area  | time  | area-reduced, then time-aggregated |

use crate::data_function::{DataFunction, DataFunctions, FunctionDomain, FunctionId};
use crate::error::{Result, ResultExt, TimeSeriesError};
use crate::reducers;
use crate::stat::{Sample, Stat, TimeWindow};
use crate::value::{
    LocalDateTime, LonLatTimeSeries, TimeSeries, TimeSeriesGroup, TimeSeriesVector, TimedValue,
    Value, ValueKind,
};
use chrono::Duration;
use std::borrow::Cow;

/// Stateless aggregation driver
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Apply the time function of `funcs` to one series
    ///
    /// Area functions have nothing to reduce over in a single series and are
    /// ignored.
    pub fn aggregate(&self, series: &TimeSeries, funcs: &DataFunctions) -> Result<TimeSeries> {
        match funcs.time_function() {
            Some(func) => self
                .time_aggregate(series, func)
                .with_context(|| format!("applying {}", funcs)),
            None => Ok(series.clone()),
        }
    }

    /// Apply the time function of `funcs` to each series of a vector
    pub fn aggregate_vector(
        &self,
        vector: &TimeSeriesVector,
        funcs: &DataFunctions,
    ) -> Result<TimeSeriesVector> {
        vector
            .iter()
            .map(|series| self.aggregate(series, funcs))
            .collect()
    }

    /// Apply `funcs` to a location group following the composition order
    pub fn aggregate_group(
        &self,
        group: &TimeSeriesGroup,
        funcs: &DataFunctions,
    ) -> Result<TimeSeriesGroup> {
        let inner = funcs.inner();
        let outer = funcs.outer();

        tracing::debug!(
            functions = %funcs,
            members = group.len(),
            "Aggregating group"
        );

        let result = match (inner.exists().then(|| inner.domain()), outer.exists()) {
            (None, _) => Ok(group.clone()),
            (Some(FunctionDomain::Time), false) => self.time_aggregate_members(group, inner),
            (Some(FunctionDomain::Area), false) => self.area_aggregate_group(group, inner),
            (Some(FunctionDomain::Time), true) => {
                let per_member = self.time_aggregate_members(group, inner)?;
                self.area_aggregate_group(&per_member, outer)
            },
            (Some(FunctionDomain::Area), true) => {
                let reduced = self.area_aggregate_group(group, inner)?;
                self.time_aggregate_members(&reduced, outer)
            },
            (Some(FunctionDomain::None), _) => Ok(group.clone()),
        };
        result.with_context(|| format!("applying {}", funcs))
    }

    // ------------------------------------------------------------------
    // Time domain
    // ------------------------------------------------------------------

    /// One windowed result per timestep over `[t - behind, t + ahead]`
    pub fn time_aggregate(&self, series: &TimeSeries, func: &DataFunction) -> Result<TimeSeries> {
        if !func.exists() {
            return Ok(series.clone());
        }
        let series = sorted(series);
        let kind = reducers::common_kind(series.iter().map(|item| &item.value))?;

        tracing::debug!(
            function = %func,
            behind = func.behind_minutes(),
            ahead = func.ahead_minutes(),
            timesteps = series.len(),
            kind = %kind,
            "Time aggregation"
        );

        if kind == ValueKind::Missing || kind.is_numeric() {
            self.time_numeric(&series, func)
        } else {
            self.time_non_numeric(&series, func, kind)
        }
    }

    fn time_numeric(&self, series: &TimeSeries, func: &DataFunction) -> Result<TimeSeries> {
        let samples = series
            .iter()
            .filter_map(|item| {
                let value = filtered_value(func, &item.value);
                if value.is_nan() && func.is_nan_tolerant() {
                    None
                } else {
                    Some(Sample::new(item.time.utc(), value))
                }
            })
            .collect();
        let stat = Stat::new(samples)
            .with_directional(func.is_directional())
            .with_limits(func.lower_limit(), func.upper_limit());

        let behind = Duration::minutes(i64::from(func.behind_minutes()));
        let ahead = Duration::minutes(i64::from(func.ahead_minutes()));

        series
            .iter()
            .map(|item| {
                let t = item.time.utc();
                let window = TimeWindow::closed(t - behind, t + ahead);
                let result = stat.compute(func.id(), &window, Some(t))?;
                Ok(TimedValue::new(item.time, Value::from_stat(result)))
            })
            .collect()
    }

    fn time_non_numeric(
        &self,
        series: &TimeSeries,
        func: &DataFunction,
        kind: ValueKind,
    ) -> Result<TimeSeries> {
        let behind = Duration::minutes(i64::from(func.behind_minutes()));
        let ahead = Duration::minutes(i64::from(func.ahead_minutes()));
        let items = series.as_slice();

        items
            .iter()
            .map(|item| {
                let t = item.time.utc();
                let (start, end) = (t - behind, t + ahead);
                let lo = items.partition_point(|other| other.time.utc() < start);
                let hi = items.partition_point(|other| other.time.utc() <= end);
                let in_window: Vec<(LocalDateTime, &Value)> = items[lo..hi]
                    .iter()
                    .map(|other| (other.time, &other.value))
                    .collect();
                let value = reducers::reduce(func, kind, &in_window, Some(item.time))?;
                Ok(TimedValue::new(item.time, value))
            })
            .collect()
    }

    fn time_aggregate_members(
        &self,
        group: &TimeSeriesGroup,
        func: &DataFunction,
    ) -> Result<TimeSeriesGroup> {
        group
            .iter()
            .map(|member| {
                let series = self.time_aggregate(&member.series, func)?;
                Ok(LonLatTimeSeries::new(member.lonlat, series))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Area domain
    // ------------------------------------------------------------------

    /// Reduce all members at each timestep of the union of member timestamps
    pub fn area_aggregate(&self, group: &TimeSeriesGroup, func: &DataFunction) -> Result<TimeSeries> {
        if matches!(func.id(), FunctionId::Nearest | FunctionId::Interpolate) {
            return Err(TimeSeriesError::computation(format!(
                "{} is not an area function",
                func.id()
            )));
        }

        let members: Vec<Cow<'_, TimeSeries>> =
            group.iter().map(|member| sorted(&member.series)).collect();
        let timestamps = group.timestamps();

        tracing::debug!(
            function = %func,
            members = members.len(),
            timesteps = timestamps.len(),
            "Area aggregation"
        );

        let mut result = TimeSeries::with_capacity(timestamps.len());
        for time in timestamps {
            let values: Vec<&Value> = members
                .iter()
                .map(|series| series.value_at(&time).unwrap_or(&Value::Missing))
                .collect();
            let value = reduce_area(func, time, &values)?;
            result.push(TimedValue::new(time, value));
        }
        Ok(result)
    }

    fn area_aggregate_group(
        &self,
        group: &TimeSeriesGroup,
        func: &DataFunction,
    ) -> Result<TimeSeriesGroup> {
        let Some(first) = group.members().first() else {
            return Ok(TimeSeriesGroup::new());
        };
        let series = self.area_aggregate(group, func)?;
        Ok(std::iter::once(LonLatTimeSeries::new(first.lonlat, series)).collect())
    }
}

/// Area reduction of the member values at one timestep
fn reduce_area(func: &DataFunction, time: LocalDateTime, values: &[&Value]) -> Result<Value> {
    let kind = reducers::common_kind(values.iter().copied())?;
    if kind != ValueKind::Missing && !kind.is_numeric() {
        let items: Vec<(LocalDateTime, &Value)> =
            values.iter().map(|value| (time, *value)).collect();
        return reducers::reduce(func, kind, &items, None);
    }

    let samples = values
        .iter()
        .map(|value| filtered_value(func, value))
        .filter(|value| !(value.is_nan() && func.is_nan_tolerant()))
        .map(Sample::untimed)
        .collect();
    let stat = Stat::new(samples)
        .with_weights(false)
        .with_directional(func.is_directional())
        .with_limits(func.lower_limit(), func.upper_limit());
    let result = stat.compute(func.id(), &TimeWindow::all(), None)?;
    Ok(Value::from_stat(result))
}

/// Numeric value after range filtering; `NaN` marks missing
fn filtered_value(func: &DataFunction, value: &Value) -> f64 {
    let filter = func.has_limits() && !func.id().counts_in_range();
    value
        .as_f64()
        .filter(|v| !filter || func.in_range(*v))
        .unwrap_or(f64::NAN)
}

fn sorted(series: &TimeSeries) -> Cow<'_, TimeSeries> {
    if series.is_sorted() {
        Cow::Borrowed(series)
    } else {
        tracing::warn!(len = series.len(), "Input series not sorted by time, sorting a copy");
        let mut copy = series.clone();
        copy.sort_by_time();
        Cow::Owned(copy)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::parser::{parse_function_call, ParameterLookup};
    use crate::value::{LocalTimePool, LonLat};
    use chrono::{TimeZone, Utc};
    use tracing_test::traced_test;

    fn hours(pool: &mut LocalTimePool, n: u32) -> Vec<LocalDateTime> {
        (0..n)
            .map(|h| pool.intern_utc(Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap(), "UTC"))
            .collect()
    }

    fn series(times: &[LocalDateTime], values: &[f64]) -> TimeSeries {
        times
            .iter()
            .zip(values)
            .map(|(t, v)| TimedValue::new(*t, *v))
            .collect()
    }

    fn doubles(series: &TimeSeries) -> Vec<f64> {
        series
            .iter()
            .map(|item| item.value.as_f64().unwrap_or(f64::NAN))
            .collect()
    }

    fn time_fn(id: FunctionId, behind: u32, ahead: u32) -> DataFunction {
        DataFunction::new(id, FunctionDomain::Time)
            .with_window(crate::data_function::AggregationWindow::new(behind, ahead))
    }

    fn area_fn(id: FunctionId) -> DataFunction {
        DataFunction::new(id, FunctionDomain::Area)
    }

    #[test]
    fn test_time_mean_is_per_timestep() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 4);
        let input = series(&ts, &[10.0, 20.0, 30.0, 40.0]);

        let funcs = DataFunctions::single(time_fn(FunctionId::Mean, 60, 0));
        let out = Aggregator::new().aggregate(&input, &funcs).unwrap();

        assert_eq!(out.len(), 4);
        // First window only covers the first sample
        assert_eq!(doubles(&out), vec![10.0, 15.0, 25.0, 35.0]);
    }

    #[test]
    fn test_zero_window_returns_sample_itself() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 3);
        let input = series(&ts, &[1.0, 5.0, 2.0]);

        let out = Aggregator::new()
            .time_aggregate(&input, &time_fn(FunctionId::Max, 0, 0))
            .unwrap();
        assert_eq!(doubles(&out), vec![1.0, 5.0, 2.0]);
    }

    #[test]
    fn test_range_filter_keeps_gap_positions() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 3);
        let input = series(&ts, &[1.0, 500.0, 2.0]);

        let strict = time_fn(FunctionId::Max, 0, 0).with_limits(0.0, 100.0);
        let out = Aggregator::new().time_aggregate(&input, &strict).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.get(1).unwrap().value.is_missing());
        assert_eq!(out.get(2).unwrap().value, Value::Double(2.0));

        let tolerant = time_fn(FunctionId::Max, 120, 0)
            .with_limits(0.0, 100.0)
            .with_nan_tolerance(true);
        let out = Aggregator::new().time_aggregate(&input, &tolerant).unwrap();
        assert_eq!(out.get(2).unwrap().value, Value::Double(2.0));
    }

    #[test]
    fn test_tolerant_mean_with_nothing_in_range() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 3);
        let input = series(&ts, &[50.0, 50.0, 50.0]);

        let lookup = ParameterLookup::default();
        let call = parse_function_call("nanmean_t[0:10](t2m:1h)", &lookup, Default::default())
            .unwrap();
        let out = Aggregator::new().aggregate(&input, &call.functions).unwrap();

        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|item| item.value.is_missing()));
    }

    #[test]
    fn test_nearest_fills_gap_from_valid_neighbour() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 3);
        let input = series(&ts, &[1.0, f64::NAN, 3.0]);

        let out = Aggregator::new()
            .time_aggregate(&input, &time_fn(FunctionId::Nearest, 60, 0))
            .unwrap();
        assert_eq!(doubles(&out), vec![1.0, 1.0, 3.0]);
    }

    #[test]
    fn test_count_uses_limits_as_range() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 3);
        let input = series(&ts, &[1.0, 500.0, 2.0]);

        let count = time_fn(FunctionId::Count, 120, 0).with_limits(0.0, 100.0);
        let out = Aggregator::new().time_aggregate(&input, &count).unwrap();
        assert_eq!(out.get(2).unwrap().value, Value::Double(2.0));
    }

    #[test]
    fn test_area_mean_per_timestep() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 2);
        let group: TimeSeriesGroup = [
            LonLatTimeSeries::new(LonLat::new(25.0, 60.0), series(&ts, &[1.0, 2.0])),
            LonLatTimeSeries::new(LonLat::new(26.0, 61.0), series(&ts, &[3.0, 6.0])),
        ]
        .into_iter()
        .collect();

        let funcs = DataFunctions::single(area_fn(FunctionId::Mean));
        let out = Aggregator::new().aggregate_group(&group, &funcs).unwrap();

        assert_eq!(out.len(), 1);
        let member = &out.members()[0];
        assert_eq!(member.lonlat, LonLat::new(25.0, 60.0));
        assert_eq!(doubles(&member.series), vec![2.0, 4.0]);
    }

    #[test]
    fn test_area_missing_member_value() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 2);
        let group: TimeSeriesGroup = [
            LonLatTimeSeries::new(LonLat::new(25.0, 60.0), series(&ts, &[1.0, 2.0])),
            LonLatTimeSeries::new(LonLat::new(26.0, 61.0), series(&ts[..1], &[3.0])),
        ]
        .into_iter()
        .collect();

        let strict = Aggregator::new()
            .area_aggregate(&group, &area_fn(FunctionId::Sum))
            .unwrap();
        assert_eq!(strict.get(0).unwrap().value, Value::Double(4.0));
        assert!(strict.get(1).unwrap().value.is_missing());

        let count = Aggregator::new()
            .area_aggregate(&group, &area_fn(FunctionId::Count))
            .unwrap();
        assert_eq!(doubles(&count), vec![2.0, 1.0]);
    }

    #[test]
    fn test_time_then_area() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 3);
        let group: TimeSeriesGroup = [
            LonLatTimeSeries::new(LonLat::new(0.0, 0.0), series(&ts, &[0.0, 10.0, 20.0])),
            LonLatTimeSeries::new(LonLat::new(1.0, 1.0), series(&ts, &[5.0, 5.0, 5.0])),
        ]
        .into_iter()
        .collect();

        let funcs = DataFunctions::new(time_fn(FunctionId::Max, 60, 0), area_fn(FunctionId::Min));
        let out = Aggregator::new().aggregate_group(&group, &funcs).unwrap();

        assert_eq!(out.len(), 1);
        // Per-member windowed max: [0,10,20] and [5,5,5]; min across members
        assert_eq!(doubles(&out.members()[0].series), vec![0.0, 5.0, 5.0]);
    }

    #[test]
    #[traced_test]
    fn test_unsorted_input_is_sorted_locally() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 3);
        let input: TimeSeries = vec![
            TimedValue::new(ts[2], 3.0),
            TimedValue::new(ts[0], 1.0),
            TimedValue::new(ts[1], 2.0),
        ]
        .into();

        let out = Aggregator::new()
            .time_aggregate(&input, &time_fn(FunctionId::Mean, 0, 0))
            .unwrap();
        assert_eq!(out.timestamps(), ts);
        assert_eq!(doubles(&out), vec![1.0, 2.0, 3.0]);
        assert!(logs_contain("not sorted by time"));
    }

    #[test]
    fn test_text_series_uses_reducers() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 3);
        let input: TimeSeries = ts
            .iter()
            .zip(["b", "a", "c"])
            .map(|(t, s)| TimedValue::new(*t, s))
            .collect();

        let out = Aggregator::new()
            .time_aggregate(&input, &time_fn(FunctionId::Sum, 120, 0))
            .unwrap();
        assert_eq!(out.get(2).unwrap().value, Value::from("[b a c]"));

        let err = Aggregator::new()
            .time_aggregate(&input, &time_fn(FunctionId::Mean, 0, 0))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Computation);
    }

    #[test]
    fn test_nearest_is_not_an_area_function() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 1);
        let group: TimeSeriesGroup =
            std::iter::once(LonLatTimeSeries::new(LonLat::new(0.0, 0.0), series(&ts, &[1.0])))
                .collect();

        let funcs = DataFunctions::single(area_fn(FunctionId::Nearest));
        let err = Aggregator::new().aggregate_group(&group, &funcs).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Computation);
        assert!(err.to_string().contains("nearest_a"), "{}", err);
    }

    #[test]
    fn test_directional_area_mean() {
        let mut pool = LocalTimePool::new();
        let ts = hours(&mut pool, 1);
        let group: TimeSeriesGroup = [
            LonLatTimeSeries::new(LonLat::new(0.0, 0.0), series(&ts, &[350.0])),
            LonLatTimeSeries::new(LonLat::new(1.0, 0.0), series(&ts, &[10.0])),
        ]
        .into_iter()
        .collect();

        let func = area_fn(FunctionId::Mean).with_directional(true);
        let out = Aggregator::new().area_aggregate(&group, &func).unwrap();
        let mean = out.get(0).unwrap().value.as_f64().unwrap();
        assert!(mean.abs() < 1e-9 || (mean - 360.0).abs() < 1e-9, "{}", mean);
    }
}
