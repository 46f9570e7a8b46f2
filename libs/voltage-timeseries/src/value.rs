//! Value model
//!
//! Samples handed to the aggregator are `(timestamp, value)` pairs where the
//! timestamp is interned in a per-request [`LocalTimePool`] and the value is
//! one of a handful of kinds (numbers, text, coordinates, timestamps).
//!
//! Series built within one request share a pool, so equal timestamps compare
//! as equal handles and can be grouped cheaply.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use rustc_hash::FxHashMap;
use std::fmt;

// ============================================================================
// Interned timestamps
// ============================================================================

/// Index of a timezone name inside a [`LocalTimePool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(u32);

/// Zoned timestamp obtained from a [`LocalTimePool`]
///
/// Only the pool creates these, so every timestamp stored in a series is the
/// canonical entry for its `(instant, zone)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalDateTime {
    time: DateTime<FixedOffset>,
    zone: ZoneId,
}

impl LocalDateTime {
    /// Timestamp with its local offset
    pub fn local(&self) -> DateTime<FixedOffset> {
        self.time
    }

    /// Timestamp in UTC
    pub fn utc(&self) -> DateTime<Utc> {
        self.time.with_timezone(&Utc)
    }

    pub fn zone(&self) -> ZoneId {
        self.zone
    }
}

impl fmt::Display for LocalDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.time.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

/// Request-scoped interning pool for zoned timestamps
///
/// Lives exactly as long as the request that owns it. Growth is monotonic;
/// nothing is ever removed.
#[derive(Debug, Default)]
pub struct LocalTimePool {
    zones: Vec<String>,
    zone_index: FxHashMap<String, ZoneId>,
    entries: FxHashMap<(DateTime<Utc>, ZoneId), LocalDateTime>,
}

impl LocalTimePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical entry for `(time, zone)`, inserting it if needed
    pub fn intern(&mut self, time: DateTime<FixedOffset>, zone: &str) -> LocalDateTime {
        let zone = self.intern_zone(zone);
        *self
            .entries
            .entry((time.with_timezone(&Utc), zone))
            .or_insert(LocalDateTime { time, zone })
    }

    /// Intern a UTC instant under the given zone name
    pub fn intern_utc(&mut self, time: DateTime<Utc>, zone: &str) -> LocalDateTime {
        self.intern(time.fixed_offset(), zone)
    }

    /// Timezone name of an interned timestamp
    pub fn zone_name(&self, zone: ZoneId) -> Option<&str> {
        self.zones.get(zone.0 as usize).map(String::as_str)
    }

    /// Number of distinct timestamps interned so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn intern_zone(&mut self, zone: &str) -> ZoneId {
        if let Some(id) = self.zone_index.get(zone) {
            return *id;
        }
        let id = ZoneId(self.zones.len() as u32);
        self.zones.push(zone.to_string());
        self.zone_index.insert(zone.to_string(), id);
        id
    }
}

// ============================================================================
// Values
// ============================================================================

/// Geographic coordinate pair in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl fmt::Display for LonLat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lon, self.lat)
    }
}

/// Kind tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Missing,
    Int,
    Double,
    Text,
    LonLat,
    Time,
}

impl ValueKind {
    /// Integers and doubles are reduced by the statistics engine
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::Double)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Missing => "missing",
            ValueKind::Int => "integer",
            ValueKind::Double => "double",
            ValueKind::Text => "text",
            ValueKind::LonLat => "coordinate",
            ValueKind::Time => "timestamp",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sample value
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Missing,
    Int(i64),
    Double(f64),
    Text(String),
    LonLat(LonLat),
    Time(LocalDateTime),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Missing => ValueKind::Missing,
            Value::Int(_) => ValueKind::Int,
            Value::Double(_) => ValueKind::Double,
            Value::Text(_) => ValueKind::Text,
            Value::LonLat(_) => ValueKind::LonLat,
            Value::Time(_) => ValueKind::Time,
        }
    }

    /// A NaN double counts as missing too
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Double(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the value; `None` for missing and non-numeric kinds
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    /// Convert a statistic result, mapping "no data" to `Missing`
    pub fn from_stat(result: Option<f64>) -> Self {
        match result {
            Some(v) if !v.is_nan() => Value::Double(v),
            _ => Value::Missing,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<LonLat> for Value {
    fn from(v: LonLat) -> Self {
        Value::LonLat(v)
    }
}

impl From<LocalDateTime> for Value {
    fn from(v: LocalDateTime) -> Self {
        Value::Time(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => f.write_str("nan"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) if v.is_nan() => f.write_str("nan"),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::LonLat(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
        }
    }
}

// ============================================================================
// Series
// ============================================================================

/// One sample of a series
#[derive(Debug, Clone, PartialEq)]
pub struct TimedValue {
    pub time: LocalDateTime,
    pub value: Value,
}

impl TimedValue {
    pub fn new(time: LocalDateTime, value: impl Into<Value>) -> Self {
        Self {
            time,
            value: value.into(),
        }
    }

    pub fn missing(time: LocalDateTime) -> Self {
        Self {
            time,
            value: Value::Missing,
        }
    }
}

/// Time-ordered sequence of samples
///
/// Order may be violated while a series is being built; call
/// [`TimeSeries::sort_by_time`] before handing it to the aggregator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    data: Vec<TimedValue>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, item: TimedValue) {
        self.data.push(item);
    }

    pub fn push_value(&mut self, time: LocalDateTime, value: impl Into<Value>) {
        self.data.push(TimedValue::new(time, value));
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimedValue> {
        self.data.iter()
    }

    pub fn as_slice(&self) -> &[TimedValue] {
        &self.data
    }

    pub fn get(&self, index: usize) -> Option<&TimedValue> {
        self.data.get(index)
    }

    pub fn timestamps(&self) -> Vec<LocalDateTime> {
        self.data.iter().map(|item| item.time).collect()
    }

    /// True when timestamps are non-decreasing
    pub fn is_sorted(&self) -> bool {
        self.data.windows(2).all(|w| w[0].time <= w[1].time)
    }

    /// Stable sort, so equal timestamps keep their insertion order
    pub fn sort_by_time(&mut self) {
        self.data.sort_by(|a, b| a.time.cmp(&b.time));
    }

    /// Value stored at exactly `time` (series must be sorted)
    pub fn value_at(&self, time: &LocalDateTime) -> Option<&Value> {
        self.data
            .binary_search_by(|item| item.time.cmp(time))
            .ok()
            .map(|idx| &self.data[idx].value)
    }
}

impl FromIterator<TimedValue> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = TimedValue>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<TimedValue>> for TimeSeries {
    fn from(data: Vec<TimedValue>) -> Self {
        Self { data }
    }
}

impl<'a> IntoIterator for &'a TimeSeries {
    type Item = &'a TimedValue;
    type IntoIter = std::slice::Iter<'a, TimedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl IntoIterator for TimeSeries {
    type Item = TimedValue;
    type IntoIter = std::vec::IntoIter<TimedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

/// One series per output column
pub type TimeSeriesVector = Vec<TimeSeries>;

/// Series of one location inside an area query
#[derive(Debug, Clone, PartialEq)]
pub struct LonLatTimeSeries {
    pub lonlat: LonLat,
    pub series: TimeSeries,
}

impl LonLatTimeSeries {
    pub fn new(lonlat: LonLat, series: TimeSeries) -> Self {
        Self { lonlat, series }
    }
}

/// Series of every location contributing to an area query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesGroup {
    members: Vec<LonLatTimeSeries>,
}

impl TimeSeriesGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, member: LonLatTimeSeries) {
        self.members.push(member);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[LonLatTimeSeries] {
        &self.members
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LonLatTimeSeries> {
        self.members.iter()
    }

    /// Union of all member timestamps, sorted and deduplicated
    pub fn timestamps(&self) -> Vec<LocalDateTime> {
        let mut times: Vec<LocalDateTime> = self
            .members
            .iter()
            .flat_map(|m| m.series.iter().map(|item| item.time))
            .collect();
        times.sort();
        times.dedup();
        times
    }

    /// Insert missing samples so every member covers the same timestamps
    pub fn pad_missing(&mut self) {
        let times = self.timestamps();
        for member in &mut self.members {
            if member.series.len() == times.len() && member.series.is_sorted() {
                continue;
            }
            member.series.sort_by_time();
            let mut padded = TimeSeries::with_capacity(times.len());
            let mut existing = member.series.iter().peekable();
            for time in &times {
                let mut matched = false;
                while let Some(item) = existing.next_if(|item| item.time == *time) {
                    padded.push(item.clone());
                    matched = true;
                }
                if !matched {
                    padded.push(TimedValue::missing(*time));
                }
            }
            member.series = padded;
        }
    }
}

impl FromIterator<LonLatTimeSeries> for TimeSeriesGroup {
    fn from_iter<I: IntoIterator<Item = LonLatTimeSeries>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TimeSeriesGroup {
    type Item = LonLatTimeSeries;
    type IntoIter = std::vec::IntoIter<LonLatTimeSeries>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}

impl<'a> IntoIterator for &'a TimeSeriesGroup {
    type Item = &'a LonLatTimeSeries;
    type IntoIter = std::slice::Iter<'a, LonLatTimeSeries>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

// ============================================================================
// Timestep pruning
// ============================================================================

/// Keep only the samples whose timestamp appears in `timesteps`
///
/// `timesteps` must be sorted. The result is never longer than `series`.
pub fn erase_redundant_timesteps(series: &TimeSeries, timesteps: &[LocalDateTime]) -> TimeSeries {
    series
        .iter()
        .filter(|item| timesteps.binary_search(&item.time).is_ok())
        .cloned()
        .collect()
}

/// [`erase_redundant_timesteps`] applied to every member of a group
pub fn erase_redundant_group_timesteps(
    group: &TimeSeriesGroup,
    timesteps: &[LocalDateTime],
) -> TimeSeriesGroup {
    group
        .iter()
        .map(|member| {
            LonLatTimeSeries::new(
                member.lonlat,
                erase_redundant_timesteps(&member.series, timesteps),
            )
        })
        .collect()
}
