//! Output timestep generation
//!
//! The timesteps a query is evaluated at come from one of three modes:
//! a fixed step aligned to local midnight, a list of local clock times
//! repeated every day, or the timestamps of the data itself.

use crate::error::{Result, TimeSeriesError};
use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc,
};
use serde::{Deserialize, Serialize};

/// Longest forward transition searched past a skipped clock time
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// How timesteps are generated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSeriesMode {
    /// Every `timestep_minutes`, aligned to local midnight
    #[default]
    TimeSteps,
    /// Each `HHMM` of `time_list` on every local day
    FixedTimes,
    /// The given data times
    DataTimes,
}

/// Generation options; also the cache key of [`crate::TimestepCache`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesGeneratorOptions {
    pub mode: TimeSeriesMode,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timestep_minutes: u32,
    /// Stop after this many timesteps
    pub timesteps: Option<usize>,
    /// Local clock times as `HHMM`
    pub time_list: Vec<u16>,
    pub data_times: Vec<DateTime<Utc>>,
}

impl TimeSeriesGeneratorOptions {
    pub fn time_steps(start: DateTime<Utc>, end: DateTime<Utc>, timestep_minutes: u32) -> Self {
        Self {
            mode: TimeSeriesMode::TimeSteps,
            start_time: start,
            end_time: end,
            timestep_minutes,
            ..Self::default()
        }
    }

    pub fn fixed_times(start: DateTime<Utc>, end: DateTime<Utc>, time_list: Vec<u16>) -> Self {
        Self {
            mode: TimeSeriesMode::FixedTimes,
            start_time: start,
            end_time: end,
            time_list,
            ..Self::default()
        }
    }

    pub fn data_times(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        data_times: Vec<DateTime<Utc>>,
    ) -> Self {
        Self {
            mode: TimeSeriesMode::DataTimes,
            start_time: start,
            end_time: end,
            data_times,
            ..Self::default()
        }
    }

    pub fn with_timesteps(mut self, timesteps: usize) -> Self {
        self.timesteps = Some(timesteps);
        self
    }
}

/// Generate the timesteps of `opts` in the local time of `zone`
///
/// Each timestep carries the UTC offset in effect at that instant, so a
/// range crossing a daylight saving change keeps its local clock alignment.
/// An inverted `[start, end]` range yields no timesteps.
pub fn generate_timesteps<Tz: TimeZone>(
    opts: &TimeSeriesGeneratorOptions,
    zone: &Tz,
) -> Result<Vec<DateTime<FixedOffset>>> {
    if opts.start_time > opts.end_time {
        return Ok(Vec::new());
    }

    let mut times = match opts.mode {
        TimeSeriesMode::TimeSteps => step_times(opts, zone)?,
        TimeSeriesMode::FixedTimes => fixed_times(opts, zone)?,
        TimeSeriesMode::DataTimes => opts
            .data_times
            .iter()
            .filter(|t| **t >= opts.start_time && **t <= opts.end_time)
            .map(|t| t.with_timezone(zone).fixed_offset())
            .collect(),
    };
    times.sort();
    times.dedup();
    if let Some(limit) = opts.timesteps {
        times.truncate(limit);
    }

    tracing::debug!(
        mode = ?opts.mode,
        count = times.len(),
        "Generated timesteps"
    );
    Ok(times)
}

/// Local days touched by `[start, end]`
fn local_days<Tz: TimeZone>(
    opts: &TimeSeriesGeneratorOptions,
    zone: &Tz,
) -> impl Iterator<Item = NaiveDate> {
    let first = opts.start_time.with_timezone(zone).date_naive();
    let last = opts.end_time.with_timezone(zone).date_naive();
    first.iter_days().take_while(move |day| *day <= last)
}

/// Wall-clock steps from the first local midnight
///
/// A clock time repeated by a backward transition yields both instants; one
/// skipped by a forward transition yields none.
fn step_times<Tz: TimeZone>(
    opts: &TimeSeriesGeneratorOptions,
    zone: &Tz,
) -> Result<Vec<DateTime<FixedOffset>>> {
    if opts.timestep_minutes == 0 {
        return Err(TimeSeriesError::invalid_window("timestep must be positive"));
    }
    let step = Duration::minutes(i64::from(opts.timestep_minutes));

    let first_day = opts.start_time.with_timezone(zone).date_naive();
    let last_day = opts.end_time.with_timezone(zone).date_naive();
    let mut times = Vec::new();
    let mut clock = first_day.and_time(NaiveTime::MIN);
    while clock.date() <= last_day {
        let instants = match zone.from_local_datetime(&clock) {
            LocalResult::Single(t) => vec![t],
            LocalResult::Ambiguous(earlier, later) => vec![earlier, later],
            LocalResult::None => Vec::new(),
        };
        times.extend(
            instants
                .into_iter()
                .filter(|t| *t >= opts.start_time && *t <= opts.end_time)
                .map(|t| t.fixed_offset()),
        );
        clock += step;
    }
    Ok(times)
}

/// Each `HHMM` of `time_list` once per local day
///
/// A repeated clock time resolves to its first occurrence. A clock time
/// skipped by a forward transition moves to the first valid minute after
/// the gap.
fn fixed_times<Tz: TimeZone>(
    opts: &TimeSeriesGeneratorOptions,
    zone: &Tz,
) -> Result<Vec<DateTime<FixedOffset>>> {
    let clock_times = opts
        .time_list
        .iter()
        .map(|&hhmm| {
            NaiveTime::from_hms_opt(u32::from(hhmm / 100), u32::from(hhmm % 100), 0).ok_or_else(
                || TimeSeriesError::parse(hhmm.to_string(), "expected a HHMM clock time"),
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let mut times = Vec::new();
    for day in local_days(opts, zone) {
        for clock in &clock_times {
            let local = day.and_time(*clock);
            let resolved = match zone.from_local_datetime(&local) {
                LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => Some(t),
                LocalResult::None => after_gap(zone, local),
            };
            let Some(t) = resolved else {
                continue;
            };
            if t >= opts.start_time && t <= opts.end_time {
                times.push(t.fixed_offset());
            }
        }
    }
    Ok(times)
}

fn after_gap<Tz: TimeZone>(zone: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    let resolved = (1..=MAX_GAP_MINUTES)
        .find_map(|m| zone.from_local_datetime(&(local + Duration::minutes(m))).earliest());
    tracing::debug!(
        %local,
        resolved = ?resolved.as_ref().map(|t| t.fixed_offset()),
        "Clock time skipped by a zone transition"
    );
    resolved
}
