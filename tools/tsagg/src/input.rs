//! CSV sample loader
//!
//! Expected header: `time,value[,lon,lat][,quality]`. Times are RFC 3339;
//! an empty value or `nan` is missing. Rows sharing a coordinate form one
//! location of the group.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use voltage_timeseries::{
    LocalTimePool, LonLat, LonLatTimeSeries, TimeSeries, TimeSeriesGroup, TimedValue, Value,
};

#[derive(Debug, Deserialize)]
struct SampleRecord {
    time: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    quality: Option<f64>,
}

/// Samples grouped by location, with the quality flags of each location
#[derive(Debug, Default)]
pub struct LoadedSamples {
    pub group: TimeSeriesGroup,
    /// Same order as `group`
    pub flags: Vec<TimeSeries>,
}

pub fn load_samples(
    path: &Path,
    pool: &mut LocalTimePool,
    zone: FixedOffset,
    zone_label: &str,
) -> Result<LoadedSamples> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    read_samples(BufReader::new(file), pool, zone, zone_label)
        .with_context(|| format!("Cannot load samples from {}", path.display()))
}

pub fn read_samples<R: Read>(
    reader: R,
    pool: &mut LocalTimePool,
    zone: FixedOffset,
    zone_label: &str,
) -> Result<LoadedSamples> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut locations: Vec<(LonLat, TimeSeries, TimeSeries)> = Vec::new();

    for (index, result) in csv_reader.deserialize::<SampleRecord>().enumerate() {
        // Header is line 1
        let line = index + 2;
        let record = result.with_context(|| format!("line {}: malformed record", line))?;

        let time = DateTime::parse_from_rfc3339(&record.time)
            .with_context(|| format!("line {}: invalid time '{}'", line, record.time))?;
        let time = pool.intern(time.with_timezone(&zone), zone_label);
        let lonlat = LonLat::new(record.lon.unwrap_or(0.0), record.lat.unwrap_or(0.0));

        let position = match locations.iter().position(|(coord, _, _)| *coord == lonlat) {
            Some(position) => position,
            None => {
                locations.push((lonlat, TimeSeries::new(), TimeSeries::new()));
                locations.len() - 1
            },
        };
        let (_, series, flags) = &mut locations[position];
        series.push(TimedValue::new(time, parse_value(&record.value)));
        if let Some(quality) = record.quality {
            flags.push(TimedValue::new(time, quality));
        }
    }

    let mut loaded = LoadedSamples::default();
    for (lonlat, mut series, mut flags) in locations {
        series.sort_by_time();
        flags.sort_by_time();
        loaded.group.push(LonLatTimeSeries::new(lonlat, series));
        loaded.flags.push(flags);
    }

    tracing::debug!(
        locations = loaded.group.len(),
        timesteps = loaded.group.timestamps().len(),
        "Loaded samples"
    );
    Ok(loaded)
}

/// Number, text or missing
fn parse_value(text: &str) -> Value {
    if text.is_empty() || text.eq_ignore_ascii_case("nan") {
        return Value::Missing;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        return Value::Double(f);
    }
    Value::Text(text.to_string())
}
