//! CSV result writer

use anyhow::Result;
use std::io::Write;
use voltage_timeseries::{TimeSeriesGroup, Value};

/// Shortest round-trip rendering for doubles, `nan` for missing
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Double(v) if v.is_finite() => {
            let mut buffer = ryu::Buffer::new();
            buffer.format_finite(*v).to_string()
        },
        other => other.to_string(),
    }
}

/// Write `time,lon,lat,value` rows for every member of `group`
pub fn write_group<W: Write>(writer: W, group: &TimeSeriesGroup) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["time", "lon", "lat", "value"])?;

    let mut rows = 0;
    for member in group {
        let lon = format_value(&Value::Double(member.lonlat.lon));
        let lat = format_value(&Value::Double(member.lonlat.lat));
        for item in &member.series {
            csv_writer.write_record([
                item.time.to_string(),
                lon.clone(),
                lat.clone(),
                format_value(&item.value),
            ])?;
            rows += 1;
        }
    }
    csv_writer.flush()?;
    Ok(rows)
}
