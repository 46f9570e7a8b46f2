//! Reducers for non-numeric values
//!
//! Numbers go through [`crate::stat::Stat`]; text, timestamps and
//! coordinates are reduced here by sort position or per-axis arithmetic.

use crate::data_function::{DataFunction, FunctionId};
use crate::error::{Result, TimeSeriesError};
use crate::value::{LocalDateTime, LonLat, Value, ValueKind};

/// Common kind of a set of values, ignoring missing ones
///
/// Integers and doubles unify to `Double`; `Missing` means every value was
/// missing.
pub fn common_kind<'a, I>(values: I) -> Result<ValueKind>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut kind = ValueKind::Missing;
    for value in values {
        if value.is_missing() {
            continue;
        }
        let current = match value.kind() {
            ValueKind::Int => ValueKind::Double,
            other => other,
        };
        if kind == ValueKind::Missing {
            kind = current;
        } else if kind != current {
            return Err(TimeSeriesError::computation(format!(
                "cannot aggregate mixed {} and {} values",
                kind, current
            )));
        }
    }
    Ok(kind)
}

/// Reduce text, timestamp or coordinate values
///
/// `items` are `(time, value)` pairs in time order; `reference` is the
/// target time of `nearest` and `interpolate`.
pub fn reduce(
    func: &DataFunction,
    kind: ValueKind,
    items: &[(LocalDateTime, &Value)],
    reference: Option<LocalDateTime>,
) -> Result<Value> {
    if func.is_directional() {
        return Err(unsupported(func, kind, "circular statistics need numbers"));
    }

    if matches!(func.id(), FunctionId::Nearest | FunctionId::Interpolate) {
        let reference = reference.ok_or_else(|| {
            TimeSeriesError::computation(format!("{} needs a reference time", func.id()))
        })?;
        return Ok(items
            .iter()
            .find(|(time, _)| *time == reference)
            .map(|(_, value)| (*value).clone())
            .unwrap_or_default());
    }

    let any_missing = items.iter().any(|(_, value)| value.is_missing());
    if any_missing && !func.is_nan_tolerant() {
        return Ok(Value::Missing);
    }
    let values: Vec<&Value> = items
        .iter()
        .map(|(_, value)| *value)
        .filter(|value| !value.is_missing())
        .collect();
    if values.is_empty() {
        return Ok(Value::Missing);
    }

    match kind {
        ValueKind::Text => reduce_text(func, &values),
        ValueKind::Time => reduce_time(func, &values),
        ValueKind::LonLat => reduce_lonlat(func, &values),
        _ => Err(unsupported(func, kind, "not a non-numeric kind")),
    }
}

fn reduce_text(func: &DataFunction, values: &[&Value]) -> Result<Value> {
    let mut texts: Vec<&str> = values
        .iter()
        .filter_map(|value| match value {
            Value::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();

    match func.id() {
        FunctionId::Sum | FunctionId::Integ => Ok(Value::Text(format!("[{}]", texts.join(" ")))),
        FunctionId::Min | FunctionId::Max | FunctionId::Median => {
            texts.sort_unstable();
            Ok(pick_sorted(func.id(), &texts)
                .map(|text| Value::Text(text.to_string()))
                .unwrap_or_default())
        },
        _ => Err(unsupported(func, ValueKind::Text, "")),
    }
}

fn reduce_time(func: &DataFunction, values: &[&Value]) -> Result<Value> {
    let mut times: Vec<LocalDateTime> = values
        .iter()
        .filter_map(|value| match value {
            Value::Time(time) => Some(*time),
            _ => None,
        })
        .collect();

    match func.id() {
        FunctionId::Min | FunctionId::Max | FunctionId::Median => {
            times.sort();
            Ok(pick_sorted(func.id(), &times)
                .map(|time| Value::Time(*time))
                .unwrap_or_default())
        },
        _ => Err(unsupported(func, ValueKind::Time, "")),
    }
}

fn reduce_lonlat(func: &DataFunction, values: &[&Value]) -> Result<Value> {
    let coords: Vec<LonLat> = values
        .iter()
        .filter_map(|value| match value {
            Value::LonLat(coord) => Some(*coord),
            _ => None,
        })
        .collect();

    let fold = |init: f64, pick: fn(f64, f64) -> f64| {
        coords.iter().fold(LonLat::new(init, init), |acc, c| {
            LonLat::new(pick(acc.lon, c.lon), pick(acc.lat, c.lat))
        })
    };

    match func.id() {
        FunctionId::Min => Ok(Value::LonLat(fold(f64::INFINITY, f64::min))),
        FunctionId::Max => Ok(Value::LonLat(fold(f64::NEG_INFINITY, f64::max))),
        FunctionId::Sum | FunctionId::Integ => {
            let total = coords.iter().fold(LonLat::new(0.0, 0.0), |acc, c| {
                LonLat::new(acc.lon + c.lon, acc.lat + c.lat)
            });
            Ok(Value::LonLat(wrap_lonlat(total)))
        },
        _ => Err(unsupported(func, ValueKind::LonLat, "")),
    }
}

/// Min is the first, max the last and median the middle sorted element
fn pick_sorted<T>(id: FunctionId, sorted: &[T]) -> Option<&T> {
    match id {
        FunctionId::Min => sorted.first(),
        FunctionId::Max => sorted.last(),
        _ => sorted.get(sorted.len() / 2),
    }
}

/// Longitude into `[-180, 180)`, latitude into `[-90, 90)`
fn wrap_lonlat(coord: LonLat) -> LonLat {
    LonLat::new(
        (coord.lon + 180.0).rem_euclid(360.0) - 180.0,
        (coord.lat + 90.0).rem_euclid(180.0) - 90.0,
    )
}

fn unsupported(func: &DataFunction, kind: ValueKind, detail: &str) -> TimeSeriesError {
    let mut msg = format!("function {} is not supported for {} values", func, kind);
    if !detail.is_empty() {
        msg.push_str(": ");
        msg.push_str(detail);
    }
    TimeSeriesError::computation(msg)
}
