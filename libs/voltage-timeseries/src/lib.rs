//! voltage-timeseries - Time-series aggregation for VoltageEMS
//!
//! Computes derived values over time-stamped samples: windowed statistics
//! per timestep, reductions across the locations of an area, and both
//! composed in either order.
//!
//! # Features
//!
//! - **Statistics**: time-weighted mean, median, variance and integral,
//!   min/max/sum, percentage and count in range, change, trend, nearest,
//!   linear interpolation
//! - **Circular mode**: angular parameters (wind direction) wrap at 360
//! - **Function-call grammar**: `max_t(nanmean_a[0:40](temperature:3h))`
//! - **Data filters**: `data_quality=le 5,ge 90`
//! - **Timestep cache**: generated output timesteps shared across requests
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use voltage_timeseries::{Aggregator, EngineConfig, LocalTimePool, TimeSeries, TimedValue};
//!
//! let parser = EngineConfig::default().parser()?;
//! let call = parser.parse("mean_t(temperature:1h)")?;
//! assert_eq!(call.name, "temperature");
//!
//! let mut pool = LocalTimePool::new();
//! let series: TimeSeries = (0..3)
//!     .map(|h| {
//!         let t = pool.intern_utc(Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap(), "UTC");
//!         TimedValue::new(t, f64::from(h) * 10.0)
//!     })
//!     .collect();
//!
//! // One result per timestep, each the time-weighted mean of the hour behind it
//! let means = Aggregator::new().aggregate(&series, &call.functions)?;
//! let values: Vec<f64> = means.iter().filter_map(|item| item.value.as_f64()).collect();
//! assert_eq!(values, vec![0.0, 5.0, 15.0]);
//! # Ok::<(), voltage_timeseries::TimeSeriesError>(())
//! ```
//!
//! # Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | `value` | Values, interned timestamps, series and groups |
//! | `data_function` | Function ids, domains and compositions |
//! | `parser` | Function-call grammar |
//! | `stat` | Numeric statistics engine |
//! | `aggregator` | Time/area composition |
//! | `reducers` | Text, timestamp and coordinate reductions |
//! | `data_filter` | Per-field value filters |
//! | `generator` | Output timestep generation |
//! | `cache` | Shared timestep cache |
//! | `config` | Engine configuration |

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod data_filter;
pub mod data_function;
pub mod error;
pub mod generator;
pub mod parser;
pub mod reducers;
pub mod stat;
pub mod value;

// Re-exports for convenience
pub use aggregator::Aggregator;
pub use cache::{CacheKey, TimestepCache, Timesteps};
pub use config::EngineConfig;
pub use data_filter::{Comparator, DataFilter, Join, Rule};
pub use data_function::{
    AggregationWindow, DataFunction, DataFunctions, FunctionDomain, FunctionId,
};
pub use error::{ErrorKind, Result, ResultExt, TimeSeriesError};
pub use generator::{generate_timesteps, TimeSeriesGeneratorOptions, TimeSeriesMode};
pub use parser::{parse_function_call, FunctionCallParser, ParameterLookup, ParsedParameter};
pub use stat::{angle_diff, normalize_angle, Sample, Stat, TimeWindow};
pub use value::{
    erase_redundant_group_timesteps, erase_redundant_timesteps, LocalDateTime, LocalTimePool,
    LonLat, LonLatTimeSeries, TimeSeries, TimeSeriesGroup, TimeSeriesVector, TimedValue, Value,
    ValueKind, ZoneId,
};
