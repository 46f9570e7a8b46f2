//! Aggregation function descriptions
//!
//! A [`DataFunction`] names one statistic, the domain it reduces over (time
//! or area) and its options. [`DataFunctions`] composes an inner and an
//! outer function, e.g. `max_t(mean_a(temperature))`.

use crate::error::{Result, TimeSeriesError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Statistic computed by a [`DataFunction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionId {
    Mean,
    Max,
    Min,
    Median,
    Sum,
    Integ,
    StdDev,
    Variance,
    Percentage,
    Count,
    Change,
    Trend,
    Nearest,
    Interpolate,
    Null,
}

impl FunctionId {
    /// Name used in the function-call grammar
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionId::Mean => "mean",
            FunctionId::Max => "max",
            FunctionId::Min => "min",
            FunctionId::Median => "median",
            FunctionId::Sum => "sum",
            FunctionId::Integ => "integ",
            FunctionId::StdDev => "sdev",
            FunctionId::Variance => "variance",
            FunctionId::Percentage => "percentage",
            FunctionId::Count => "count",
            FunctionId::Change => "change",
            FunctionId::Trend => "trend",
            FunctionId::Nearest => "nearest",
            FunctionId::Interpolate => "interpolate",
            FunctionId::Null => "null",
        }
    }

    /// Percentage and count use the limits as their counting range instead
    /// of as an input filter
    pub fn counts_in_range(self) -> bool {
        matches!(self, FunctionId::Percentage | FunctionId::Count)
    }
}

impl FromStr for FunctionId {
    type Err = TimeSeriesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(FunctionId::Mean),
            "max" => Ok(FunctionId::Max),
            "min" => Ok(FunctionId::Min),
            "median" => Ok(FunctionId::Median),
            "sum" => Ok(FunctionId::Sum),
            "integ" => Ok(FunctionId::Integ),
            "sdev" | "stddev" => Ok(FunctionId::StdDev),
            "variance" => Ok(FunctionId::Variance),
            "percentage" => Ok(FunctionId::Percentage),
            "count" => Ok(FunctionId::Count),
            "change" => Ok(FunctionId::Change),
            "trend" => Ok(FunctionId::Trend),
            "nearest" => Ok(FunctionId::Nearest),
            "interpolate" => Ok(FunctionId::Interpolate),
            _ => Err(TimeSeriesError::parse(s, "unknown aggregation function")),
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a function reduces over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionDomain {
    /// Across a time window of one location
    Time,
    /// Across the locations of a group at one timestep
    Area,
    None,
}

impl FunctionDomain {
    /// Grammar suffix (`_t`, `_a`)
    pub fn suffix(self) -> &'static str {
        match self {
            FunctionDomain::Time => "t",
            FunctionDomain::Area => "a",
            FunctionDomain::None => "",
        }
    }
}

/// Time window of a time-domain function, in minutes around each timestep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationWindow {
    pub behind_minutes: u32,
    pub ahead_minutes: u32,
}

impl AggregationWindow {
    pub fn new(behind_minutes: u32, ahead_minutes: u32) -> Self {
        Self {
            behind_minutes,
            ahead_minutes,
        }
    }
}

/// One aggregation operation, immutable once parsed
#[derive(Debug, Clone, PartialEq)]
pub struct DataFunction {
    id: FunctionId,
    domain: FunctionDomain,
    lower_limit: f64,
    upper_limit: f64,
    nan_tolerant: bool,
    directional: bool,
    window: AggregationWindow,
}

impl Default for DataFunction {
    fn default() -> Self {
        Self::null()
    }
}

impl DataFunction {
    pub fn new(id: FunctionId, domain: FunctionDomain) -> Self {
        Self {
            id,
            domain,
            lower_limit: f64::NEG_INFINITY,
            upper_limit: f64::INFINITY,
            nan_tolerant: false,
            directional: false,
            window: AggregationWindow::default(),
        }
    }

    /// The no-op function
    pub fn null() -> Self {
        Self::new(FunctionId::Null, FunctionDomain::None)
    }

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.lower_limit = lower;
        self.upper_limit = upper;
        self
    }

    pub fn with_nan_tolerance(mut self, nan_tolerant: bool) -> Self {
        self.nan_tolerant = nan_tolerant;
        self
    }

    pub fn with_directional(mut self, directional: bool) -> Self {
        self.directional = directional;
        self
    }

    pub fn with_window(mut self, window: AggregationWindow) -> Self {
        self.window = window;
        self
    }

    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn domain(&self) -> FunctionDomain {
        self.domain
    }

    pub fn lower_limit(&self) -> f64 {
        self.lower_limit
    }

    pub fn upper_limit(&self) -> f64 {
        self.upper_limit
    }

    pub fn is_nan_tolerant(&self) -> bool {
        self.nan_tolerant
    }

    pub fn is_directional(&self) -> bool {
        self.directional
    }

    pub fn window(&self) -> AggregationWindow {
        self.window
    }

    pub fn behind_minutes(&self) -> u32 {
        self.window.behind_minutes
    }

    pub fn ahead_minutes(&self) -> u32 {
        self.window.ahead_minutes
    }

    /// False for the no-op function
    pub fn exists(&self) -> bool {
        self.id != FunctionId::Null && self.domain != FunctionDomain::None
    }

    pub fn is_time_function(&self) -> bool {
        self.exists() && self.domain == FunctionDomain::Time
    }

    pub fn is_area_function(&self) -> bool {
        self.exists() && self.domain == FunctionDomain::Area
    }

    /// True when at least one limit is finite
    pub fn has_limits(&self) -> bool {
        self.lower_limit.is_finite() || self.upper_limit.is_finite()
    }

    /// Whether a value lies in the inclusive `[lower, upper]` range
    pub fn in_range(&self, value: f64) -> bool {
        value >= self.lower_limit && value <= self.upper_limit
    }
}

impl fmt::Display for DataFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.exists() {
            return f.write_str(FunctionId::Null.as_str());
        }
        if self.nan_tolerant {
            f.write_str("nan")?;
        }
        write!(f, "{}_{}", self.id, self.domain.suffix())?;
        if self.has_limits() {
            f.write_str("[")?;
            if self.lower_limit.is_finite() {
                write!(f, "{}", self.lower_limit)?;
            }
            f.write_str(":")?;
            if self.upper_limit.is_finite() {
                write!(f, "{}", self.upper_limit)?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// Inner and outer function of a composed aggregation
///
/// When both functions reduce over the same domain the outer one is
/// redundant and collapses to the no-op function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFunctions {
    inner: DataFunction,
    outer: DataFunction,
}

impl DataFunctions {
    pub fn new(inner: DataFunction, outer: DataFunction) -> Self {
        let (inner, outer) = if !inner.exists() {
            (outer, DataFunction::null())
        } else {
            (inner, outer)
        };

        let outer = if outer.exists() && outer.domain() == inner.domain() {
            tracing::debug!(
                inner = %inner,
                outer = %outer,
                "Collapsing redundant outer function"
            );
            DataFunction::null()
        } else {
            outer
        };

        Self { inner, outer }
    }

    /// Single-function composition
    pub fn single(function: DataFunction) -> Self {
        Self::new(function, DataFunction::null())
    }

    pub fn inner(&self) -> &DataFunction {
        &self.inner
    }

    pub fn outer(&self) -> &DataFunction {
        &self.outer
    }

    /// True when no aggregation is requested
    pub fn is_empty(&self) -> bool {
        !self.inner.exists() && !self.outer.exists()
    }

    /// The time-domain function of the pair, if any
    pub fn time_function(&self) -> Option<&DataFunction> {
        [&self.inner, &self.outer]
            .into_iter()
            .find(|f| f.is_time_function())
    }

    /// The area-domain function of the pair, if any
    pub fn area_function(&self) -> Option<&DataFunction> {
        [&self.inner, &self.outer]
            .into_iter()
            .find(|f| f.is_area_function())
    }
}

impl fmt::Display for DataFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.inner.exists(), self.outer.exists()) {
            (false, _) => f.write_str(FunctionId::Null.as_str()),
            (true, false) => write!(f, "{}", self.inner),
            (true, true) => write!(f, "{}({})", self.outer, self.inner),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_function_names_round_trip() {
        for id in [
            FunctionId::Mean,
            FunctionId::Median,
            FunctionId::StdDev,
            FunctionId::Percentage,
            FunctionId::Interpolate,
        ] {
            assert_eq!(id.as_str().parse::<FunctionId>().unwrap(), id);
        }
        assert_eq!("stddev".parse::<FunctionId>().unwrap(), FunctionId::StdDev);
        assert!("average".parse::<FunctionId>().is_err());
    }

    #[test]
    fn test_default_limits_are_unbounded() {
        let f = DataFunction::new(FunctionId::Mean, FunctionDomain::Time);
        assert_eq!(f.lower_limit(), f64::NEG_INFINITY);
        assert_eq!(f.upper_limit(), f64::INFINITY);
        assert!(!f.has_limits());
        assert!(f.in_range(-1e300));
    }

    #[test]
    fn test_same_domain_outer_collapses() {
        let inner = DataFunction::new(FunctionId::Mean, FunctionDomain::Time);
        let outer = DataFunction::new(FunctionId::Max, FunctionDomain::Time);
        let funcs = DataFunctions::new(inner.clone(), outer);

        assert_eq!(funcs.inner(), &inner);
        assert!(!funcs.outer().exists());
    }

    #[test]
    fn test_mixed_domains_are_kept() {
        let inner = DataFunction::new(FunctionId::Mean, FunctionDomain::Area);
        let outer = DataFunction::new(FunctionId::Max, FunctionDomain::Time);
        let funcs = DataFunctions::new(inner, outer);

        assert!(funcs.outer().exists());
        assert_eq!(funcs.time_function().map(|f| f.id()), Some(FunctionId::Max));
        assert_eq!(funcs.area_function().map(|f| f.id()), Some(FunctionId::Mean));
        assert_eq!(funcs.to_string(), "max_t(mean_a)");
    }

    #[test]
    fn test_lone_outer_moves_inward() {
        let outer = DataFunction::new(FunctionId::Sum, FunctionDomain::Area);
        let funcs = DataFunctions::new(DataFunction::null(), outer);
        assert_eq!(funcs.inner().id(), FunctionId::Sum);
        assert!(!funcs.outer().exists());
    }

    #[test]
    fn test_display_with_limits() {
        let f = DataFunction::new(FunctionId::Mean, FunctionDomain::Time)
            .with_nan_tolerance(true)
            .with_limits(0.0, 100.0);
        assert_eq!(f.to_string(), "nanmean_t[0:100]");

        let f = DataFunction::new(FunctionId::Count, FunctionDomain::Area)
            .with_limits(f64::NEG_INFINITY, 5.0);
        assert_eq!(f.to_string(), "count_a[:5]");
    }
}
