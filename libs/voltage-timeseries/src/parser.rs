//! Function-call grammar
//!
//! Accepted forms:
//!
//! | Form | Example |
//! |------|---------|
//! | `param` | `temperature` |
//! | `func(param)` | `mean_t(temperature:1h:30m)` |
//! | `outer(inner(param))` | `max_t(nanmean_a[0:40](temperature:3h))` |
//!
//! Function names are `[nan]<stat>_<a|t>[lo:hi]`. The parameter may carry an
//! aggregation window `behind[:ahead]` delimited by `:`, `/` or `;`; durations
//! are minutes by default or take an `m`, `h` or `d` suffix.

use crate::data_function::{AggregationWindow, DataFunction, DataFunctions, FunctionDomain};
use crate::error::{Result, TimeSeriesError};
use regex::Regex;
use rustc_hash::FxHashSet;

/// Parameter name lookup table injected by the caller
///
/// Names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ParameterLookup {
    directional: FxHashSet<String>,
}

impl ParameterLookup {
    pub fn new<I, S>(directional: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            directional: directional
                .into_iter()
                .map(|name| name.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Whether functions over this parameter use circular statistics
    pub fn is_directional(&self, name: &str) -> bool {
        self.directional.contains(&name.to_lowercase())
    }
}

/// Result of parsing one function call
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedParameter {
    /// Parameter name without window suffix
    pub name: String,
    pub functions: DataFunctions,
}

/// Parser for the function-call grammar
pub struct FunctionCallParser {
    lookup: ParameterLookup,
    default_window: AggregationWindow,
    function_re: Regex,
    duration_re: Regex,
}

impl FunctionCallParser {
    pub fn new(lookup: ParameterLookup, default_window: AggregationWindow) -> Result<Self> {
        let function_re =
            Regex::new(r"^(nan)?([a-z]+)_([at])(?:\[\s*([^:\]]*?)\s*:\s*([^:\]]*?)\s*\])?$")
                .map_err(|e| TimeSeriesError::config(format!("Regex error: {}", e)))?;
        let duration_re = Regex::new(r"^(\d+)([mhd]?)$")
            .map_err(|e| TimeSeriesError::config(format!("Regex error: {}", e)))?;

        Ok(Self {
            lookup,
            default_window,
            function_re,
            duration_re,
        })
    }

    /// Parse `param`, `func(param)` or `outer(inner(param))`
    pub fn parse(&self, text: &str) -> Result<ParsedParameter> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TimeSeriesError::parse(text, "empty parameter"));
        }

        let (outer_name, rest) = match split_call(text)? {
            Some((name, arg)) => (Some(name), arg),
            None => (None, text),
        };
        let (inner_name, param) = match split_call(rest)? {
            Some((name, arg)) => (Some(name), arg),
            None => (None, rest),
        };
        if param.contains('(') || param.contains(')') {
            return Err(TimeSeriesError::parse(
                text,
                "at most two nested functions are allowed",
            ));
        }

        let (name, window) = self.parse_parameter(param)?;
        let directional = self.lookup.is_directional(&name);

        // A single function is the inner one
        let (inner_name, outer_name) = match (outer_name, inner_name) {
            (Some(outer), None) => (Some(outer), None),
            (outer, inner) => (inner, outer),
        };

        let inner = match inner_name {
            Some(func) => self.parse_function(func, directional)?,
            None => DataFunction::null(),
        };
        let outer = match outer_name {
            Some(func) => self.parse_function(func, directional)?,
            None => DataFunction::null(),
        };

        let has_time_function = inner.is_time_function() || outer.is_time_function();
        if window.is_some() && !has_time_function {
            return Err(TimeSeriesError::parse(
                text,
                "aggregation window given without a time function",
            ));
        }
        let window = window.unwrap_or(self.default_window);
        let attach = |f: DataFunction| {
            if f.is_time_function() {
                f.with_window(window)
            } else {
                f
            }
        };

        let functions = DataFunctions::new(attach(inner), attach(outer));
        tracing::trace!(parameter = %name, functions = %functions, "Parsed function call");

        Ok(ParsedParameter { name, functions })
    }

    /// Parse a function name such as `nanmean_t[0:100]`
    pub fn parse_function(&self, text: &str, directional: bool) -> Result<DataFunction> {
        let text = text.trim();
        let captures = self
            .function_re
            .captures(text)
            .ok_or_else(|| TimeSeriesError::parse(text, "malformed function name"))?;

        let nan_tolerant = captures.get(1).is_some();
        let id = captures
            .get(2)
            .ok_or_else(|| TimeSeriesError::parse(text, "missing function name"))?
            .as_str()
            .parse()
            .map_err(|_| TimeSeriesError::parse(text, "unknown aggregation function"))?;
        let domain = match captures.get(3).map(|m| m.as_str()) {
            Some("a") => FunctionDomain::Area,
            Some("t") => FunctionDomain::Time,
            _ => return Err(TimeSeriesError::parse(text, "unknown function domain")),
        };

        let lower = parse_limit(text, captures.get(4).map(|m| m.as_str()), f64::NEG_INFINITY)?;
        let upper = parse_limit(text, captures.get(5).map(|m| m.as_str()), f64::INFINITY)?;
        if lower > upper {
            return Err(TimeSeriesError::parse(text, "lower limit exceeds upper limit"));
        }

        Ok(DataFunction::new(id, domain)
            .with_nan_tolerance(nan_tolerant)
            .with_directional(directional)
            .with_limits(lower, upper))
    }

    /// Split `name:behind:ahead` into the name and its optional window
    fn parse_parameter(&self, text: &str) -> Result<(String, Option<AggregationWindow>)> {
        let parts: Vec<&str> = text.split([':', '/', ';']).map(str::trim).collect();
        let name = parts[0];
        if name.is_empty() {
            return Err(TimeSeriesError::parse(text, "missing parameter name"));
        }

        let window = match parts.len() {
            1 => None,
            2 => Some(AggregationWindow::new(
                self.parse_duration(parts[1])?,
                0,
            )),
            3 => Some(AggregationWindow::new(
                self.parse_duration(parts[1])?,
                self.parse_duration(parts[2])?,
            )),
            _ => {
                return Err(TimeSeriesError::parse(
                    text,
                    "expected at most 'behind:ahead' after the parameter name",
                ))
            },
        };

        Ok((name.to_string(), window))
    }

    /// Duration string to minutes: `30`, `30m`, `2h`, `1d`
    pub fn parse_duration(&self, text: &str) -> Result<u32> {
        let captures = self
            .duration_re
            .captures(text)
            .ok_or_else(|| TimeSeriesError::parse(text, "malformed duration"))?;
        let amount: u32 = captures
            .get(1)
            .ok_or_else(|| TimeSeriesError::parse(text, "missing duration amount"))?
            .as_str()
            .parse()
            .map_err(|e| TimeSeriesError::parse(text, format!("invalid duration: {}", e)))?;
        let factor = match captures.get(2).map(|m| m.as_str()) {
            Some("h") => 60,
            Some("d") => 24 * 60,
            _ => 1,
        };
        amount
            .checked_mul(factor)
            .ok_or_else(|| TimeSeriesError::parse(text, "duration out of range"))
    }
}

/// Parse a function call with a throwaway parser
pub fn parse_function_call(
    text: &str,
    lookup: &ParameterLookup,
    default_window: AggregationWindow,
) -> Result<ParsedParameter> {
    FunctionCallParser::new(lookup.clone(), default_window)?.parse(text)
}

/// `name(arg)` to `(name, arg)`; `None` when the text is not a call
fn split_call(text: &str) -> Result<Option<(&str, &str)>> {
    let Some(open) = text.find('(') else {
        if text.contains(')') {
            return Err(TimeSeriesError::parse(text, "unbalanced parentheses"));
        }
        return Ok(None);
    };
    if !text.ends_with(')') {
        return Err(TimeSeriesError::parse(text, "unbalanced parentheses"));
    }
    let name = text[..open].trim();
    if name.is_empty() {
        return Err(TimeSeriesError::parse(text, "missing function name"));
    }
    let arg = text[open + 1..text.len() - 1].trim();
    if arg.is_empty() {
        return Err(TimeSeriesError::parse(text, "missing function argument"));
    }
    Ok(Some((name, arg)))
}

fn parse_limit(fragment: &str, text: Option<&str>, unbounded: f64) -> Result<f64> {
    match text {
        None | Some("") => Ok(unbounded),
        Some(value) => value.parse::<f64>().map_err(|e| {
            TimeSeriesError::parse(fragment, format!("invalid limit '{}': {}", value, e))
        }),
    }
}
