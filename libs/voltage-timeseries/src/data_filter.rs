//! Per-field value filters
//!
//! A filter such as `data_quality=le 5,ge 90` keeps samples whose quality
//! flag passes the rules and masks the rest as missing. Each comma-separated
//! rule is `value`, `comparator value` or
//! `comparator value JOIN comparator value` with `JOIN` one of `AND`/`OR`.
//!
//! AND rules always fold before OR rules, whatever order they arrive in.

use crate::error::{Result, TimeSeriesError};
use crate::value::{TimeSeries, TimedValue, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Comparison of a flag value against a rule constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Comparator {
    fn parse(token: &str) -> Result<Self> {
        match token.to_ascii_lowercase().as_str() {
            "lt" | "<" => Ok(Comparator::Lt),
            "le" | "<=" => Ok(Comparator::Le),
            "eq" | "=" | "==" => Ok(Comparator::Eq),
            "ge" | ">=" => Ok(Comparator::Ge),
            "gt" | ">" => Ok(Comparator::Gt),
            _ => Err(TimeSeriesError::parse(token, "unknown comparator")),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "=",
            Comparator::Ge => ">=",
            Comparator::Gt => ">",
        }
    }

    fn holds(self, lhs: f64, rhs: i64) -> bool {
        let rhs = rhs as f64;
        match self {
            Comparator::Lt => lhs < rhs,
            Comparator::Le => lhs <= rhs,
            Comparator::Eq => lhs == rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Gt => lhs > rhs,
        }
    }
}

/// How a rule combines with the rules folded before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    And,
    Or,
}

impl Join {
    fn parse(token: &str) -> Result<Self> {
        match token.to_ascii_uppercase().as_str() {
            "AND" => Ok(Join::And),
            "OR" => Ok(Join::Or),
            _ => Err(TimeSeriesError::parse(token, "expected AND or OR")),
        }
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Join::And => f.write_str("AND"),
            Join::Or => f.write_str("OR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub comparator: Comparator,
    /// Integer threshold the flag is compared against
    pub value: i64,
    pub join: Join,
}

impl Rule {
    fn matches(&self, value: f64) -> bool {
        self.comparator.holds(value, self.value)
    }
}

/// Rules per field name
#[derive(Debug, Clone, Default)]
pub struct DataFilter {
    rules: BTreeMap<String, Vec<Rule>>,
}

impl DataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text` and register its rules for `name`
    ///
    /// Rules accumulate across calls for the same field.
    pub fn set_data_filter(&mut self, name: &str, text: &str) -> Result<()> {
        let mut and_rules = Vec::new();
        let mut or_rules = Vec::new();

        for group in text.split(',') {
            for rule in parse_rule(group.trim())? {
                match rule.join {
                    Join::And => and_rules.push(rule),
                    Join::Or => or_rules.push(rule),
                }
            }
        }

        tracing::debug!(
            field = name,
            and_rules = and_rules.len(),
            or_rules = or_rules.len(),
            "Registered data filter"
        );

        let rules = self.rules.entry(name.to_string()).or_default();
        rules.splice(0..0, and_rules);
        rules.extend(or_rules);
        Ok(())
    }

    /// Parse a `name=rules` assignment
    pub fn add_assignment(&mut self, assignment: &str) -> Result<()> {
        let (name, text) = assignment
            .split_once('=')
            .ok_or_else(|| TimeSeriesError::parse(assignment, "expected name=rules"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(TimeSeriesError::parse(assignment, "empty field name"));
        }
        self.set_data_filter(name, text)
    }

    /// True when rules are registered for `name`
    pub fn exist(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn rules(&self, name: &str) -> &[Rule] {
        self.rules.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether `value` passes the rules of `name`; fields without rules
    /// always pass
    pub fn value_ok(&self, name: &str, value: f64) -> bool {
        let Some(rules) = self.rules.get(name) else {
            return true;
        };
        let Some(first) = rules.first() else {
            return true;
        };

        let seed = first.join == Join::And;
        rules.iter().fold(seed, |acc, rule| match rule.join {
            Join::And => acc & rule.matches(value),
            Join::Or => acc | rule.matches(value),
        })
    }

    /// Query predicate equivalent to the rules of `name`, e.g.
    /// `(data_quality <= 5 OR data_quality >= 90)`
    ///
    /// `None` when the field has no rules.
    pub fn sql_clause(&self, name: &str, column: &str) -> Option<String> {
        let rules = self.rules.get(name)?;
        let (first, rest) = rules.split_first()?;

        let term = |rule: &Rule| format!("{} {} {}", column, rule.comparator.as_str(), rule.value);
        let mut clause = term(first);
        for rule in rest {
            clause.push_str(&format!(" {} {}", rule.join, term(rule)));
        }
        Some(format!("({})", clause))
    }

    /// Replace values whose flag fails the rules of `name` with missing
    ///
    /// Flags are matched by timestamp; a value without a valid flag is
    /// masked too. Positions are kept.
    pub fn mask_series(&self, name: &str, values: &TimeSeries, flags: &TimeSeries) -> TimeSeries {
        if !self.exist(name) {
            return values.clone();
        }

        let mut masked = 0usize;
        let result: TimeSeries = values
            .iter()
            .map(|item| {
                let keep = flags
                    .value_at(&item.time)
                    .and_then(Value::as_f64)
                    .filter(|flag| !flag.is_nan())
                    .is_some_and(|flag| self.value_ok(name, flag));
                if keep {
                    item.clone()
                } else {
                    masked += 1;
                    TimedValue::missing(item.time)
                }
            })
            .collect();

        tracing::debug!(field = name, masked, total = values.len(), "Applied data filter");
        result
    }
}

/// One comma-separated rule group; a five-token group yields two rules
fn parse_rule(text: &str) -> Result<Vec<Rule>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let value = |token: &str| -> Result<i64> {
        token
            .parse::<i64>()
            .map_err(|_| TimeSeriesError::parse(token, "expected an integer threshold"))
    };

    match tokens.as_slice() {
        [v] => Ok(vec![Rule {
            comparator: Comparator::Eq,
            value: value(v)?,
            join: Join::Or,
        }]),
        [cmp, v] => Ok(vec![Rule {
            comparator: Comparator::parse(cmp)?,
            value: value(v)?,
            join: Join::Or,
        }]),
        [cmp1, v1, join, cmp2, v2] => {
            let join = Join::parse(join)?;
            Ok(vec![
                Rule {
                    comparator: Comparator::parse(cmp1)?,
                    value: value(v1)?,
                    join,
                },
                Rule {
                    comparator: Comparator::parse(cmp2)?,
                    value: value(v2)?,
                    join,
                },
            ])
        },
        _ => Err(TimeSeriesError::parse(
            text,
            format!("expected 1, 2 or 5 tokens, found {}", tokens.len()),
        )),
    }
}
