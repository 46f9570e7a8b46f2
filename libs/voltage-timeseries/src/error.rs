//! Error types for voltage-timeseries

use thiserror::Error;

/// Result type for time-series operations
pub type Result<T> = std::result::Result<T, TimeSeriesError>;

/// Time-series aggregation errors
///
/// Missing data is never an error: statistics report it as `None` and the
/// aggregator stores it as [`crate::Value::Missing`].
#[derive(Debug, Error)]
pub enum TimeSeriesError {
    /// Malformed function-call or data-filter text
    #[error("Parse error in '{fragment}': {reason}")]
    Parse { fragment: String, reason: String },

    /// Unsupported value-kind/function pairing and similar per-field failures
    #[error("Computation error: {0}")]
    Computation(String),

    /// Windowed statistic requested on samples without valid timestamps
    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error with additional context
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<TimeSeriesError>,
    },
}

/// Coarse classification used by callers to decide the blast radius of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The whole request fails
    Parse,
    /// Only the affected output field fails
    Computation,
    /// Engine setup failed
    Config,
}

impl TimeSeriesError {
    pub fn parse(fragment: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            fragment: fragment.into(),
            reason: reason.into(),
        }
    }

    pub fn computation(msg: impl Into<String>) -> Self {
        Self::Computation(msg.into())
    }

    pub fn invalid_window(msg: impl Into<String>) -> Self {
        Self::InvalidWindow(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap this error with a context message
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify the error, looking through context wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Computation(_) | Self::InvalidWindow(_) => ErrorKind::Computation,
            Self::Config(_) => ErrorKind::Config,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// The innermost error of a context chain
    pub fn root_cause(&self) -> &TimeSeriesError {
        match self {
            Self::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Context helpers for `Result<T, TimeSeriesError>`
pub trait ResultExt<T> {
    /// Attach a fixed context message
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Attach a lazily built context message
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_parse_error_names_fragment() {
        let err = TimeSeriesError::parse("meen_t", "unknown function");
        assert_eq!(err.to_string(), "Parse error in 'meen_t': unknown function");
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_context_chain_keeps_source() {
        let result: Result<()> = Err(TimeSeriesError::computation("mean on text"));
        let err = result.context("parameter 'name'").unwrap_err();

        assert_eq!(err.to_string(), "parameter 'name'");
        assert_eq!(err.kind(), ErrorKind::Computation);
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Computation error: mean on text"));
        assert!(matches!(
            err.root_cause(),
            TimeSeriesError::Computation(msg) if msg == "mean on text"
        ));
    }
}
