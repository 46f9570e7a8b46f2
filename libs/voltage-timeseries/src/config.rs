//! Engine configuration
//!
//! Sources, lowest to highest priority: built-in defaults, an optional
//! TOML/YAML/JSON file chosen by extension, `TSAGG_`-prefixed environment
//! variables (`TSAGG_DEFAULT_WINDOW__BEHIND_MINUTES=30`).

use crate::data_function::AggregationWindow;
use crate::error::{Result, TimeSeriesError};
use crate::parser::{FunctionCallParser, ParameterLookup};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TSAGG_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the shared timestep cache
    pub timestep_cache_size: usize,
    /// Parameters aggregated with circular statistics
    pub directional_parameters: Vec<String>,
    /// Window of time functions whose parameter carries none
    pub default_window: AggregationWindow,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timestep_cache_size: 1000,
            directional_parameters: vec![
                "winddirection".to_string(),
                "wavedirection".to_string(),
                "dd".to_string(),
            ],
            default_window: AggregationWindow::default(),
        }
    }
}

impl EngineConfig {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

        if let Some(path) = path {
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .ok_or_else(|| TimeSeriesError::config("Config file must have an extension"))?;
            figment = match extension {
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                "json" => figment.merge(Json::file(path)),
                _ => {
                    return Err(TimeSeriesError::config(format!(
                        "Unsupported config file format: {}",
                        extension
                    )))
                },
            };
        }

        let config: EngineConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| TimeSeriesError::config(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;

        tracing::debug!(
            cache_size = config.timestep_cache_size,
            directional = config.directional_parameters.len(),
            "Loaded engine configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timestep_cache_size == 0 {
            return Err(TimeSeriesError::config("timestep_cache_size must be positive"));
        }
        if self.directional_parameters.iter().any(|p| p.trim().is_empty()) {
            return Err(TimeSeriesError::config(
                "directional_parameters must not contain empty names",
            ));
        }
        Ok(())
    }

    pub fn parameter_lookup(&self) -> ParameterLookup {
        ParameterLookup::new(&self.directional_parameters)
    }

    /// Function-call parser using this configuration
    pub fn parser(&self) -> Result<FunctionCallParser> {
        FunctionCallParser::new(self.parameter_lookup(), self.default_window)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timestep_cache_size, 1000);
        assert!(config.parameter_lookup().is_directional("WindDirection"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml() {
        let file = write_config(
            ".toml",
            r#"
timestep_cache_size = 50
directional_parameters = ["wd"]

[default_window]
behind_minutes = 30
"#,
        );
        let config = EngineConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.timestep_cache_size, 50);
        assert_eq!(config.directional_parameters, vec!["wd".to_string()]);
        assert_eq!(config.default_window, AggregationWindow::new(30, 0));
    }

    #[test]
    fn test_load_yaml_keeps_unset_defaults() {
        let file = write_config(".yaml", "timestep_cache_size: 7\n");
        let config = EngineConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.timestep_cache_size, 7);
        assert_eq!(config.directional_parameters.len(), 3);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = write_config(".json", r#"{"timestep_cache_size": 0}"#);
        let err = EngineConfig::load(Some(file.path())).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_unknown_extension() {
        let file = write_config(".ini", "timestep_cache_size=1");
        let err = EngineConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("ini"), "{}", err);
    }
}
