//! Application configuration.
//!
//! Configuration can be built in code, parsed from JSON, or read from
//! environment variables sharing a prefix.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{DiError, DiResult};

/// When application-scoped providers are constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstantiationPolicy {
    /// On first request
    #[default]
    Lazy,
    /// During `ApplicationBuilder::build`
    Eager,
}

/// Runtime settings shared by every injector of an application.
///
/// # Examples
///
/// ```
/// use ferrous_modules::{ApplicationConfig, InstantiationPolicy};
///
/// let config = ApplicationConfig::from_json_str(r#"{ "instantiation": "eager" }"#).unwrap();
/// assert_eq!(config.instantiation, InstantiationPolicy::Eager);
/// assert_eq!(config.max_resolution_depth, 64);
/// assert!(config.warn_on_undestroyed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Construction policy for application-scoped providers
    pub instantiation: InstantiationPolicy,
    /// Longest dependency chain a single resolution may follow
    pub max_resolution_depth: usize,
    /// Log a warning when an operation controller is dropped undestroyed
    pub warn_on_undestroyed: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            instantiation: InstantiationPolicy::Lazy,
            max_resolution_depth: 64,
            warn_on_undestroyed: true,
        }
    }
}

impl ApplicationConfig {
    pub fn eager() -> Self {
        Self {
            instantiation: InstantiationPolicy::Eager,
            ..Self::default()
        }
    }

    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    pub fn with_warn_on_undestroyed(mut self, warn: bool) -> Self {
        self.warn_on_undestroyed = warn;
        self
    }

    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> DiResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|err| DiError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `{PREFIX}_INSTANTIATION`, `{PREFIX}_MAX_RESOLUTION_DEPTH` and
    /// `{PREFIX}_WARN_ON_UNDESTROYED`. Unset variables keep their defaults.
    pub fn from_env(prefix: &str) -> DiResult<Self> {
        let prefix = prefix.to_uppercase();
        let var = |name: &str| env::var(format!("{prefix}_{name}")).ok();
        let mut config = Self::default();

        if let Some(value) = var("INSTANTIATION") {
            config.instantiation = match value.to_lowercase().as_str() {
                "lazy" => InstantiationPolicy::Lazy,
                "eager" => InstantiationPolicy::Eager,
                other => return Err(DiError::Config(format!("unknown instantiation policy `{other}`"))),
            };
        }
        if let Some(value) = var("MAX_RESOLUTION_DEPTH") {
            config.max_resolution_depth = value
                .parse()
                .map_err(|_| DiError::Config(format!("max_resolution_depth is not a number: `{value}`")))?;
        }
        if let Some(value) = var("WARN_ON_UNDESTROYED") {
            config.warn_on_undestroyed = value
                .parse()
                .map_err(|_| DiError::Config(format!("warn_on_undestroyed is not a bool: `{value}`")))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DiResult<()> {
        if self.max_resolution_depth == 0 {
            return Err(DiError::Config("max_resolution_depth must be greater than zero".into()));
        }
        Ok(())
    }
}
