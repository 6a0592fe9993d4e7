//! Agent configuration.
//!
//! The configuration is a YAML file naming the control-plane API and the
//! plugins to run, overridable through `CCF_*` environment variables and a
//! small set of CLI flags. Precedence: explicit CLI flag > environment >
//! file > built-in default.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use concom_proto::DynamicValue;

pub mod error;

pub use error::{ConfigError, ConfigResult};

/// Schedule used when a plugin does not declare one.
pub const DEFAULT_SCHEDULE: &str = "* * * * *";

/// Prefix for environment overrides: `CCF_API_URL` overrides `api.url`.
const ENV_PREFIX: &str = "CCF";

/// Control-plane API settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    pub url: String,
}

/// One plugin entry of the agent configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PluginSpec {
    /// Local path or registry reference of the plugin executable.
    pub source: String,

    /// Policy bundle references evaluated by this plugin.
    #[serde(default)]
    pub policies: Vec<String>,

    /// Five-field cron expression; absent means every minute.
    #[serde(default)]
    pub schedule: Option<String>,

    /// Arbitrary nested plugin configuration, converted to a
    /// [`DynamicValue`] before it crosses the plugin boundary.
    #[serde(default)]
    pub config: serde_yaml::Value,

    /// Labels attached to every piece of evidence this plugin produces.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl PluginSpec {
    /// The declared schedule, or the every-minute default.
    pub fn effective_schedule(&self) -> &str {
        self.schedule.as_deref().unwrap_or(DEFAULT_SCHEDULE)
    }

    /// The plugin configuration as a dynamic value.
    ///
    /// An absent or null `config` block is an empty mapping.
    pub fn dynamic_config(&self) -> ConfigResult<DynamicValue> {
        if self.config.is_null() {
            return Ok(DynamicValue::empty_map());
        }
        DynamicValue::from_yaml(&self.config).map_err(|e| ConfigError::Invalid {
            reason: format!("plugin config is not representable: {e}"),
        })
    }
}

/// The agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentConfig {
    /// Run indefinitely on a schedule instead of once.
    #[serde(default)]
    pub daemon: bool,

    /// Log verbosity; each increment lowers the threshold one level.
    #[serde(default)]
    pub verbosity: u8,

    pub api: Option<ApiConfig>,

    #[serde(default)]
    pub plugins: BTreeMap<String, PluginSpec>,
}

impl AgentConfig {
    /// Load the configuration from a YAML file with `CCF_*` environment
    /// overrides applied on top.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("_"),
            )
            .build()
            .map_err(|e| ConfigError::Load {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        settings
            .try_deserialize()
            .map_err(|e| ConfigError::Load {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// Reject configurations the agent cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.plugins.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "no plugins specified in config".to_string(),
            });
        }
        if self.api.is_none() {
            return Err(ConfigError::Invalid {
                reason: "no api config specified in config".to_string(),
            });
        }
        for (name, plugin) in &self.plugins {
            plugin.dynamic_config().map_err(|e| ConfigError::Invalid {
                reason: format!("plugin {name:?}: {e}"),
            })?;
        }
        Ok(())
    }

    /// The API config after [`validate`](Self::validate) has passed.
    pub fn api(&self) -> ConfigResult<&ApiConfig> {
        self.api.as_ref().ok_or_else(|| ConfigError::Invalid {
            reason: "no api config specified in config".to_string(),
        })
    }

    /// Overlay explicitly-set CLI flags onto the file-derived config.
    ///
    /// Flags the user did not pass are `None` and leave the file values
    /// untouched.
    pub fn merge_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(daemon) = overrides.daemon {
            self.daemon = daemon;
        }
        if let Some(verbosity) = overrides.verbosity {
            self.verbosity = verbosity;
        }
    }
}

/// CLI flags that may override the file config, `None` when not given.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliOverrides {
    pub daemon: Option<bool>,
    pub verbosity: Option<u8>,
}
