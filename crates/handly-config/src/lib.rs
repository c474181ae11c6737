//! TOML configuration for Handly models.
//!
//! A [`HandlyConfig`] tunes the element cache, working-copy initialization
//! and logging. Every key is optional; an empty file yields the defaults.
//!
//! ```toml
//! [cache]
//! source_file = 500
//! load_factor = 0.5
//!
//! [working_copy]
//! init_poll_interval_ms = 20
//!
//! [logging]
//! level = "handly=debug"
//! json = true
//! ```

use std::path::Path;
use std::time::Duration;

use handly_core::{memory_ratio, CacheLimits, ManagerOptions, DEFAULT_INIT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod diagnostics;
mod logging;

pub use diagnostics::{ConfigDiagnostics, ConfigWarning};
pub use logging::{init_tracing, LoggingConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Toml(err.message().to_string())
    }
}

/// Element cache sizing.
///
/// Segment limits left unset default to the built-in limits scaled by the
/// memory ratio.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Multiplier for the default segment limits. Derived from installed
    /// memory when unset.
    #[serde(default)]
    pub memory_ratio: Option<f64>,

    #[serde(default)]
    pub project: Option<usize>,
    #[serde(default)]
    pub root_folder: Option<usize>,
    #[serde(default)]
    pub package: Option<usize>,
    #[serde(default)]
    pub source_file: Option<usize>,
    /// Bounds the source construct segment, which is otherwise unbounded.
    #[serde(default)]
    pub source_construct: Option<usize>,

    /// Fraction of a segment's limit kept after an eviction sweep, in `(0, 1]`.
    #[serde(default)]
    pub load_factor: Option<f64>,
}

impl CacheConfig {
    /// Limits for the core element cache.
    ///
    /// Out-of-range values are ignored in favor of the defaults; see
    /// [`HandlyConfig::validate`] for the matching warnings.
    pub fn cache_limits(&self) -> CacheLimits {
        let ratio = self
            .memory_ratio
            .filter(|ratio| valid_ratio(*ratio))
            .unwrap_or_else(memory_ratio);
        let mut limits = CacheLimits::scaled(ratio);

        let overrides = [
            (&mut limits.project, self.project),
            (&mut limits.root_folder, self.root_folder),
            (&mut limits.package, self.package),
            (&mut limits.source_file, self.source_file),
            (&mut limits.source_construct, self.source_construct),
        ];
        for (slot, value) in overrides {
            if let Some(value) = value.filter(|value| *value > 0) {
                *slot = Some(value);
            }
        }

        if let Some(load_factor) = self.load_factor.filter(|lf| valid_load_factor(*lf)) {
            limits.load_factor = load_factor;
        }
        limits
    }

    fn segment_overrides(&self) -> [(&'static str, Option<usize>); 5] {
        [
            ("project", self.project),
            ("root_folder", self.root_folder),
            ("package", self.package),
            ("source_file", self.source_file),
            ("source_construct", self.source_construct),
        ]
    }
}

fn valid_ratio(ratio: f64) -> bool {
    ratio.is_finite() && ratio > 0.0
}

fn valid_load_factor(load_factor: f64) -> bool {
    load_factor > 0.0 && load_factor <= 1.0
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingCopyConfig {
    /// How often threads waiting for another thread's working-copy
    /// initialization wake up to check for cancellation.
    #[serde(default = "WorkingCopyConfig::default_init_poll_interval_ms")]
    pub init_poll_interval_ms: u64,
}

impl WorkingCopyConfig {
    fn default_init_poll_interval_ms() -> u64 {
        DEFAULT_INIT_POLL_INTERVAL.as_millis() as u64
    }

    pub fn init_poll_interval(&self) -> Duration {
        if self.init_poll_interval_ms == 0 {
            DEFAULT_INIT_POLL_INTERVAL
        } else {
            Duration::from_millis(self.init_poll_interval_ms)
        }
    }
}

impl Default for WorkingCopyConfig {
    fn default() -> Self {
        Self {
            init_poll_interval_ms: Self::default_init_poll_interval_ms(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlyConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub working_copy: WorkingCopyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HandlyConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Like [`HandlyConfig::load_from_path`] but also reports unknown keys and
    /// suspicious values.
    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_from_str_with_diagnostics(&text)
    }

    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<HandlyConfig>(text)?;
        let warnings = config.validate();
        Ok((
            config,
            ConfigDiagnostics {
                unknown_keys,
                warnings,
            },
        ))
    }

    /// Values that parse but are out of range. The affected settings fall
    /// back to their defaults.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Some(ratio) = self.cache.memory_ratio {
            if !valid_ratio(ratio) {
                warnings.push(ConfigWarning::InvalidValue {
                    toml_path: "cache.memory_ratio".to_string(),
                    message: format!("must be a positive number, got {ratio}"),
                });
            }
        }
        for (key, value) in self.cache.segment_overrides() {
            if value == Some(0) {
                warnings.push(ConfigWarning::InvalidValue {
                    toml_path: format!("cache.{key}"),
                    message: "a segment limit must be at least 1".to_string(),
                });
            }
        }
        if let Some(load_factor) = self.cache.load_factor {
            if !valid_load_factor(load_factor) {
                warnings.push(ConfigWarning::InvalidValue {
                    toml_path: "cache.load_factor".to_string(),
                    message: format!("must be in (0, 1], got {load_factor}"),
                });
            }
        }
        if self.working_copy.init_poll_interval_ms == 0 {
            warnings.push(ConfigWarning::InvalidValue {
                toml_path: "working_copy.init_poll_interval_ms".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if let Some(warning) = self.logging.level_warning() {
            warnings.push(warning);
        }

        warnings
    }

    /// Options for constructing a `handly_core::ElementManager`.
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            cache_limits: self.cache.cache_limits(),
            init_poll_interval: self.working_copy.init_poll_interval(),
        }
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
