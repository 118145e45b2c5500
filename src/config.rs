//! Harness configuration.
//!
//! Loads [`HarnessConfig`] from a TOML file with `KERNELCHECK_*` environment
//! variable overrides.

use std::{path::Path, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::info;

use crate::scalar::{KernelKind, Precision};

pub const ENV_REL_ERROR: &str = "KERNELCHECK_REL_ERROR";
pub const ENV_SEED: &str = "KERNELCHECK_SEED";
pub const ENV_SAMPLES: &str = "KERNELCHECK_SAMPLES";
pub const ENV_STREAMS: &str = "KERNELCHECK_STREAMS";

/// Which streams each section runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// The implicit default queue only
    Default,
    /// A freshly created queue only
    Custom,
    Both,
}

impl StreamMode {
    /// `use_default` flags to build streams with, in run order.
    pub fn use_default_flags(self) -> Vec<bool> {
        match self {
            StreamMode::Default => vec![true],
            StreamMode::Custom => vec![false],
            StreamMode::Both => vec![true, false],
        }
    }
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Custom => write!(f, "custom"),
            Self::Both => write!(f, "both"),
        }
    }
}

impl FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "custom" => Ok(Self::Custom),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown stream mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Check tolerance.
    /// Override: `KERNELCHECK_REL_ERROR`
    pub rel_error_threshold: f64,
    /// Seed for every random draw. A fresh one is drawn and logged when absent.
    /// Override: `KERNELCHECK_SEED`
    pub seed: Option<u64>,
    /// Random problem draws per section.
    /// Override: `KERNELCHECK_SAMPLES`
    pub samples: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub min_nrhs: usize,
    pub max_nrhs: usize,
    /// Override: `KERNELCHECK_STREAMS`
    pub streams: StreamMode,
    pub kernels: Vec<KernelKind>,
    pub precisions: Vec<Precision>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            rel_error_threshold: 1e-4,
            seed: None,
            samples: 1,
            min_size: 50,
            max_size: 150,
            min_nrhs: 2,
            max_nrhs: 20,
            streams: StreamMode::Both,
            kernels: KernelKind::iter().collect(),
            precisions: Precision::iter().collect(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid environment override {key}={value}: {reason}")]
    EnvOverride {
        key: String,
        value: String,
        reason: String,
    },
}

fn parse_override<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::EnvOverride {
        key: key.into(),
        reason: e.to_string(),
        value,
    })
}

impl HarnessConfig {
    /// Load a TOML file, filling missing fields with defaults, then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut cfg: HarnessConfig = toml::from_str(&contents)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate TOML text. Environment variables are not consulted.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let cfg: HarnessConfig = toml::from_str(toml_str)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rel_error_threshold.is_finite() || self.rel_error_threshold < 0.0 {
            return Err(ConfigError::Validation(format!(
                "rel_error_threshold must be finite and >= 0, got {}",
                self.rel_error_threshold
            )));
        }
        if self.samples == 0 {
            return Err(ConfigError::Validation("samples must be > 0".into()));
        }
        if self.min_size == 0 || self.min_size > self.max_size {
            return Err(ConfigError::Validation(format!(
                "size range must satisfy 0 < min_size <= max_size, got {}..={}",
                self.min_size, self.max_size
            )));
        }
        if self.max_size > i32::MAX as usize / 8 {
            return Err(ConfigError::Validation(format!(
                "max_size {} does not fit a BLAS dimension",
                self.max_size
            )));
        }
        if self.min_nrhs == 0 || self.min_nrhs > self.max_nrhs {
            return Err(ConfigError::Validation(format!(
                "nrhs range must satisfy 0 < min_nrhs <= max_nrhs, got {}..={}",
                self.min_nrhs, self.max_nrhs
            )));
        }
        if self.kernels.is_empty() {
            return Err(ConfigError::Validation("kernels must not be empty".into()));
        }
        if self.precisions.is_empty() {
            return Err(ConfigError::Validation(
                "precisions must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Apply `KERNELCHECK_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = lookup(ENV_REL_ERROR) {
            self.rel_error_threshold = parse_override(ENV_REL_ERROR, val)?;
        }
        if let Some(val) = lookup(ENV_SEED) {
            self.seed = Some(parse_override(ENV_SEED, val)?);
        }
        if let Some(val) = lookup(ENV_SAMPLES) {
            self.samples = parse_override(ENV_SAMPLES, val)?;
        }
        if let Some(val) = lookup(ENV_STREAMS) {
            self.streams = parse_override(ENV_STREAMS, val)?;
        }
        Ok(())
    }

    /// The configured seed, or a fresh one that gets logged so the run can be
    /// repeated.
    pub fn resolve_seed(&self) -> u64 {
        match self.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::thread_rng().gen();
                info!(seed, "drew random seed, set {ENV_SEED} to reproduce");
                seed
            }
        }
    }
}
