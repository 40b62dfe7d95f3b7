use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

pub const TENSOR_LIMIT_ENV: &str = "GRAPHLOOM_TENSOR_LIMIT";
pub const CPU_DEVICES_ENV: &str = "GRAPHLOOM_CPU_DEVICES";

/// Process-level knobs consumed by [`crate::init_with`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextProperties {
    /// Largest single allocation a device accepts, in bytes.
    pub tensor_byte_length_limit: usize,
    /// Number of CPU devices the CPU factory reports during discovery.
    pub cpu_device_count: usize,
}

impl Default for ContextProperties {
    fn default() -> Self {
        Self {
            tensor_byte_length_limit: 256 * 1024 * 1024,
            cpu_device_count: 1,
        }
    }
}

impl ContextProperties {
    /// Load properties from a JSON file. Missing fields keep their defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| GraphError::io(path_ref, err))?;
        let properties = serde_json::from_str(&contents)?;
        log::debug!("loaded context properties from `{}`", path_ref.display());
        Ok(properties)
    }

    /// Apply `GRAPHLOOM_TENSOR_LIMIT` and `GRAPHLOOM_CPU_DEVICES` on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self, GraphError> {
        self.with_overrides(|variable| env::var(variable).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, GraphError> {
        if let Some(limit) = parse_env_usize(TENSOR_LIMIT_ENV, lookup(TENSOR_LIMIT_ENV))? {
            self.tensor_byte_length_limit = limit;
        }
        if let Some(count) = parse_env_usize(CPU_DEVICES_ENV, lookup(CPU_DEVICES_ENV))? {
            self.cpu_device_count = count;
        }
        Ok(self)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, GraphError> {
        Self::default().with_env_overrides()
    }
}

fn parse_env_usize(variable: &str, value: Option<String>) -> Result<Option<usize>, GraphError> {
    let Some(value) = value else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| GraphError::InvalidEnvValue {
            variable: variable.to_string(),
            value,
        })
}
