//! Machine configuration.
//!
//! Settings can come from a JSON file and are then overridden by
//! command-line flags:
//!
//! ```json
//! { "memory": 100, "address_bound": 100, "max_cycles": 5000, "trace": false }
//! ```

use crate::cpu::{ConfigError, CpuConfig};
use crate::cpu::memory::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default cap on executed instructions for a non-interactive run.
pub const DEFAULT_MAX_CYCLES: u64 = 100_000;

/// Everything a host needs to build and drive a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    /// Memory capacity in words.
    pub memory: usize,
    /// Operand bound and HALT sentinel; the memory capacity when absent.
    pub address_bound: Option<usize>,
    /// Maximum number of instructions per run.
    pub max_cycles: u64,
    /// Print each executed instruction.
    pub trace: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory: DEFAULT_CAPACITY,
            address_bound: None,
            max_cycles: DEFAULT_MAX_CYCLES,
            trace: false,
        }
    }
}

impl MachineConfig {
    /// Read a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigFileError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigFileError::IoError(e.to_string()))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ConfigFileError::ParseError(e.to_string()))?;
        config.cpu_config()?;
        Ok(config)
    }

    /// The engine configuration, validated.
    pub fn cpu_config(&self) -> Result<CpuConfig, ConfigError> {
        let config = CpuConfig::new(self.memory).with_bound(self.address_bound.unwrap_or(self.memory));
        config.validate()?;
        Ok(config)
    }
}

/// Errors that can occur while loading a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigFileError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("invalid configuration file: {0}")]
    ParseError(String),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MachineConfig::default();
        assert_eq!(config.cpu_config().unwrap(), CpuConfig::new(250));
    }

    #[test]
    fn test_bound_follows_memory() {
        let config = MachineConfig { memory: 100, ..Default::default() };
        assert_eq!(config.cpu_config().unwrap().address_bound, 100);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "memory": 100, "trace": true }}"#).unwrap();

        let config = MachineConfig::load(file.path()).unwrap();
        assert_eq!(config.memory, 100);
        assert!(config.trace);
        assert_eq!(config.max_cycles, DEFAULT_MAX_CYCLES);
    }

    #[test]
    fn test_load_rejects_bad_bound() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "memory": 100, "address_bound": 250 }}"#).unwrap();

        let err = MachineConfig::load(file.path()).unwrap_err();
        assert_eq!(
            err,
            ConfigFileError::Invalid(ConfigError::BoundOutOfRange { bound: 250, capacity: 100 })
        );
    }

    #[test]
    fn test_load_rejects_unknown_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "memroy": 100 }}"#).unwrap();

        assert!(matches!(MachineConfig::load(file.path()), Err(ConfigFileError::ParseError(_))));
    }
}
