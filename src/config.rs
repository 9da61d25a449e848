//! Interpreter settings
//!
//! Read from a TOML file; every field has a default so a partial (or empty)
//! file is accepted.

use crate::error::VmError;
use log::info;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// File looked for in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "zcore.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Capacity of the save_undo ring
    pub undo_slots: usize,
    pub screen_width: u16,
    pub screen_height: u16,
    /// Start with a predictable random sequence
    pub random_seed: Option<u64>,
    /// Value written to header byte 0x1E
    pub interpreter_number: u8,
    /// Value written to header byte 0x1F
    pub interpreter_version: char,
    /// Name used when the transcript file is opened
    pub transcript_name: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            undo_slots: 10,
            screen_width: 80,
            screen_height: 24,
            random_seed: None,
            interpreter_number: 6,
            interpreter_version: 'A',
            transcript_name: "transcript.txt".to_string(),
        }
    }
}

impl InterpreterConfig {
    pub fn from_toml(text: &str) -> Result<Self, VmError> {
        toml::from_str(text).map_err(|e| VmError::Load(format!("Bad configuration: {}", e)))
    }

    /// Load from an explicit path, or from `zcore.toml` if present
    pub fn load(path: Option<&Path>) -> Result<Self, VmError> {
        let path = match path {
            Some(p) => p,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Path::new(DEFAULT_CONFIG_FILE),
            None => return Ok(Self::default()),
        };
        let text = fs::read_to_string(path).map_err(|e| {
            VmError::Load(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = InterpreterConfig::from_toml("undo_slots = 3\nrandom_seed = 7\n").unwrap();
        assert_eq!(config.undo_slots, 3);
        assert_eq!(config.random_seed, Some(7));
        assert_eq!(config.screen_width, 80);
        assert_eq!(config.interpreter_version, 'A');
        assert_eq!(InterpreterConfig::from_toml("").unwrap(), InterpreterConfig::default());
    }

    #[test]
    fn test_rejects_bad_types() {
        assert!(matches!(
            InterpreterConfig::from_toml("undo_slots = \"many\""),
            Err(VmError::Load(_))
        ));
    }
}
