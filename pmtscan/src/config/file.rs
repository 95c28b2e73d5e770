//! Configuration file loading.

use super::settings::ScanConfig;
use ini::Ini;
use std::path::Path;
use thiserror::Error;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read or parse the INI file
    #[error("failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// A key was present but its value could not be interpreted
    #[error("invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        /// INI section the key lives in
        section: String,
        /// Offending key
        key: String,
        /// Raw value as found in the file
        value: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Loads configuration from `path`.
///
/// If the file doesn't exist, returns defaults; keys absent from the
/// file keep their defaults.
pub fn load_from(path: &Path) -> Result<ScanConfig, ConfigFileError> {
    if !path.exists() {
        return Ok(ScanConfig::default());
    }

    let ini = Ini::load_from_file(path)?;
    super::parser::parse_ini(&ini)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.ini");

        let config = load_from(&path).unwrap();
        assert_eq!(config, ScanConfig::default());
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.ini");
        std::fs::write(&path, "[grid\nmax_radius = 5").unwrap();

        assert!(matches!(load_from(&path), Err(ConfigFileError::Read(_))));
    }
}
