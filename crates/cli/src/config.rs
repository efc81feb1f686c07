//! CLI configuration

use crate::error::{CliError, CliResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration, loaded from `<config dir>/convoy/config.toml`.
///
/// Everything here is a default; explicit command-line flags win.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    /// Default deployment state file
    pub state_file: Option<PathBuf>,

    /// Default snapshot store root
    pub snapshot_dir: Option<PathBuf>,

    /// Default report output directory
    pub report_dir: Option<PathBuf>,

    /// Executor playbook binary
    pub playbook_bin: Option<String>,

    /// Executor ad-hoc binary
    pub adhoc_bin: Option<String>,
}

impl CliConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> CliResult<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let config: CliConfig =
                toml::from_str(&contents).map_err(|e| CliError::Config(e.to_string()))?;
            Ok(config)
        } else {
            Ok(CliConfig::default())
        }
    }

    /// Get the default configuration file path
    fn default_config_path() -> CliResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CliError::Config("Cannot find config directory".into()))?;
        Ok(config_dir.join("convoy").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert!(config.state_file.is_none());
        assert!(config.snapshot_dir.is_none());
    }

    #[test]
    fn test_load_missing_config() {
        // Should return default config when file doesn't exist
        let config = CliConfig::load(Some("/nonexistent/path/config.toml")).unwrap();
        assert!(config.state_file.is_none());
    }

    #[test]
    fn test_parse_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "state_file = \"/var/lib/convoy/state.json\"\nplaybook_bin = \"ansible-playbook\"\n",
        )
        .unwrap();

        let config = CliConfig::load(path.to_str()).unwrap();
        assert_eq!(
            config.state_file.as_deref(),
            Some(std::path::Path::new("/var/lib/convoy/state.json"))
        );
        assert_eq!(config.playbook_bin.as_deref(), Some("ansible-playbook"));
    }
}
