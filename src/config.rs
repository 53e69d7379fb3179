// NODE CONFIGURATION
// Layered settings for the vela binary: built-in defaults, then
// <home>/config/app.toml, then VELA_* environment variables
// (VELA_LOG_LEVEL, VELA_APP__HALT_HEIGHT, VELA_APP__PRUNING__KEEP_RECENT, ...).
//
// SAFETY INVARIANTS:
// 1. Every field has a default, so a missing app.toml is not an error
// 2. Relative genesis and state paths resolve against the home directory
// 3. Unparseable minimum gas prices are rejected at load time, never mid-block

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use vela_core::AppConfig;

pub const CONFIG_DIR: &str = "config";
pub const CONFIG_FILE: &str = "app.toml";
pub const ENV_PREFIX: &str = "VELA";

#[derive(Debug, Error)]
pub enum NodeConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("configuration I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node home directory. The directory given on the command line wins
    /// over any value found in the file or the environment.
    pub home: PathBuf,
    pub log_level: String,
    pub chain_id: String,
    pub genesis_file: PathBuf,
    pub state_file: PathBuf,
    pub app: AppConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            home: PathBuf::from(".vela"),
            log_level: "info".to_string(),
            chain_id: "vela-1".to_string(),
            genesis_file: PathBuf::from("config/genesis.json"),
            state_file: PathBuf::from("data/state.bin"),
            app: AppConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        NodeConfig { home: home.into(), ..Default::default() }
    }

    pub fn config_path(home: &Path) -> PathBuf {
        home.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    pub fn load(home: &Path) -> Result<Self, NodeConfigError> {
        let defaults = NodeConfig::with_home(home);
        let settings = Config::builder()
            .add_source(Config::try_from(&defaults)?)
            .add_source(File::from(Self::config_path(home)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: NodeConfig = settings.try_deserialize()?;
        cfg.home = home.to_path_buf();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), NodeConfigError> {
        if self.chain_id.trim().is_empty() {
            return Err(NodeConfigError::Invalid("chain_id must not be empty".to_string()));
        }
        self.app.min_gas_prices().map_err(|e| NodeConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn genesis_path(&self) -> PathBuf {
        self.resolve(&self.genesis_file)
    }

    pub fn state_path(&self) -> PathBuf {
        self.resolve(&self.state_file)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.home.join(path)
        }
    }

    pub fn to_toml(&self) -> Result<String, NodeConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes this configuration to `<home>/config/app.toml`.
    pub fn write(&self, overwrite: bool) -> Result<PathBuf, NodeConfigError> {
        let path = Self::config_path(&self.home);
        if path.exists() && !overwrite {
            return Err(NodeConfigError::AlreadyExists(path));
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, self.to_toml()?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layered_load() {
        let home = tempfile::tempdir().unwrap();

        // defaults only
        let cfg = NodeConfig::load(home.path()).unwrap();
        assert_eq!(cfg, NodeConfig::with_home(home.path()));

        // file overrides defaults
        let mut written = NodeConfig::with_home(home.path());
        written.chain_id = "vela-local".to_string();
        written.app.halt_height = 40;
        written.app.minimum_gas_prices = "2uvela".to_string();
        written.write(false).unwrap();
        let cfg = NodeConfig::load(home.path()).unwrap();
        assert_eq!(cfg.chain_id, "vela-local");
        assert_eq!(cfg.app.halt_height, 40);
        assert_eq!(cfg.app.min_gas_prices().unwrap().amount_of("uvela"), 2);

        // environment overrides the file
        std::env::set_var("VELA_APP__HALT_HEIGHT", "75");
        let cfg = NodeConfig::load(home.path());
        std::env::remove_var("VELA_APP__HALT_HEIGHT");
        let cfg = cfg.unwrap();
        assert_eq!(cfg.app.halt_height, 75);
        assert_eq!(cfg.chain_id, "vela-local");
    }

    #[test]
    fn test_relative_paths_resolve_against_home() {
        let mut cfg = NodeConfig::with_home("/srv/vela");
        assert_eq!(cfg.state_path(), PathBuf::from("/srv/vela/data/state.bin"));
        cfg.genesis_file = PathBuf::from("/etc/vela/genesis.json");
        assert_eq!(cfg.genesis_path(), PathBuf::from("/etc/vela/genesis.json"));
    }

    #[test]
    fn test_write_refuses_to_overwrite() {
        let home = tempfile::tempdir().unwrap();
        let cfg = NodeConfig::with_home(home.path());
        cfg.write(false).unwrap();
        assert!(matches!(cfg.write(false), Err(NodeConfigError::AlreadyExists(_))));
        cfg.write(true).unwrap();
    }

    #[test]
    fn test_invalid_gas_prices_rejected() {
        let home = tempfile::tempdir().unwrap();
        let mut cfg = NodeConfig::with_home(home.path());
        cfg.app.minimum_gas_prices = "cheap".to_string();
        cfg.write(false).unwrap();
        assert!(matches!(NodeConfig::load(home.path()), Err(NodeConfigError::Invalid(_))));
    }
}
