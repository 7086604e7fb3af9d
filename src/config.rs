// TWINS-Core/twins_chain_core/src/config.rs
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

use crate::chainparams::{ChainParams, Network};

pub const DEFAULT_CONFIG_FILE: &str = "twins_chain";
pub const DEFAULT_DB_PATH: &str = "twins_chain_index.sqlite";

/// Node settings. Sources, lowest precedence first: built-in defaults, an
/// optional `twins_chain.toml`, then `TWINS_CHAIN_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub network: Network,
    pub db_path: String,
}

impl NodeConfig {
    /// An explicit `config_file` must exist; the default one may be absent.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        Config::builder()
            .set_default("network", "mainnet")?
            .set_default("db_path", DEFAULT_DB_PATH)?
            .add_source(file)
            .add_source(Environment::with_prefix("TWINS_CHAIN"))
            .build()?
            .try_deserialize()
    }

    /// Defaults overlaid with a TOML document; no environment lookup.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("network", "mainnet")?
            .set_default("db_path", DEFAULT_DB_PATH)?
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn chain_params(&self) -> &'static ChainParams {
        ChainParams::for_network(self.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_document() {
        let config = NodeConfig::from_toml("").unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.db_path, DEFAULT_DB_PATH);
        assert_eq!(config.chain_params().network_id_string, "main");
    }

    #[test]
    fn file_values_override_defaults() {
        let config = NodeConfig::from_toml("network = \"regtest\"\ndb_path = \"/tmp/regtest.sqlite\"\n").unwrap();
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.db_path, "/tmp/regtest.sqlite");
        assert!(config.chain_params().skip_equihash);
    }

    #[test]
    fn explicit_config_file_is_read() {
        let path = std::env::temp_dir().join(format!("twins_chain_config_{}.toml", std::process::id()));
        std::fs::write(&path, "network = \"testnet\"\ndb_path = \"testnet.sqlite\"\n").unwrap();
        let loaded = NodeConfig::load(Some(&path));
        std::fs::remove_file(&path).unwrap();
        let config = loaded.unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.db_path, "testnet.sqlite");
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let path = std::env::temp_dir().join("twins_chain_config_does_not_exist.toml");
        assert!(NodeConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn unknown_network_is_rejected() {
        assert!(NodeConfig::from_toml("network = \"signet\"").is_err());
    }
}
