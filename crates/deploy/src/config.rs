//! Layered settings: built-in defaults, user config, project config, environment.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// File name of the project and user configuration files.
pub const CONFIG_FILENAME: &str = "Layercake.toml";

/// Prefix of the environment variables overriding settings.
pub const ENV_PREFIX: &str = "LAYERCAKE_";

/// Name of the network used when none is given.
pub const DEFAULT_NETWORK: &str = "development";

/// Local development node (ganache / anvil default port).
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Connection settings for one target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    /// Deploying account. Defaults to the node's first account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Gas limit of deployment transactions. Left to the node's estimate when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_confirm_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl NetworkConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            from: None,
            gas: None,
            confirm_timeout_secs: default_confirm_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Settings shared by every layercake command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding one record file per network.
    pub store_dir: PathBuf,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".layercake"),
            networks: BTreeMap::from([(
                DEFAULT_NETWORK.to_string(),
                NetworkConfig::new(DEFAULT_RPC_URL),
            )]),
        }
    }
}

impl Settings {
    /// Path of the per-user configuration file, if the platform has a config directory.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("layercake").join(CONFIG_FILENAME))
    }

    /// Build the provider stack, lowest priority first.
    ///
    /// Missing files are skipped. Environment variables use `__` to address nested keys, e.g.
    /// `LAYERCAKE_NETWORKS__SEPOLIA__RPC_URL`.
    pub fn figment(user_config: Option<&Path>, project_config: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(user_config) = user_config {
            figment = figment.merge(Toml::file(user_config));
        }
        figment
            .merge(Toml::file(project_config))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load settings, reading `config` instead of `./Layercake.toml` when given.
    pub fn load(config: Option<&Path>) -> Result<Self> {
        if let Some(path) = config.filter(|path| !path.exists()) {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let project_config = config.unwrap_or(Path::new(CONFIG_FILENAME));
        let user_config = Self::user_config_path();

        let settings: Settings = Self::figment(user_config.as_deref(), project_config)
            .extract()
            .context("Failed to load settings")?;

        tracing::debug!(
            store_dir = %settings.store_dir.display(),
            networks = settings.networks.len(),
            "Settings loaded"
        );
        Ok(settings)
    }

    /// Look up the configuration of a named network.
    pub fn network(&self, name: &str) -> Result<&NetworkConfig> {
        self.networks.get(name).with_context(|| {
            let known = self.networks.keys().cloned().collect::<Vec<_>>().join(", ");
            format!("Unknown network '{name}' (configured: {known})")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        let dev = settings.network(DEFAULT_NETWORK).expect("Default network should exist");
        assert_eq!(dev.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(dev.confirm_timeout(), Duration::from_secs(120));
        assert_eq!(dev.poll_interval(), Duration::from_secs(1));
        assert_eq!(settings.store_dir, PathBuf::from(".layercake"));
    }

    #[test]
    fn test_project_file_adds_network() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILENAME,
                r#"
                store_dir = "deployments"

                [networks.sepolia]
                rpc_url = "https://sepolia.example.org"
                from = "0x1111111111111111111111111111111111111111"
                gas = 6000000
                "#,
            )?;

            let settings: Settings =
                Settings::figment(None, Path::new(CONFIG_FILENAME)).extract()?;

            assert_eq!(settings.store_dir, PathBuf::from("deployments"));
            assert!(
                settings.networks.contains_key(DEFAULT_NETWORK),
                "Default network should survive the merge"
            );
            let sepolia = &settings.networks["sepolia"];
            assert_eq!(sepolia.from, Some(Address::repeat_byte(0x11)));
            assert_eq!(sepolia.gas, Some(6_000_000));
            assert_eq!(
                sepolia.confirm_timeout_secs, 120,
                "Omitted fields should take their defaults"
            );
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILENAME,
                r#"
                [networks.development]
                rpc_url = "http://localhost:7545"
                "#,
            )?;
            jail.set_env("LAYERCAKE_NETWORKS__DEVELOPMENT__RPC_URL", "http://node:8545");
            jail.set_env("LAYERCAKE_STORE_DIR", "/var/lib/layercake");

            let settings: Settings =
                Settings::figment(None, Path::new(CONFIG_FILENAME)).extract()?;

            assert_eq!(
                settings.networks[DEFAULT_NETWORK].rpc_url,
                "http://node:8545"
            );
            assert_eq!(settings.store_dir, PathBuf::from("/var/lib/layercake"));
            Ok(())
        });
    }

    #[test]
    fn test_user_file_is_overridden_by_project_file() {
        Jail::expect_with(|jail| {
            jail.create_file("user.toml", r#"store_dir = "from-user""#)?;
            jail.create_file(CONFIG_FILENAME, r#"store_dir = "from-project""#)?;

            let settings: Settings =
                Settings::figment(Some(Path::new("user.toml")), Path::new(CONFIG_FILENAME))
                    .extract()?;
            assert_eq!(settings.store_dir, PathBuf::from("from-project"));
            Ok(())
        });
    }

    #[test]
    fn test_unknown_network() {
        let err = Settings::default()
            .network("mainnet")
            .expect_err("Unknown network should fail");
        assert!(err.to_string().contains("development"));
    }

    #[test]
    fn test_missing_explicit_config() {
        let result = Settings::load(Some(Path::new("/nonexistent/Layercake.toml")));
        assert!(result.is_err(), "An explicit missing config should be an error");
    }
}
