use std::{collections::BTreeMap, path::Path};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::{
    DeploymentRecord, FileStore, JsonRpcNetwork, Manifest, Orchestrator, RunOptions, RunReport,
    Settings, UnitId,
};

/// Deploys a manifest to a named network, using the record store configured in [`Settings`].
#[derive(Debug, Clone)]
pub struct Deployer {
    pub settings: Settings,
    /// Name of the target network in `settings.networks`.
    pub network: String,
    pub manifest: Manifest,
    pub options: RunOptions,
}

impl Deployer {
    pub fn new(settings: Settings, network: impl Into<String>, manifest: Manifest) -> Self {
        Self {
            settings,
            network: network.into(),
            manifest,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store_dir(&self) -> &Path {
        &self.settings.store_dir
    }

    /// Open the record store of the target network, locking it for this process.
    pub fn open_store(&self) -> Result<FileStore> {
        FileStore::open(self.store_dir(), &self.network).with_context(|| {
            format!(
                "Failed to open record store for network '{}' in {}",
                self.network,
                self.store_dir().display()
            )
        })
    }

    /// Deploy every unit of the manifest that is not deployed yet.
    ///
    /// Ctrl+C stops the run once the unit being deployed is settled.
    pub async fn deploy(&self) -> Result<RunReport> {
        let network_config = self.settings.network(&self.network)?;

        tracing::info!(
            network = %self.network,
            rpc_url = %network_config.rpc_url,
            units = self.manifest.units().len(),
            "Starting deployment..."
        );

        let store = self.open_store()?;
        let network = JsonRpcNetwork::connect(network_config)
            .await
            .with_context(|| format!("Failed to connect to network '{}'", self.network))?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current unit");
                let _ = cancel_tx.send(true);
            }
        });

        let mut orchestrator = Orchestrator::new(network, store)
            .with_options(self.options)
            .with_cancel(cancel_rx);
        let report = orchestrator.run(&self.manifest).await;
        interrupt.abort();

        report.context("Deployment run aborted")
    }

    /// Records of the target network, read without taking the store lock.
    ///
    /// The network must be one the settings configure.
    pub fn records(&self) -> Result<BTreeMap<UnitId, DeploymentRecord>> {
        self.settings.network(&self.network)?;
        FileStore::load_records(self.store_dir(), &self.network).with_context(|| {
            format!(
                "Failed to read records for network '{}' from {}",
                self.network,
                self.store_dir().display()
            )
        })
    }

    /// Environment variable assignments for every deployed unit, in manifest order.
    pub fn env_exports(&self) -> Result<Vec<(String, Address)>> {
        let records = self.records()?;
        Ok(self
            .manifest
            .units()
            .iter()
            .filter_map(|unit| {
                let address = records.get(&unit.id)?.address()?;
                Some((env_var_name(&unit.id), address))
            })
            .collect())
    }
}

/// Name of the environment variable holding a unit's address.
///
/// `FarmerProcessor` becomes `FARMER_PROCESSOR_CONTRACT_ADDRESS`.
pub fn env_var_name(unit: &str) -> String {
    let chars: Vec<char> = unit.chars().collect();
    let mut name = String::with_capacity(unit.len() + 20);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !name.is_empty() && !name.ends_with('_') {
                name.push('_');
            }
            continue;
        }

        if c.is_ascii_uppercase() && i > 0 && !name.is_empty() && !name.ends_with('_') {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                name.push('_');
            }
        }
        name.push(c.to_ascii_uppercase());
    }

    format!("{}_CONTRACT_ADDRESS", name.trim_end_matches('_'))
}
