//! Ethereum JSON-RPC implementation of [`Network`].

use std::time::Duration;

use alloy_core::primitives::{Address, TxHash, U64};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{
    Confirmation, DeployRequest, Network, Submission,
    artifact::ContractArtifact,
    rpc::{self, RpcError},
};
use crate::{DeployFailure, NetworkConfig, NetworkFailure};

/// Deploys contracts through a node's `eth_sendTransaction`, signing with an account the node
/// manages (a local development chain, or a node with an unlocked account).
#[derive(Debug, Clone)]
pub struct JsonRpcNetwork {
    client: reqwest::Client,
    url: Url,
    from: Address,
    gas: Option<u64>,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

/// Subset of a transaction receipt needed to judge a deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    status: Option<U64>,
    contract_address: Option<Address>,
}

impl Receipt {
    fn confirmation(&self) -> Confirmation {
        match self.status {
            Some(status) if status.is_zero() => Confirmation::Reverted {
                reason: "transaction reverted (status 0x0)".to_string(),
            },
            _ => Confirmation::Confirmed {
                contract_address: self.contract_address,
            },
        }
    }
}

/// One receipt lookup that did not produce a receipt.
#[derive(Debug)]
enum ReceiptPoll {
    NotMined,
    Failed(NetworkFailure),
}

impl ReceiptPoll {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotMined | Self::Failed(NetworkFailure::Transport(_))
        )
    }
}

impl JsonRpcNetwork {
    /// Connect to the node described by `config`.
    ///
    /// The deploying account is `config.from` when set, otherwise the first account reported by
    /// `eth_accounts`.
    pub async fn connect(config: &NetworkConfig) -> anyhow::Result<Self> {
        let url = Url::parse(&config.rpc_url)
            .with_context(|| format!("Invalid RPC URL: {}", config.rpc_url))?;
        let client =
            rpc::create_client(rpc::DEFAULT_TIMEOUT).context("Failed to create HTTP client")?;

        let chain_id: U64 = rpc::json_rpc_call(&client, url.as_str(), "eth_chainId", vec![])
            .await
            .with_context(|| format!("Failed to reach node at {url}"))?;

        let from = match config.from {
            Some(from) => from,
            None => {
                let accounts: Vec<Address> =
                    rpc::json_rpc_call(&client, url.as_str(), "eth_accounts", vec![])
                        .await
                        .context("Failed to list node accounts")?;
                accounts.first().copied().with_context(|| {
                    format!("Node at {url} manages no accounts and no deployer address is configured")
                })?
            }
        };

        tracing::info!(
            rpc_url = %url,
            chain_id = chain_id.to::<u64>(),
            from = %from,
            "Connected to network"
        );

        Ok(Self {
            client,
            url,
            from,
            gas: config.gas,
            confirm_timeout: config.confirm_timeout(),
            poll_interval: config.poll_interval(),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        rpc::json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }

    async fn fetch_receipt(&self, tx_hash: TxHash) -> Result<Receipt, ReceiptPoll> {
        let receipt: Option<Receipt> = self
            .call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await
            .map_err(|e| ReceiptPoll::Failed(network_failure(e)))?;
        receipt.ok_or(ReceiptPoll::NotMined)
    }
}

impl Network for JsonRpcNetwork {
    async fn submit(&self, request: DeployRequest<'_>) -> Result<Submission, DeployFailure> {
        let artifact = ContractArtifact::load(&request.artifact.path)?;
        let data = artifact.deploy_data(request.args)?;

        let nonce: U64 = self
            .call(
                "eth_getTransactionCount",
                vec![json!(self.from), json!("pending")],
            )
            .await
            .map_err(classify_submit_error)?;
        let nonce = nonce.to::<u64>();

        let mut tx = json!({
            "from": self.from,
            "data": data,
            "nonce": format!("{nonce:#x}"),
        });
        if let Some(gas) = self.gas {
            tx["gas"] = json!(format!("{gas:#x}"));
        }

        tracing::debug!(unit = %request.unit, nonce, bytes = data.len(), "Sending deployment transaction");

        let tx_hash: TxHash = self
            .call("eth_sendTransaction", vec![tx])
            .await
            .map_err(classify_submit_error)?;

        Ok(Submission {
            address: self.from.create(nonce),
            tx_hash,
        })
    }

    async fn confirm(&self, tx_hash: TxHash) -> Result<Confirmation, NetworkFailure> {
        let attempts = poll_attempts(self.confirm_timeout, self.poll_interval);
        let backoff = ConstantBuilder::default()
            .with_delay(self.poll_interval)
            .with_max_times(attempts);

        let this = self;
        let result = (move || async move { this.fetch_receipt(tx_hash).await })
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(ReceiptPoll::is_retryable)
            .notify(|poll, _| {
                if let ReceiptPoll::Failed(e) = poll {
                    tracing::debug!(tx_hash = %tx_hash, error = %e, "Receipt lookup failed, retrying");
                }
            })
            .await;

        match result {
            Ok(receipt) => Ok(receipt.confirmation()),
            Err(ReceiptPoll::NotMined) => Ok(Confirmation::Timeout),
            Err(ReceiptPoll::Failed(e)) => Err(e),
        }
    }
}

/// Number of receipt lookups to retry before giving up on a transaction.
fn poll_attempts(timeout: Duration, interval: Duration) -> usize {
    if interval.is_zero() {
        return 1;
    }
    let attempts = timeout.as_millis().div_ceil(interval.as_millis());
    usize::try_from(attempts).unwrap_or(usize::MAX).max(1)
}

fn network_failure(err: RpcError) -> NetworkFailure {
    match err {
        RpcError::Transport { .. } => NetworkFailure::Transport(err.to_string()),
        RpcError::Response { .. } | RpcError::Decode { .. } => NetworkFailure::Rpc(err.to_string()),
    }
}

/// Map a failed submission call to the failure the orchestrator reports.
fn classify_submit_error(err: RpcError) -> DeployFailure {
    let RpcError::Response { message, .. } = &err else {
        return network_failure(err).into();
    };

    let lower = message.to_lowercase();
    if lower.contains("revert") {
        DeployFailure::Reverted {
            reason: message.clone(),
        }
    } else if lower.contains("insufficient funds") {
        NetworkFailure::InsufficientFunds(message.clone()).into()
    } else if lower.contains("nonce") || lower.contains("already known") {
        NetworkFailure::NonceConflict(message.clone()).into()
    } else {
        network_failure(err).into()
    }
}
