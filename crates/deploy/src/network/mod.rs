//! Network capability used by the orchestrator to deploy contracts.
//!
//! The orchestrator never speaks a wire protocol itself. It hands a [`DeployRequest`] to a
//! [`Network`] and waits for the resulting transaction to be confirmed. [`JsonRpcNetwork`] is
//! the Ethereum JSON-RPC implementation.

use std::future::Future;

use alloy_core::primitives::{Address, TxHash};
use serde_json::Value;

use crate::{ArtifactRef, DeployFailure, NetworkFailure, UnitId};

mod artifact;
pub use artifact::ContractArtifact;

mod json_rpc;
pub use json_rpc::JsonRpcNetwork;

pub mod rpc;

/// A single contract deployment to submit.
#[derive(Debug, Clone, Copy)]
pub struct DeployRequest<'a> {
    pub unit: &'a UnitId,
    pub artifact: &'a ArtifactRef,
    /// Constructor arguments, already resolved to concrete values.
    pub args: &'a [Value],
}

/// A submitted, not yet confirmed, deployment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// Address the contract will live at once the transaction is mined.
    pub address: Address,
    pub tx_hash: TxHash,
}

/// Final state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed {
        /// Contract address reported by the receipt, when the network reports one.
        contract_address: Option<Address>,
    },
    Reverted {
        reason: String,
    },
    Timeout,
}

/// Capability to deploy contracts on a target network.
///
/// Implementations perform exactly one attempt per call and never retry a submission.
pub trait Network: Send + Sync {
    /// Submit the deployment transaction for `request`.
    fn submit(
        &self,
        request: DeployRequest<'_>,
    ) -> impl Future<Output = Result<Submission, DeployFailure>> + Send;

    /// Wait for `tx_hash` to be finalized, reverted, or for the wait to time out.
    fn confirm(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<Confirmation, NetworkFailure>> + Send;
}
