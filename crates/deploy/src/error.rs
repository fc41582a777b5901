//! Error types for planning and running deployments.
//!
//! Failures that abort a whole run (a dependency cycle, an invalid manifest, a broken record
//! store) are grouped under [`DeployError`]. Failures scoped to a single unit
//! ([`DeployFailure`], [`UnresolvedDependencyError`]) are reported as outcomes of the run
//! instead, so independent units keep deploying.

use std::path::PathBuf;

use alloy_core::primitives::TxHash;
use thiserror::Error;

use crate::UnitId;

/// The dependency graph derived from the manifest contains a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle detected between units: {}", join_ids(.members))]
pub struct CycleError {
    /// Units on the cycle, in declaration order.
    pub members: Vec<UnitId>,
}

/// The manifest declares an invalid set of units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("unit declared at position {index} has an empty id")]
    EmptyId { index: usize },
    #[error("unit '{0}' is declared more than once")]
    DuplicateUnit(UnitId),
}

/// Why a dependency reference could not be turned into an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UnresolvedReason {
    #[strum(serialize = "is not declared in the manifest")]
    Missing,
    #[strum(serialize = "failed to deploy")]
    Failed,
    #[strum(serialize = "was not deployed because one of its own dependencies is unresolved")]
    Blocked,
}

/// A unit references a dependency whose address is not available.
///
/// Raised before any network call is made for the unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unit '{unit}' depends on '{dependency}', which {reason}")]
pub struct UnresolvedDependencyError {
    pub unit: UnitId,
    pub dependency: UnitId,
    pub reason: UnresolvedReason,
}

/// A submission or confirmation could not be completed by the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkFailure {
    #[error("timed out waiting for confirmation of transaction {tx_hash}")]
    Timeout { tx_hash: TxHash },
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("nonce conflict: {0}")]
    NonceConflict(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// A contract artifact could not be turned into deployment calldata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    #[error("failed to read artifact {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("failed to parse artifact: {0}")]
    Parse(String),
    #[error("artifact has no bytecode (abstract contract or interface?)")]
    EmptyBytecode,
    #[error("artifact bytecode contains unlinked library placeholders")]
    UnlinkedBytecode,
    #[error("invalid bytecode hex: {0}")]
    InvalidBytecode(String),
    #[error("constructor takes {expected} argument(s), {found} given")]
    ArgumentCount { expected: usize, found: usize },
    #[error("cannot use {value} as constructor argument of type {ty}: {message}")]
    Argument {
        ty: String,
        value: String,
        message: String,
    },
    #[error("failed to encode constructor arguments: {0}")]
    Encode(String),
}

/// A single deployment attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployFailure {
    #[error(transparent)]
    Network(#[from] NetworkFailure),
    #[error("constructor reverted: {reason}")]
    Reverted { reason: String },
    #[error("invalid artifact: {0}")]
    Artifact(#[from] ArtifactError),
}

/// The record store could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on record store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse record store {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("record store {path} has version {found}, expected {expected}")]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("record store {path} is locked by another run")]
    Locked { path: PathBuf },
    #[error("network name '{name}' cannot name a record store file")]
    InvalidNetwork { name: String },
}

/// Errors that abort a deployment run.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn join_ids(ids: &[UnitId]) -> String {
    ids.iter()
        .map(UnitId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
