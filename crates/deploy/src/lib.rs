//! layercake-deploy - Dependency-aware deployment of interdependent contracts.
//!
//! A [`Manifest`] declares deployment units. A unit's constructor arguments may reference other
//! units, which makes it depend on them. The [`Orchestrator`] deploys units in dependency order,
//! substitutes the addresses of deployed dependencies into the arguments of their dependents,
//! and records every outcome in a [`RecordStore`] so that running it again skips what is done.

mod config;
pub use config::{
    CONFIG_FILENAME, DEFAULT_NETWORK, DEFAULT_RPC_URL, ENV_PREFIX, NetworkConfig, Settings,
};

mod deployer;
pub use deployer::{Deployer, env_var_name};

mod error;
pub use error::{
    ArtifactError, CycleError, DeployError, DeployFailure, ManifestError, NetworkFailure,
    StoreError, UnresolvedDependencyError, UnresolvedReason,
};

mod fingerprint;
pub use fingerprint::UnitFingerprint;

mod fs;

mod manifest;
pub use manifest::{ArgSpec, ArtifactRef, DeploymentUnit, Manifest, ManifestFormat, UnitId};

pub mod network;
pub use network::{
    Confirmation, ContractArtifact, DeployRequest, JsonRpcNetwork, Network, Submission,
};

mod orchestrator;
pub use orchestrator::{DeployOutcome, Orchestrator, RunOptions, RunReport, UnitOutcome};

mod plan;
pub use plan::{DependencyGraph, resolve_order};

mod record;
pub use record::{DeploymentRecord, DeploymentStatus};

mod store;
pub use store::{FileStore, MemoryStore, RecordStore};
