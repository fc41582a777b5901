//! Ordered, dependency-aware deployment of a manifest.
//!
//! [`Orchestrator::run`] walks the units in dependency order. Each unit is skipped when its
//! record already shows it deployed, otherwise its dependency references are replaced by the
//! addresses of the units they name and it is deployed through the [`Network`]. Every status
//! change is persisted to the [`RecordStore`] before the next network call, so an interrupted
//! run can be resumed by running again.
//!
//! A unit that fails stops only the units that (transitively) depend on it; independent units
//! keep deploying.

use std::collections::{BTreeMap, HashMap, HashSet};

use alloy_core::primitives::{Address, TxHash};
use derive_more::Display;
use serde_json::Value;
use tokio::sync::watch;

use crate::{
    ArgSpec, DeployError, DeployFailure, DeploymentRecord, DeploymentStatus, DeploymentUnit,
    Manifest, NetworkFailure, RecordStore, StoreError, UnitFingerprint, UnitId,
    UnresolvedDependencyError, UnresolvedReason,
    network::{Confirmation, DeployRequest, Network},
    plan,
};

/// Knobs for a deployment run.
///
/// A redeployed unit's record keeps the address it replaces in
/// [`DeploymentRecord::replaces`], also when the redeploy fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Deploy every unit again, ignoring existing deployments.
    pub redeploy: bool,
    /// Redeploy units whose artifact or resolved arguments changed since they were deployed.
    pub redeploy_stale: bool,
}

/// A confirmed deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("{address} (tx {tx_hash})")]
pub struct DeployOutcome {
    pub address: Address,
    pub tx_hash: TxHash,
}

/// What a run did with one unit.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum UnitOutcome {
    /// Already deployed by a previous run.
    #[display("already deployed at {address}{}", if *stale { " (stale)" } else { "" })]
    Skipped { address: Address, stale: bool },
    #[display("deployed at {_0}")]
    Deployed(DeployOutcome),
    #[display("failed: {_0}")]
    Failed(DeployFailure),
    #[display("not attempted: {_0}")]
    Unresolved(UnresolvedDependencyError),
    #[display("cancelled")]
    Cancelled,
}

impl UnitOutcome {
    /// Whether the unit ended without a deployment.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Skipped { .. } | Self::Deployed(_))
    }

    /// Address of the unit, when it is deployed.
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::Skipped { address, .. } => Some(*address),
            Self::Deployed(outcome) => Some(outcome.address),
            _ => None,
        }
    }
}

/// Result of [`Orchestrator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Outcome of every unit, in deployment order.
    pub outcomes: Vec<(UnitId, UnitOutcome)>,
    /// Record of every unit that has one after the run, keyed by unit id.
    pub records: BTreeMap<UnitId, DeploymentRecord>,
}

impl RunReport {
    /// Whether every unit ended up deployed.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| !outcome.is_failure())
    }

    /// First unit, in deployment order, that did not end up deployed.
    pub fn first_failure(&self) -> Option<(&UnitId, &UnitOutcome)> {
        self.outcomes
            .iter()
            .find(|(_, outcome)| outcome.is_failure())
            .map(|(id, outcome)| (id, outcome))
    }

    pub fn outcome(&self, unit: &str) -> Option<&UnitOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id.as_str() == unit)
            .map(|(_, outcome)| outcome)
    }

    pub fn record(&self, unit: &str) -> Option<&DeploymentRecord> {
        self.records.get(unit)
    }

    pub fn was_cancelled(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, outcome)| matches!(outcome, UnitOutcome::Cancelled))
    }
}

/// Addresses and failures accumulated while walking the plan.
#[derive(Debug, Default)]
struct Ledger {
    addresses: HashMap<UnitId, Address>,
    failed: HashSet<UnitId>,
}

impl Ledger {
    fn record(&mut self, unit: &UnitId, outcome: &UnitOutcome) {
        if let Some(address) = outcome.address() {
            self.addresses.insert(unit.clone(), address);
        } else if matches!(outcome, UnitOutcome::Failed(_)) {
            self.failed.insert(unit.clone());
        }
    }

    /// Replace every dependency reference of `unit` by the address of the unit it names.
    fn resolve_args(
        &self,
        unit: &DeploymentUnit,
        manifest: &Manifest,
    ) -> Result<Vec<Value>, UnresolvedDependencyError> {
        unit.args
            .iter()
            .map(|arg| match arg {
                ArgSpec::Literal(value) => Ok(value.clone()),
                ArgSpec::Ref { unit: dependency } => match self.addresses.get(dependency) {
                    Some(address) => Ok(Value::String(address.to_string())),
                    None => Err(UnresolvedDependencyError {
                        unit: unit.id.clone(),
                        dependency: dependency.clone(),
                        reason: self.unresolved_reason(dependency, manifest),
                    }),
                },
            })
            .collect()
    }

    fn unresolved_reason(&self, dependency: &UnitId, manifest: &Manifest) -> UnresolvedReason {
        if !manifest.contains(dependency) {
            UnresolvedReason::Missing
        } else if self.failed.contains(dependency) {
            UnresolvedReason::Failed
        } else {
            UnresolvedReason::Blocked
        }
    }
}

/// Deploys manifests against one network, recording outcomes in one store.
#[derive(Debug)]
pub struct Orchestrator<N, S> {
    network: N,
    store: S,
    options: RunOptions,
    cancel: Option<watch::Receiver<bool>>,
}

impl<N: Network, S: RecordStore> Orchestrator<N, S> {
    pub fn new(network: N, store: S) -> Self {
        Self {
            network,
            store,
            options: RunOptions::default(),
            cancel: None,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop the run before the next unit once `cancel` holds `true`.
    ///
    /// A unit that is already being deployed is always finished first.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Order `units` so that every unit comes after the units it depends on.
    pub fn resolve_order<'m>(
        &self,
        units: &'m [DeploymentUnit],
    ) -> Result<Vec<&'m DeploymentUnit>, DeployError> {
        Ok(plan::resolve_order(units)?)
    }

    /// Perform exactly one deployment attempt of `unit` with already resolved arguments.
    ///
    /// Nothing is persisted and nothing is retried.
    pub async fn deploy(
        &self,
        unit: &DeploymentUnit,
        args: &[Value],
    ) -> Result<DeployOutcome, DeployFailure> {
        let submission = self
            .network
            .submit(DeployRequest {
                unit: &unit.id,
                artifact: &unit.artifact,
                args,
            })
            .await?;
        self.await_confirmation(submission.tx_hash, Some(submission.address))
            .await
    }

    /// Deploy every unit of `manifest` that is not deployed yet.
    ///
    /// Only a dependency cycle or a record store failure aborts the run. Per-unit failures are
    /// reported in the returned [`RunReport`].
    pub async fn run(&mut self, manifest: &Manifest) -> Result<RunReport, DeployError> {
        let order = plan::resolve_order(manifest.units())?;
        tracing::info!(units = order.len(), "Deployment plan resolved");

        let mut ledger = Ledger::default();
        let mut outcomes = Vec::with_capacity(order.len());

        for unit in &order {
            let outcome = if self.is_cancelled() {
                UnitOutcome::Cancelled
            } else {
                self.run_unit(unit, manifest, &ledger).await?
            };
            ledger.record(&unit.id, &outcome);
            outcomes.push((unit.id.clone(), outcome));
        }

        let mut records = BTreeMap::new();
        for unit in &order {
            if let Some(record) = self.store.get(&unit.id)? {
                records.insert(unit.id.clone(), record);
            }
        }

        let report = RunReport { outcomes, records };
        match report.first_failure() {
            None => tracing::info!("All units deployed"),
            Some((unit, outcome)) => {
                tracing::warn!(unit = %unit, outcome = %outcome, "Deployment run incomplete")
            }
        }
        Ok(report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|cancel| *cancel.borrow())
    }

    async fn run_unit(
        &mut self,
        unit: &DeploymentUnit,
        manifest: &Manifest,
        ledger: &Ledger,
    ) -> Result<UnitOutcome, StoreError> {
        let args = match ledger.resolve_args(unit, manifest) {
            Ok(args) => args,
            Err(e) => {
                tracing::error!(unit = %unit.id, dependency = %e.dependency, "{e}");
                return Ok(UnitOutcome::Unresolved(e));
            }
        };
        let fingerprint = UnitFingerprint::new(unit, &args).compute_hash();

        let mut replaces = None;
        if let Some(record) = self.store.get(&unit.id)? {
            replaces = record.address().or(record.replaces);
            match record.status {
                DeploymentStatus::Deployed { address, .. } if !self.options.redeploy => {
                    let stale = record.fingerprint != fingerprint;
                    if !stale {
                        tracing::info!(unit = %unit.id, address = %address, "Unit already deployed, skipping");
                        return Ok(UnitOutcome::Skipped { address, stale });
                    }
                    if !self.options.redeploy_stale {
                        tracing::warn!(
                            unit = %unit.id,
                            address = %address,
                            "Unit changed since it was deployed, keeping the existing deployment"
                        );
                        return Ok(UnitOutcome::Skipped { address, stale });
                    }
                    tracing::info!(unit = %unit.id, previous = %address, "Unit changed, redeploying");
                }
                DeploymentStatus::Pending {
                    tx_hash: Some(tx_hash),
                } => {
                    if record.fingerprint == fingerprint {
                        tracing::info!(unit = %unit.id, tx_hash = %tx_hash, "Resuming confirmation of submitted transaction");
                        let outcome = self.await_confirmation(tx_hash, None).await;
                        return self.finish(record, outcome);
                    }
                    tracing::warn!(
                        unit = %unit.id,
                        tx_hash = %tx_hash,
                        "Unit changed after its transaction was submitted, deploying again"
                    );
                }
                _ => {}
            }
        }

        self.attempt(unit, args, fingerprint, replaces).await
    }

    /// Deploy `unit`, persisting its record before submission, after submission, and once the
    /// transaction is settled.
    async fn attempt(
        &mut self,
        unit: &DeploymentUnit,
        args: Vec<Value>,
        fingerprint: String,
        replaces: Option<Address>,
    ) -> Result<UnitOutcome, StoreError> {
        let record =
            DeploymentRecord::pending(unit.id.clone(), args, fingerprint).replacing(replaces);
        self.store.put(record.clone())?;

        tracing::info!(unit = %unit.id, artifact = %unit.artifact.path.display(), "Deploying unit");
        let request = DeployRequest {
            unit: &unit.id,
            artifact: &unit.artifact,
            args: &record.args,
        };
        let submission = match self.network.submit(request).await {
            Ok(submission) => submission,
            Err(failure) => return self.finish(record, Err(failure)),
        };

        let record = record.with_status(DeploymentStatus::Pending {
            tx_hash: Some(submission.tx_hash),
        });
        self.store.put(record.clone())?;
        tracing::debug!(unit = %unit.id, tx_hash = %submission.tx_hash, "Deployment transaction submitted");

        let outcome = self
            .await_confirmation(submission.tx_hash, Some(submission.address))
            .await;
        self.finish(record, outcome)
    }

    async fn await_confirmation(
        &self,
        tx_hash: TxHash,
        expected_address: Option<Address>,
    ) -> Result<DeployOutcome, DeployFailure> {
        match self.network.confirm(tx_hash).await? {
            Confirmation::Confirmed { contract_address } => contract_address
                .or(expected_address)
                .map(|address| DeployOutcome { address, tx_hash })
                .ok_or_else(|| {
                    NetworkFailure::Rpc(format!(
                        "receipt of transaction {tx_hash} carries no contract address"
                    ))
                    .into()
                }),
            Confirmation::Reverted { reason } => Err(DeployFailure::Reverted { reason }),
            Confirmation::Timeout => Err(NetworkFailure::Timeout { tx_hash }.into()),
        }
    }

    /// Persist the settled state of an attempt.
    ///
    /// Once a transaction is submitted, only a confirmed deployment or a revert settles the
    /// record. Any network failure past that point (timeout, transport, RPC) leaves it pending
    /// on its transaction, so the next run confirms it instead of submitting a duplicate.
    fn finish(
        &mut self,
        record: DeploymentRecord,
        outcome: Result<DeployOutcome, DeployFailure>,
    ) -> Result<UnitOutcome, StoreError> {
        let unit = record.unit.clone();
        match outcome {
            Ok(deployed) => {
                self.store.put(record.with_status(DeploymentStatus::Deployed {
                    address: deployed.address,
                    tx_hash: deployed.tx_hash,
                }))?;
                tracing::info!(
                    unit = %unit,
                    address = %deployed.address,
                    tx_hash = %deployed.tx_hash,
                    "Unit deployed"
                );
                Ok(UnitOutcome::Deployed(deployed))
            }
            Err(failure @ DeployFailure::Network(_)) if record.tx_hash().is_some() => {
                tracing::error!(
                    unit = %unit,
                    tx_hash = ?record.tx_hash(),
                    error = %failure,
                    "Unit deployment not confirmed, transaction kept pending"
                );
                Ok(UnitOutcome::Failed(failure))
            }
            Err(failure) => {
                self.store.put(record.with_status(DeploymentStatus::Failed {
                    error: failure.to_string(),
                }))?;
                tracing::error!(unit = %unit, error = %failure, "Unit deployment failed");
                Ok(UnitOutcome::Failed(failure))
            }
        }
    }
}
