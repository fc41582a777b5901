use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::DeploymentUnit;

/// Inputs that, when changed, make an existing deployment of a unit stale.
///
/// A unit is identified by its artifact (the file digest when known, otherwise its path) and its
/// fully resolved constructor arguments. When a dependency is redeployed at a new address, the
/// resolved arguments of its dependents change and so do their fingerprints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFingerprint<'a> {
    unit: &'a str,
    artifact: String,
    args: &'a [Value],
}

impl<'a> UnitFingerprint<'a> {
    pub fn new(unit: &'a DeploymentUnit, args: &'a [Value]) -> Self {
        let artifact = match &unit.artifact.digest {
            Some(digest) => format!("sha256:{digest}"),
            None => format!("path:{}", unit.artifact.path.display()),
        };
        Self {
            unit: unit.id.as_str(),
            artifact,
            args,
        }
    }

    /// Compute a SHA-256 hash of the fingerprint inputs.
    ///
    /// The hash is deterministic: fields are fed in a fixed order, each terminated by a NUL byte,
    /// and arguments use their compact JSON rendering.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.unit.as_bytes());
        hasher.update([0]);
        hasher.update(self.artifact.as_bytes());
        hasher.update([0]);
        for arg in self.args {
            hasher.update(arg.to_string().as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }
}
