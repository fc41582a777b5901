//! Per-unit deployment records.

use alloy_core::primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::UnitId;

/// State of a unit's deployment.
///
/// The address exists only on `Deployed` and the error only on `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Attempt started. `tx_hash` is set once the transaction has been submitted.
    Pending {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tx_hash: Option<TxHash>,
    },
    Deployed {
        address: Address,
        tx_hash: TxHash,
    },
    Failed {
        error: String,
    },
}

impl DeploymentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Deployed { .. } => "deployed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Outcome of a unit's most recent deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub unit: UnitId,
    pub status: DeploymentStatus,
    /// Constructor arguments with every dependency reference replaced by its address.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Fingerprint of the artifact and arguments this attempt used.
    pub fingerprint: String,
    /// Unix timestamp (seconds) of the last status change.
    pub updated_at: i64,
    /// Address of the earlier deployment this record replaces. A redeploy that fails keeps it,
    /// so the contract still live is not forgotten.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<Address>,
}

impl DeploymentRecord {
    /// A fresh `Pending` record for an attempt that has not been submitted yet.
    pub fn pending(unit: UnitId, args: Vec<Value>, fingerprint: String) -> Self {
        Self {
            unit,
            status: DeploymentStatus::Pending { tx_hash: None },
            args,
            fingerprint,
            updated_at: chrono::Utc::now().timestamp(),
            replaces: None,
        }
    }

    /// Mark the attempt as replacing the deployment at `address`.
    pub fn replacing(mut self, address: Option<Address>) -> Self {
        self.replaces = address;
        self
    }

    /// Move the record to a new status, refreshing its timestamp.
    pub fn with_status(mut self, status: DeploymentStatus) -> Self {
        self.status = status;
        self.updated_at = chrono::Utc::now().timestamp();
        self
    }

    pub fn is_deployed(&self) -> bool {
        matches!(self.status, DeploymentStatus::Deployed { .. })
    }

    pub fn address(&self) -> Option<Address> {
        match self.status {
            DeploymentStatus::Deployed { address, .. } => Some(address),
            _ => None,
        }
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        match self.status {
            DeploymentStatus::Pending { tx_hash } => tx_hash,
            DeploymentStatus::Deployed { tx_hash, .. } => Some(tx_hash),
            DeploymentStatus::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            DeploymentStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_accessors() {
        let record = DeploymentRecord::pending(UnitId::from("A"), vec![], "f".into());
        assert_eq!(record.address(), None);
        assert_eq!(record.tx_hash(), None);
        assert!(!record.is_deployed());

        let tx_hash = TxHash::repeat_byte(0x11);
        let submitted = record.clone().with_status(DeploymentStatus::Pending {
            tx_hash: Some(tx_hash),
        });
        assert_eq!(submitted.tx_hash(), Some(tx_hash));
        assert_eq!(submitted.address(), None);

        let address = Address::repeat_byte(0xaa);
        let deployed = record
            .clone()
            .with_status(DeploymentStatus::Deployed { address, tx_hash });
        assert!(deployed.is_deployed());
        assert_eq!(deployed.address(), Some(address));
        assert_eq!(deployed.error(), None);

        let failed = record.with_status(DeploymentStatus::Failed {
            error: "reverted".into(),
        });
        assert_eq!(failed.error(), Some("reverted"));
        assert_eq!(failed.address(), None);
        assert_eq!(failed.status.label(), "failed");
    }

    #[test]
    fn test_record_json_shape() {
        let record = DeploymentRecord {
            unit: UnitId::from("FarmerProcessor"),
            status: DeploymentStatus::Deployed {
                address: Address::repeat_byte(0x11),
                tx_hash: TxHash::repeat_byte(0x01),
            },
            args: vec![json!(1)],
            fingerprint: "abc".into(),
            updated_at: 1737316800,
            replaces: None,
        };

        let value = serde_json::to_value(&record).expect("Record should serialize");
        assert_eq!(value["unit"], "FarmerProcessor");
        assert_eq!(value["status"]["state"], "deployed");
        assert_eq!(
            value["status"]["address"],
            "0x1111111111111111111111111111111111111111"
        );

        let back: DeploymentRecord =
            serde_json::from_value(value).expect("Record should deserialize");
        assert_eq!(back, record);
    }

    #[test]
    fn test_pending_without_hash_omits_field() {
        let record = DeploymentRecord::pending(UnitId::from("A"), vec![], "f".into());
        let value = serde_json::to_value(&record).expect("Record should serialize");
        assert_eq!(value["status"], json!({ "state": "pending" }));
        assert!(
            value.get("replaces").is_none(),
            "A first deployment replaces nothing"
        );
    }

    #[test]
    fn test_replaced_address_survives_status_changes() {
        let previous = Address::repeat_byte(0x22);
        let record = DeploymentRecord::pending(UnitId::from("A"), vec![], "f".into())
            .replacing(Some(previous))
            .with_status(DeploymentStatus::Failed {
                error: "reverted".into(),
            });
        assert_eq!(record.replaces, Some(previous));

        let value = serde_json::to_value(&record).expect("Record should serialize");
        assert_eq!(value["replaces"], "0x2222222222222222222222222222222222222222");
    }
}
