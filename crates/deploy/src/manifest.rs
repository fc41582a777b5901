//! Deployment manifest: the ordered list of units to deploy.
//!
//! A manifest is written in TOML (or JSON) and declares, for each unit, the compiled artifact
//! to deploy and its constructor arguments. An argument is either a literal value or a
//! reference to another unit, which is replaced by that unit's deployed address at run time.
//!
//! ```toml
//! [[units]]
//! id = "FarmerProcessor"
//! artifact = "build/contracts/FarmerProcessor.json"
//!
//! [[units]]
//! id = "FarmerProcessorDelegate"
//! artifact = "build/contracts/FarmerProcessorDelegate.json"
//! args = [{ ref = "FarmerProcessor" }]
//! ```

use std::{
    borrow::Borrow,
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::ManifestError;

/// Unique name of a deployment unit.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    Deref,
)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for UnitId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A constructor argument descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgSpec {
    /// The deployed address of another unit.
    Ref {
        #[serde(rename = "ref")]
        unit: UnitId,
    },
    /// A literal value, passed through as-is.
    Literal(Value),
}

impl ArgSpec {
    pub fn reference(unit: impl Into<UnitId>) -> Self {
        Self::Ref { unit: unit.into() }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// The unit this argument references, if any.
    pub fn dependency(&self) -> Option<&UnitId> {
        match self {
            Self::Ref { unit } => Some(unit),
            Self::Literal(_) => None,
        }
    }
}

/// Reference to a compiled contract artifact.
///
/// The orchestrator never looks inside the artifact; only the network implementation does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Path to the artifact file (ABI + bytecode).
    pub path: PathBuf,
    /// SHA-256 of the artifact file, when it was readable at manifest load time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ArtifactRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            digest: None,
        }
    }

    /// Compute the digest of the artifact file if it exists.
    fn with_digest_from_disk(mut self) -> Result<Self> {
        if self.path.is_file() {
            let bytes = std::fs::read(&self.path)
                .with_context(|| format!("Failed to read artifact {}", self.path.display()))?;
            self.digest = Some(hex::encode(Sha256::digest(&bytes)));
        } else {
            tracing::debug!(path = %self.path.display(), "Artifact not found at load time, no digest recorded");
        }
        Ok(self)
    }
}

/// A single deployable contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentUnit {
    pub id: UnitId,
    pub artifact: ArtifactRef,
    pub args: Vec<ArgSpec>,
}

impl DeploymentUnit {
    pub fn new(id: impl Into<UnitId>, artifact: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            artifact: ArtifactRef::new(artifact),
            args: Vec::new(),
        }
    }

    /// Append a constructor argument.
    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    /// Units this unit depends on, in argument order (may repeat).
    pub fn dependencies(&self) -> impl Iterator<Item = &UnitId> {
        self.args.iter().filter_map(ArgSpec::dependency)
    }
}

/// Manifest file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ManifestFormat {
    Toml,
    Json,
}

impl ManifestFormat {
    /// Pick the format from the file extension, defaulting to TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// On-disk shape of a manifest.
#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    units: Vec<UnitDecl>,
}

#[derive(Debug, Deserialize)]
struct UnitDecl {
    id: String,
    artifact: PathBuf,
    #[serde(default)]
    args: Vec<ArgSpec>,
}

/// A validated, ordered set of deployment units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    units: Vec<DeploymentUnit>,
}

impl Manifest {
    /// Build a manifest, rejecting empty or duplicate unit ids.
    pub fn new(units: Vec<DeploymentUnit>) -> Result<Self, ManifestError> {
        let mut seen = HashSet::with_capacity(units.len());
        for (index, unit) in units.iter().enumerate() {
            if unit.id.trim().is_empty() {
                return Err(ManifestError::EmptyId { index });
            }
            if !seen.insert(unit.id.as_str()) {
                return Err(ManifestError::DuplicateUnit(unit.id.clone()));
            }
        }
        Ok(Self { units })
    }

    /// Units in declaration order.
    pub fn units(&self) -> &[DeploymentUnit] {
        &self.units
    }

    pub fn get(&self, id: &str) -> Option<&DeploymentUnit> {
        self.units.iter().find(|unit| unit.id.as_str() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Parse a manifest from a string.
    ///
    /// Relative artifact paths are resolved against `base_dir`.
    pub fn parse(content: &str, format: ManifestFormat, base_dir: &Path) -> Result<Self> {
        let file: ManifestFile = match format {
            ManifestFormat::Toml => {
                toml::from_str(content).context("Failed to parse manifest as TOML")?
            }
            ManifestFormat::Json => {
                serde_json::from_str(content).context("Failed to parse manifest as JSON")?
            }
        };

        let units = file
            .units
            .into_iter()
            .map(|decl| {
                let path = if decl.artifact.is_absolute() {
                    decl.artifact
                } else {
                    base_dir.join(decl.artifact)
                };
                Ok(DeploymentUnit {
                    id: UnitId(decl.id),
                    artifact: ArtifactRef::new(path).with_digest_from_disk()?,
                    args: decl.args,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(units)?)
    }

    /// Load a manifest from a file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest from {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let manifest = Self::parse(&content, ManifestFormat::from_path(path), base_dir)
            .with_context(|| format!("Invalid manifest {}", path.display()))?;
        tracing::info!(path = %path.display(), units = manifest.units.len(), "Manifest loaded");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempdir::TempDir;

    const FARMER_MANIFEST: &str = r#"
        [[units]]
        id = "FarmerProcessor"
        artifact = "build/contracts/FarmerProcessor.json"

        [[units]]
        id = "FarmerProcessorDelegate"
        artifact = "build/contracts/FarmerProcessorDelegate.json"
        args = [{ ref = "FarmerProcessor" }, 42, "label"]
    "#;

    #[test]
    fn test_parse_toml_manifest() {
        let manifest =
            Manifest::parse(FARMER_MANIFEST, ManifestFormat::Toml, Path::new("/project"))
                .expect("Manifest should parse");

        assert_eq!(manifest.units().len(), 2);
        let delegate = manifest
            .get("FarmerProcessorDelegate")
            .expect("Delegate unit should exist");
        assert_eq!(
            delegate.args,
            vec![
                ArgSpec::reference("FarmerProcessor"),
                ArgSpec::literal(42),
                ArgSpec::literal("label"),
            ]
        );
        assert_eq!(
            delegate.artifact.path,
            PathBuf::from("/project/build/contracts/FarmerProcessorDelegate.json"),
            "Relative artifact paths should resolve against the manifest directory"
        );
        assert_eq!(
            delegate.dependencies().collect::<Vec<_>>(),
            vec![&UnitId::from("FarmerProcessor")]
        );
    }

    #[test]
    fn test_parse_json_manifest() {
        let content = json!({
            "units": [
                { "id": "Token", "artifact": "/abs/Token.json", "args": ["Cake", "CAKE", 18] },
                { "id": "Vault", "artifact": "Vault.json", "args": [{ "ref": "Token" }] }
            ]
        })
        .to_string();

        let manifest = Manifest::parse(&content, ManifestFormat::Json, Path::new("/base"))
            .expect("Manifest should parse");

        assert_eq!(manifest.units()[0].artifact.path, PathBuf::from("/abs/Token.json"));
        assert_eq!(manifest.units()[1].args, vec![ArgSpec::reference("Token")]);
    }

    #[test]
    fn test_object_literal_is_not_a_reference() {
        let arg: ArgSpec =
            serde_json::from_value(json!({ "name": "cake" })).expect("Should deserialize");
        assert_eq!(arg, ArgSpec::literal(json!({ "name": "cake" })));
        assert!(arg.dependency().is_none());
    }

    #[test]
    fn test_duplicate_unit_rejected() {
        let result = Manifest::new(vec![
            DeploymentUnit::new("A", "a.json"),
            DeploymentUnit::new("A", "a2.json"),
        ]);
        assert_eq!(result, Err(ManifestError::DuplicateUnit(UnitId::from("A"))));
    }

    #[test]
    fn test_empty_id_rejected() {
        let result = Manifest::new(vec![
            DeploymentUnit::new("A", "a.json"),
            DeploymentUnit::new(" ", "b.json"),
        ]);
        assert_eq!(result, Err(ManifestError::EmptyId { index: 1 }));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ManifestFormat::from_path(Path::new("deploy.json")), ManifestFormat::Json);
        assert_eq!(ManifestFormat::from_path(Path::new("deploy.JSON")), ManifestFormat::Json);
        assert_eq!(ManifestFormat::from_path(Path::new("deploy.toml")), ManifestFormat::Toml);
        assert_eq!(ManifestFormat::from_path(Path::new("deploy")), ManifestFormat::Toml);
    }

    #[test]
    fn test_load_from_file_records_artifact_digest() {
        let temp_dir = TempDir::new("layercake-test").expect("Failed to create temp dir");
        let artifacts = temp_dir.path().join("build/contracts");
        std::fs::create_dir_all(&artifacts).expect("Failed to create artifacts dir");
        std::fs::write(artifacts.join("FarmerProcessor.json"), r#"{"abi":[],"bytecode":"0x00"}"#)
            .expect("Failed to write artifact");

        let manifest_path = temp_dir.path().join("deploy.toml");
        std::fs::write(&manifest_path, FARMER_MANIFEST).expect("Failed to write manifest");

        let manifest = Manifest::load_from_file(&manifest_path).expect("Manifest should load");

        let processor = manifest.get("FarmerProcessor").expect("Unit should exist");
        let digest = processor.artifact.digest.as_ref().expect("Digest should be recorded");
        assert_eq!(digest.len(), 64, "SHA-256 digest should be 64 hex characters");

        let delegate = manifest.get("FarmerProcessorDelegate").expect("Unit should exist");
        assert!(
            delegate.artifact.digest.is_none(),
            "Missing artifacts should not fail the load"
        );
    }

    #[test]
    fn test_load_missing_manifest() {
        let temp_dir = TempDir::new("layercake-test").expect("Failed to create temp dir");
        let result = Manifest::load_from_file(&temp_dir.path().join("missing.toml"));
        assert!(result.is_err(), "Loading a missing manifest should fail");
    }
}
