//! Compiled contract artifacts and constructor argument encoding.

use std::path::Path;

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::JsonAbi,
    primitives::Bytes,
};
use serde::Deserialize;
use serde_json::Value;

use crate::ArtifactError;

/// Raw artifact as emitted by Truffle (`"bytecode": "0x..."`) or Foundry
/// (`"bytecode": { "object": "0x..." }`).
#[derive(Debug, Deserialize)]
struct RawArtifact {
    #[serde(default)]
    abi: JsonAbi,
    bytecode: RawBytecode,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

impl RawBytecode {
    fn as_hex(&self) -> &str {
        match self {
            Self::Hex(hex) => hex,
            Self::Object { object } => object,
        }
    }
}

/// ABI and creation bytecode of a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Load an artifact from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let content = std::fs::read_to_string(path).map_err(|e| ArtifactError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    /// Parse an artifact from its JSON content.
    pub fn from_json(content: &str) -> Result<Self, ArtifactError> {
        let raw: RawArtifact =
            serde_json::from_str(content).map_err(|e| ArtifactError::Parse(e.to_string()))?;

        let hex_code = raw.bytecode.as_hex().trim_start_matches("0x");
        if hex_code.is_empty() {
            return Err(ArtifactError::EmptyBytecode);
        }
        if hex_code.contains("__") {
            return Err(ArtifactError::UnlinkedBytecode);
        }
        let bytecode =
            hex::decode(hex_code).map_err(|e| ArtifactError::InvalidBytecode(e.to_string()))?;

        Ok(Self {
            abi: raw.abi,
            bytecode: Bytes::from(bytecode),
        })
    }

    /// ABI-encode constructor arguments against the constructor's declared input types.
    ///
    /// JSON strings are parsed as Solidity literals of the declared type; numbers, booleans and
    /// arrays go through their JSON rendering first.
    pub fn encode_constructor_args(&self, args: &[Value]) -> Result<Vec<u8>, ArtifactError> {
        let Some(constructor) = &self.abi.constructor else {
            if args.is_empty() {
                return Ok(Vec::new());
            }
            return Err(ArtifactError::ArgumentCount {
                expected: 0,
                found: args.len(),
            });
        };

        if constructor.inputs.len() != args.len() {
            return Err(ArtifactError::ArgumentCount {
                expected: constructor.inputs.len(),
                found: args.len(),
            });
        }

        let values = constructor
            .inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let ty: DynSolType = param.resolve().map_err(|e| ArtifactError::Argument {
                    ty: param.ty.clone(),
                    value: arg.to_string(),
                    message: e.to_string(),
                })?;
                coerce(&ty, arg)
            })
            .collect::<Result<Vec<_>, _>>()?;

        constructor
            .abi_encode_input(&values)
            .map_err(|e| ArtifactError::Encode(e.to_string()))
    }

    /// Creation calldata: bytecode followed by the encoded constructor arguments.
    pub fn deploy_data(&self, args: &[Value]) -> Result<Bytes, ArtifactError> {
        let encoded = self.encode_constructor_args(args)?;
        let mut data = Vec::with_capacity(self.bytecode.len() + encoded.len());
        data.extend_from_slice(&self.bytecode);
        data.extend_from_slice(&encoded);
        Ok(Bytes::from(data))
    }
}

fn coerce(ty: &DynSolType, value: &Value) -> Result<DynSolValue, ArtifactError> {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    ty.coerce_str(&text).map_err(|e| ArtifactError::Argument {
        ty: ty.sol_type_name().into_owned(),
        value: text,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::Address;
    use serde_json::json;

    fn delegate_artifact() -> String {
        json!({
            "contractName": "FarmerProcessorDelegate",
            "abi": [
                {
                    "type": "constructor",
                    "stateMutability": "nonpayable",
                    "inputs": [
                        { "name": "_processor", "type": "address", "internalType": "address" },
                        { "name": "_fee", "type": "uint256", "internalType": "uint256" }
                    ]
                }
            ],
            "bytecode": "0x6080604052"
        })
        .to_string()
    }

    #[test]
    fn test_truffle_bytecode() {
        let artifact = ContractArtifact::from_json(&delegate_artifact()).expect("Should parse");
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
        assert!(artifact.abi.constructor.is_some());
    }

    #[test]
    fn test_foundry_bytecode() {
        let content = json!({
            "abi": [],
            "bytecode": { "object": "0x6080", "linkReferences": {} }
        })
        .to_string();
        let artifact = ContractArtifact::from_json(&content).expect("Should parse");
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80]);
    }

    #[test]
    fn test_empty_and_unlinked_bytecode() {
        let empty = json!({ "abi": [], "bytecode": "0x" }).to_string();
        assert_eq!(
            ContractArtifact::from_json(&empty),
            Err(ArtifactError::EmptyBytecode)
        );

        let unlinked =
            json!({ "abi": [], "bytecode": "0x6080__$abcdef$__6040" }).to_string();
        assert_eq!(
            ContractArtifact::from_json(&unlinked),
            Err(ArtifactError::UnlinkedBytecode)
        );
    }

    #[test]
    fn test_deploy_data_appends_encoded_args() {
        let artifact = ContractArtifact::from_json(&delegate_artifact()).expect("Should parse");
        let processor = Address::repeat_byte(0xaa);

        let data = artifact
            .deploy_data(&[json!(processor.to_string()), json!(42)])
            .expect("Arguments should encode");

        assert_eq!(data.len(), 5 + 2 * 32, "Bytecode plus two 32-byte words");
        assert_eq!(&data[..5], artifact.bytecode.as_ref());
        assert_eq!(&data[5..17], &[0u8; 12], "Address is left-padded");
        assert_eq!(&data[17..37], processor.as_slice());
        assert_eq!(data[data.len() - 1], 42);
    }

    #[test]
    fn test_numeric_string_argument() {
        let artifact = ContractArtifact::from_json(&delegate_artifact()).expect("Should parse");
        let data = artifact
            .encode_constructor_args(&[
                json!("0x0000000000000000000000000000000000000001"),
                json!("1000"),
            ])
            .expect("Arguments should encode");
        assert_eq!(&data[62..64], &[0x03, 0xe8]);
    }

    #[test]
    fn test_argument_count_mismatch() {
        let artifact = ContractArtifact::from_json(&delegate_artifact()).expect("Should parse");
        assert_eq!(
            artifact.encode_constructor_args(&[json!(1)]),
            Err(ArtifactError::ArgumentCount {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_no_constructor_accepts_no_args() {
        let content = json!({ "abi": [], "bytecode": "0x00" }).to_string();
        let artifact = ContractArtifact::from_json(&content).expect("Should parse");
        assert_eq!(artifact.encode_constructor_args(&[]), Ok(Vec::new()));
        assert!(artifact.encode_constructor_args(&[json!(1)]).is_err());
    }

    #[test]
    fn test_invalid_argument_value() {
        let artifact = ContractArtifact::from_json(&delegate_artifact()).expect("Should parse");
        let err = artifact
            .encode_constructor_args(&[json!("not-an-address"), json!(1)])
            .expect_err("Invalid address should fail");
        assert!(matches!(err, ArtifactError::Argument { ref ty, .. } if ty == "address"));
    }
}
