//! Shared utilities for Ethereum JSON-RPC endpoints.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Default timeout for RPC requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure of a single JSON-RPC call.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("failed to send {method} request: {message}")]
    Transport { method: String, message: String },
    #[error("{method} failed with code {code}: {message}")]
    Response {
        method: String,
        code: i64,
        message: String,
    },
    #[error("failed to decode {method} response: {message}")]
    Decode { method: String, message: String },
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result. A `null` result deserializes into `Option::None` when `T` is an
/// `Option`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RpcError> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| RpcError::Transport {
            method: method.to_string(),
            message: e.to_string(),
        })?;

    let result: Value = response.json().await.map_err(|e| RpcError::Decode {
        method: method.to_string(),
        message: e.to_string(),
    })?;

    parse_response(method, result)
}

/// Extract the `result` of a JSON-RPC response body, or its `error`.
pub fn parse_response<T: DeserializeOwned>(method: &str, response: Value) -> Result<T, RpcError> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        // Some nodes put the revert reason in `data` rather than `message`.
        let message = match error.get("data").and_then(|d| d.as_str()) {
            Some(data) if !data.is_empty() => format!("{message} ({data})"),
            _ => message.to_string(),
        };
        return Err(RpcError::Response {
            method: method.to_string(),
            code: error.get("code").and_then(|c| c.as_i64()).unwrap_or_default(),
            message,
        });
    }

    let result_value = response.get("result").cloned().ok_or_else(|| RpcError::Decode {
        method: method.to_string(),
        message: "no result in response".to_string(),
    })?;

    serde_json::from_value(result_value).map_err(|e| RpcError::Decode {
        method: method.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_result() {
        let accounts: Vec<String> = parse_response(
            "eth_accounts",
            json!({ "jsonrpc": "2.0", "id": 1, "result": ["0x01"] }),
        )
        .expect("Result should parse");
        assert_eq!(accounts, vec!["0x01"]);
    }

    #[test]
    fn test_parse_null_result_as_none() {
        let receipt: Option<Value> = parse_response(
            "eth_getTransactionReceipt",
            json!({ "jsonrpc": "2.0", "id": 1, "result": null }),
        )
        .expect("Null result should parse");
        assert!(receipt.is_none());
    }

    #[test]
    fn test_parse_error_with_data() {
        let err = parse_response::<Value>(
            "eth_sendTransaction",
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "execution reverted", "data": "Ownable: caller is not the owner" }
            }),
        )
        .expect_err("Error response should fail");

        match err {
            RpcError::Response { code, message, .. } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "execution reverted (Ownable: caller is not the owner)");
            }
            other => panic!("Unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_missing_result() {
        let err = parse_response::<Value>("eth_chainId", json!({ "jsonrpc": "2.0", "id": 1 }))
            .expect_err("Missing result should fail");
        assert!(matches!(err, RpcError::Decode { .. }));
    }
}
