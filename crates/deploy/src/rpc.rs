//! JSON-RPC plumbing and the production [`ChainClient`].

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::traits::{ChainClient, TransactionReceipt};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
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
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
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
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        match error.get("data").and_then(|d| d.as_str()) {
            Some(data) => anyhow::bail!("RPC error: {} (data: {})", message, data),
            None => anyhow::bail!("RPC error: {}", message),
        }
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Parse a JSON-RPC hex quantity.
pub(crate) fn parse_quantity(hex: &str) -> Result<u128, anyhow::Error> {
    u128::from_str_radix(hex.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity `{}`", hex))
}

/// Parse a JSON-RPC hex quantity that must fit in a `u64`.
pub(crate) fn parse_u64_quantity(hex: &str) -> Result<u64, anyhow::Error> {
    u64::try_from(parse_quantity(hex)?)
        .with_context(|| format!("Hex quantity `{}` does not fit in 64 bits", hex))
}

/// [`ChainClient`] speaking Ethereum JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct RpcChain {
    client: reqwest::Client,
    url: Url,
}

impl RpcChain {
    /// Connect to `url` with the default request timeout.
    pub fn new(url: Url) -> Result<Self, anyhow::Error> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self, anyhow::Error> {
        Ok(Self {
            client: create_client(timeout)?,
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call_rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, anyhow::Error> {
        json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }
}

impl ChainClient for RpcChain {
    async fn chain_id(&self) -> Result<u64, anyhow::Error> {
        let hex: String = self.call_rpc("eth_chainId", vec![]).await?;
        parse_u64_quantity(&hex)
    }

    async fn transaction_count(&self, account: Address) -> Result<u64, anyhow::Error> {
        let hex: String = self
            .call_rpc(
                "eth_getTransactionCount",
                vec![serde_json::json!(account), serde_json::json!("pending")],
            )
            .await?;
        parse_u64_quantity(&hex)
    }

    async fn gas_price(&self) -> Result<u128, anyhow::Error> {
        let hex: String = self.call_rpc("eth_gasPrice", vec![]).await?;
        parse_quantity(&hex)
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Option<Address>,
        input: &Bytes,
    ) -> Result<u64, anyhow::Error> {
        let mut request = serde_json::json!({
            "from": from,
            "data": input,
        });
        if let Some(to) = to {
            request["to"] = serde_json::json!(to);
        }

        let hex: String = self.call_rpc("eth_estimateGas", vec![request]).await?;
        parse_u64_quantity(&hex)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, anyhow::Error> {
        self.call_rpc("eth_sendRawTransaction", vec![serde_json::json!(raw)])
            .await
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, anyhow::Error> {
        self.call_rpc("eth_getTransactionReceipt", vec![serde_json::json!(hash)])
            .await
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, anyhow::Error> {
        self.call_rpc(
            "eth_call",
            vec![
                serde_json::json!({ "to": to, "data": input }),
                serde_json::json!("latest"),
            ],
        )
        .await
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, anyhow::Error> {
        self.call_rpc(
            "eth_getCode",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x2105").unwrap(), 8453);
        assert_eq!(parse_quantity("ff").unwrap(), 255);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_parse_u64_quantity_rejects_overflow() {
        assert_eq!(parse_u64_quantity("0x2105").unwrap(), 8453);
        assert_eq!(parse_u64_quantity("0xffffffffffffffff").unwrap(), u64::MAX);

        let err = parse_u64_quantity("0x10000000000000000").unwrap_err();
        assert!(err.to_string().contains("does not fit in 64 bits"));
    }
}
