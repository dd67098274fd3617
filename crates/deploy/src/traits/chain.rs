//! Narrow interface to the chain the plan is executed against.

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Result;
use serde::{Deserialize, Deserializer};

/// Receipt of an included transaction.
///
/// Only the fields the orchestrator reads are kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    /// `true` when the transaction executed successfully (status `0x1`).
    #[serde(deserialize_with = "deserialize_status")]
    pub status: bool,
    /// Address of the created contract, for contract-creation transactions.
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    pub block_number: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    pub gas_used: Option<u64>,
}

/// Deserialize a receipt status (`"0x1"` or `"0x0"`).
fn deserialize_status<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    let status =
        u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)?;
    Ok(status == 1)
}

/// Deserialize an optional u64 from a hex string (with 0x prefix).
fn deserialize_opt_u64_from_hex<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    s.map(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16))
        .transpose()
        .map_err(serde::de::Error::custom)
}

/// Read and broadcast capabilities the orchestrator needs from an EVM node.
///
/// Every method is awaited immediately by the caller, so implementations never see
/// overlapping requests from a single run.
pub trait ChainClient: Send + Sync {
    /// The chain id reported by the node.
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// The next usable nonce of `account`, counting pending transactions.
    fn transaction_count(&self, account: Address) -> impl Future<Output = Result<u64>> + Send;

    /// Current legacy gas price in wei.
    fn gas_price(&self) -> impl Future<Output = Result<u128>> + Send;

    /// Gas estimate for a transaction. `to == None` estimates a contract creation.
    fn estimate_gas(
        &self,
        from: Address,
        to: Option<Address>,
        input: &Bytes,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Broadcast a signed, RLP-encoded transaction and return its hash.
    fn send_raw_transaction(&self, raw: Bytes) -> impl Future<Output = Result<B256>> + Send;

    /// The receipt of `hash`, or `None` while the transaction is not yet included.
    fn transaction_receipt(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>>> + Send;

    /// Execute a read-only call against the latest block.
    fn call(&self, to: Address, input: Bytes) -> impl Future<Output = Result<Bytes>> + Send;

    /// Deployed code at `address` (empty for accounts without code).
    fn code_at(&self, address: Address) -> impl Future<Output = Result<Bytes>> + Send;
}
