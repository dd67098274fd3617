//! Transaction broadcast, contract creation and attachment.

use std::time::Duration;

use alloy_core::primitives::{Address, Bytes, U256};
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};

use crate::{
    plan::ContractSpec,
    registry::{ArgValue, DeployedContract},
    signer::LegacyTransaction,
    traits::{ChainClient, RunContext, TransactionReceipt},
};

/// Default gas margin added on top of the node's estimate, in percent.
pub const DEFAULT_GAS_MARGIN_PERCENT: u64 = 20;

/// Default interval between two receipt lookups.
pub const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 1000;

/// Default time to wait for a broadcast transaction to be included.
pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 300;

/// Gas and inclusion settings shared by every broadcast of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionSettings {
    /// Fixed gas price in wei. Queried from the node when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price_wei: Option<u64>,
    /// Fixed gas limit. Estimated by the node when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Margin added to the node's gas estimate, in percent.
    pub gas_margin_percent: u64,
    pub receipt_poll_interval_ms: u64,
    pub receipt_timeout_secs: u64,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            gas_price_wei: None,
            gas_limit: None,
            gas_margin_percent: DEFAULT_GAS_MARGIN_PERCENT,
            receipt_poll_interval_ms: DEFAULT_RECEIPT_POLL_INTERVAL_MS,
            receipt_timeout_secs: DEFAULT_RECEIPT_TIMEOUT_SECS,
        }
    }
}

impl TransactionSettings {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms.max(1))
    }

    /// Number of receipt lookups that fit in the timeout.
    fn poll_attempts(&self) -> usize {
        let timeout_ms = self.receipt_timeout_secs.saturating_mul(1000);
        (timeout_ms / self.receipt_poll_interval_ms.max(1)).max(1) as usize
    }

    fn with_margin(&self, estimate: u64) -> u64 {
        estimate.saturating_add(estimate.saturating_mul(self.gas_margin_percent) / 100)
    }
}

/// Sign and broadcast one transaction with `nonce`, then wait for its receipt.
///
/// A transaction that reverts or is not included before the timeout is an error.
/// Receipt lookups are retried at a fixed interval; the transaction itself is never
/// resubmitted.
pub async fn send_transaction<C: ChainClient>(
    ctx: &RunContext<'_, C>,
    nonce: u64,
    to: Option<Address>,
    input: Bytes,
) -> Result<TransactionReceipt> {
    let from = ctx.signer.address();
    let settings = ctx.transactions;

    let gas_price = match settings.gas_price_wei {
        Some(price) => price as u128,
        None => ctx
            .chain
            .gas_price()
            .await
            .context("Failed to fetch gas price")?,
    };

    let gas_limit = match settings.gas_limit {
        Some(limit) => limit,
        None => {
            let estimate = ctx
                .chain
                .estimate_gas(from, to, &input)
                .await
                .context("Gas estimation failed, the transaction would likely revert")?;
            settings.with_margin(estimate)
        }
    };

    let tx = LegacyTransaction {
        nonce,
        gas_price,
        gas_limit,
        to,
        value: U256::ZERO,
        input,
    };
    let raw = ctx.signer.sign_transaction(&tx)?;

    let hash = ctx
        .chain
        .send_raw_transaction(raw)
        .await
        .with_context(|| format!("Transaction with nonce {nonce} was rejected"))?;

    tracing::info!(nonce, tx_hash = %hash, gas_limit, gas_price, "Transaction sent, waiting for receipt...");

    let chain = ctx.chain;
    let fetch = move || async move {
        chain
            .transaction_receipt(hash)
            .await?
            .context("Transaction not yet included")
    };

    let receipt = fetch
        .retry(
            ConstantBuilder::default()
                .with_delay(settings.poll_interval())
                .with_max_times(settings.poll_attempts()),
        )
        .notify(|err, delay| {
            tracing::trace!(tx_hash = %hash, error = %err, ?delay, "Receipt not available yet");
        })
        .await
        .with_context(|| {
            format!(
                "Transaction {hash} was not included within {}s",
                settings.receipt_timeout_secs
            )
        })?;

    if !receipt.status {
        anyhow::bail!("Transaction {hash} with nonce {nonce} reverted");
    }

    tracing::debug!(
        tx_hash = %hash,
        block_number = ?receipt.block_number,
        gas_used = ?receipt.gas_used,
        "Transaction included"
    );

    Ok(receipt)
}

/// Broadcasts contract-creation transactions.
pub struct ContractDeployer<'a, 'b, C> {
    ctx: &'a RunContext<'b, C>,
}

impl<'a, 'b, C: ChainClient> ContractDeployer<'a, 'b, C> {
    pub fn new(ctx: &'a RunContext<'b, C>) -> Self {
        Self { ctx }
    }

    /// Deploy `spec` with already resolved constructor arguments and an allocated nonce.
    ///
    /// The caller is responsible for the post-broadcast pacing wait.
    pub async fn deploy(
        &self,
        spec: &ContractSpec,
        constructor_args: Vec<ArgValue>,
        nonce: u64,
    ) -> Result<DeployedContract> {
        let artifact = self.ctx.artifacts.get(&spec.artifact)?;
        let input = artifact.deploy_input(&constructor_args)?;

        tracing::info!(
            contract = %spec.id,
            artifact = %spec.artifact,
            nonce,
            args = constructor_args.len(),
            "Deploying contract..."
        );

        let receipt = send_transaction(self.ctx, nonce, None, input).await?;

        let expected = self.ctx.signer.address().create(nonce);
        let address = match receipt.contract_address {
            Some(address) if address != expected => anyhow::bail!(
                "Contract created at {address} but nonce {nonce} predicts {expected}"
            ),
            Some(address) => address,
            None => expected,
        };

        tracing::info!(
            contract = %spec.id,
            %address,
            nonce,
            tx_hash = %receipt.transaction_hash,
            "Contract deployed"
        );

        Ok(DeployedContract {
            id: spec.id.clone(),
            address,
            interface: artifact,
            nonce: Some(nonce),
            tx_hash: Some(receipt.transaction_hash),
            constructor_args,
            verify: spec.verify,
        })
    }
}

/// Attaches to contracts that are already on chain.
pub struct ContractFetcher<'a, 'b, C> {
    ctx: &'a RunContext<'b, C>,
}

impl<'a, 'b, C: ChainClient> ContractFetcher<'a, 'b, C> {
    pub fn new(ctx: &'a RunContext<'b, C>) -> Self {
        Self { ctx }
    }

    /// Build a handle to the contract at `address`. No transaction is sent.
    ///
    /// Fails when the address holds no code.
    pub async fn attach(
        &self,
        spec: &ContractSpec,
        address: Address,
        constructor_args: Vec<ArgValue>,
    ) -> Result<DeployedContract> {
        let artifact = self.ctx.artifacts.get(&spec.artifact)?;

        let code = self
            .ctx
            .chain
            .code_at(address)
            .await
            .with_context(|| format!("Failed to fetch code at {address}"))?;
        if code.is_empty() {
            anyhow::bail!("No contract code at {address}");
        }

        tracing::info!(contract = %spec.id, %address, "Attached to existing contract");

        Ok(DeployedContract {
            id: spec.id.clone(),
            address,
            interface: artifact,
            nonce: None,
            tx_hash: None,
            constructor_args,
            verify: spec.verify,
        })
    }
}
