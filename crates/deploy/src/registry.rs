//! Contracts resolved during a run, and resolution of argument templates against them.

use std::{collections::HashMap, sync::Arc};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256},
};
use anyhow::{Context, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{
    artifact::Artifact,
    plan::ArgTemplate,
    traits::{ChainClient, RunContext},
};

/// A resolved argument, ready to be coerced to its ABI type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ArgValue {
    #[display("{_0}")]
    Address(Address),
    #[display("{_0}")]
    Literal(String),
}

impl ArgValue {
    /// Convert a decoded ABI value into an argument usable by a later step.
    pub fn from_sol_value(value: &DynSolValue) -> Result<Self> {
        let literal = match value {
            DynSolValue::Address(address) => return Ok(Self::Address(*address)),
            DynSolValue::Bool(b) => b.to_string(),
            DynSolValue::Uint(n, _) => n.to_string(),
            DynSolValue::Int(n, _) => n.to_string(),
            DynSolValue::FixedBytes(word, size) => format!("0x{}", hex::encode(&word[..*size])),
            DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
            DynSolValue::String(s) => s.clone(),
            _ => anyhow::bail!("Read calls returning composite values cannot be used as arguments"),
        };
        Ok(Self::Literal(literal))
    }
}

/// How a resolved contract was obtained.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AcquisitionMode {
    Deploy,
    Attach,
}

/// A contract whose address is known, either deployed by this run or attached.
#[derive(Debug, Clone)]
pub struct DeployedContract {
    pub id: String,
    pub address: Address,
    /// Shared handle to the compiled interface.
    pub interface: Arc<Artifact>,
    /// Nonce of the creation transaction, `None` when attached.
    pub nonce: Option<u64>,
    pub tx_hash: Option<B256>,
    /// Constructor arguments as resolved for this contract.
    pub constructor_args: Vec<ArgValue>,
    /// Submit this contract to the verification service.
    pub verify: bool,
}

impl DeployedContract {
    /// Whether this run (or a resumed earlier one) broadcast the creation transaction.
    pub fn is_deployed(&self) -> bool {
        self.nonce.is_some()
    }

    pub fn mode(&self) -> AcquisitionMode {
        if self.is_deployed() {
            AcquisitionMode::Deploy
        } else {
            AcquisitionMode::Attach
        }
    }
}

/// Every resolved contract of a run, in resolution order.
///
/// Entries are never replaced once recorded.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: Vec<DeployedContract>,
    index: HashMap<String, usize>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolved contract.
    pub fn record(&mut self, contract: DeployedContract) -> Result<&DeployedContract> {
        if self.index.contains_key(&contract.id) {
            anyhow::bail!("Contract `{}` is already resolved", contract.id);
        }

        let position = self.contracts.len();
        self.index.insert(contract.id.clone(), position);
        self.contracts.push(contract);
        Ok(&self.contracts[position])
    }

    pub fn get(&self, id: &str) -> Option<&DeployedContract> {
        self.index.get(id).map(|&i| &self.contracts[i])
    }

    /// The contract `id`, which must already be resolved.
    pub fn require(&self, id: &str) -> Result<&DeployedContract> {
        self.get(id)
            .with_context(|| format!("Unresolved reference to contract `{id}`"))
    }

    pub fn address_of(&self, id: &str) -> Result<Address> {
        self.require(id).map(|contract| contract.address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeployedContract> {
        self.contracts.iter()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Resolve argument templates against the contracts recorded so far.
    ///
    /// `Call` templates perform a read-only call on the referenced contract, followed by
    /// the read pacing wait.
    pub async fn resolve_args<C: ChainClient>(
        &self,
        templates: &[ArgTemplate],
        ctx: &RunContext<'_, C>,
    ) -> Result<Vec<ArgValue>> {
        let mut values = Vec::with_capacity(templates.len());

        for (i, template) in templates.iter().enumerate() {
            let value = match template {
                ArgTemplate::Literal(literal) => ArgValue::Literal(literal.clone()),
                ArgTemplate::AddressOf(id) => ArgValue::Address(
                    self.address_of(id)
                        .with_context(|| format!("Argument #{i}"))?,
                ),
                ArgTemplate::Signer => ArgValue::Address(ctx.signer.address()),
                ArgTemplate::Call { contract, method } => self
                    .read(contract, method, ctx)
                    .await
                    .with_context(|| format!("Argument #{i} ({contract}.{method}())"))?,
            };
            values.push(value);
        }

        Ok(values)
    }

    async fn read<C: ChainClient>(
        &self,
        id: &str,
        method: &str,
        ctx: &RunContext<'_, C>,
    ) -> Result<ArgValue> {
        let contract = self.require(id)?;
        let input = contract.interface.encode_call(method, &[])?;

        let output = ctx
            .chain
            .call(contract.address, input)
            .await
            .context("Read call failed")?;
        let value = contract.interface.decode_single_output(method, &output)?;

        tracing::info!(contract = %id, method, value = %value, "Read call result");
        ctx.pacing.after_read(&format!("{id}.{method}()")).await;

        Ok(value)
    }
}
