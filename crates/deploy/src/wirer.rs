//! Administrative calls that connect the resolved contracts to each other.

use alloy_core::primitives::{Address, Bytes};
use anyhow::{Context, Result};

use crate::{
    broadcast::send_transaction,
    nonce::NonceAllocator,
    plan::{StepRef, WiringStep},
    record::{DeploymentRecord, WiringRecord},
    registry::{ArgValue, ContractRegistry},
    traits::{ChainClient, RunContext},
};

/// Issues the wiring steps in plan order, one transaction per step.
pub struct ConfigurationWirer<'a, 'b, C> {
    ctx: &'a RunContext<'b, C>,
}

impl<'a, 'b, C: ChainClient> ConfigurationWirer<'a, 'b, C> {
    pub fn new(ctx: &'a RunContext<'b, C>) -> Self {
        Self { ctx }
    }

    /// Execute every step against the complete registry.
    ///
    /// A step whose identical call (same position, target address, method and resolved
    /// arguments) is already completed in `record` is skipped without allocating a
    /// nonce. Any failure aborts the remaining steps.
    pub async fn run(
        &self,
        steps: &[WiringStep],
        nonces: &mut NonceAllocator,
        registry: &ContractRegistry,
        record: &mut DeploymentRecord,
    ) -> Result<Vec<WiringRecord>> {
        let mut completed = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let step_ref = StepRef::wiring(index, step);

            let call = self
                .resolve(step, registry)
                .await
                .with_context(|| format!("{step_ref} failed"))?;

            if let Some(done) = record.completed_wiring(index, step, call.address, &call.args) {
                tracing::info!(
                    step = %step_ref,
                    nonce = done.nonce,
                    tx_hash = %done.tx_hash,
                    "Wiring step already completed by an earlier run, skipping"
                );
                completed.push(done.clone());
                continue;
            }

            let wiring = self
                .execute(index, step, call, nonces)
                .await
                .with_context(|| format!("{step_ref} failed"))?;

            record
                .record_wiring(wiring.clone())
                .with_context(|| format!("{step_ref}: failed to update the deployment record"))?;
            completed.push(wiring);

            self.ctx.pacing.after_broadcast(&step_ref.to_string()).await;
        }

        tracing::info!(steps = steps.len(), next_nonce = nonces.peek(), "Wiring complete");

        Ok(completed)
    }

    async fn resolve(&self, step: &WiringStep, registry: &ContractRegistry) -> Result<ResolvedCall> {
        let target = registry.require(&step.target)?;
        let args = registry.resolve_args(&step.args, self.ctx).await?;
        let input = target.interface.encode_call(&step.method, &args)?;

        Ok(ResolvedCall {
            address: target.address,
            args,
            input,
        })
    }

    async fn execute(
        &self,
        index: usize,
        step: &WiringStep,
        call: ResolvedCall,
        nonces: &mut NonceAllocator,
    ) -> Result<WiringRecord> {
        let nonce = nonces.allocate();
        tracing::info!(
            target = %step.target,
            address = %call.address,
            method = %step.method,
            nonce,
            "Sending wiring call..."
        );

        let receipt = send_transaction(self.ctx, nonce, Some(call.address), call.input).await?;

        Ok(WiringRecord {
            index,
            target: step.target.clone(),
            target_address: call.address,
            method: step.method.clone(),
            args: call.args,
            nonce,
            tx_hash: receipt.transaction_hash,
        })
    }
}

/// A wiring call ready to be sent.
struct ResolvedCall {
    address: Address,
    args: Vec<ArgValue>,
    input: Bytes,
}
