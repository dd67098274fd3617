//! Dependency-ordered resolution of the plan's contracts.

use anyhow::{Context, Result};

use crate::{
    broadcast::{ContractDeployer, ContractFetcher},
    nonce::NonceAllocator,
    plan::{Acquisition, ContractSpec, StepRef},
    record::DeploymentRecord,
    registry::{AcquisitionMode, ContractRegistry, DeployedContract},
    traits::{ChainClient, RunContext},
};

/// Walks the contract specs in plan order, deploying or attaching each one.
///
/// Step N+1 never starts before step N is recorded: its arguments may depend on it.
pub struct DeploymentSequencer<'a, 'b, C> {
    ctx: &'a RunContext<'b, C>,
}

impl<'a, 'b, C: ChainClient> DeploymentSequencer<'a, 'b, C> {
    pub fn new(ctx: &'a RunContext<'b, C>) -> Self {
        Self { ctx }
    }

    /// Resolve every spec into `registry`.
    ///
    /// The first failure aborts the walk; the error names the failing contract.
    pub async fn run(
        &self,
        specs: &[ContractSpec],
        nonces: &mut NonceAllocator,
        registry: &mut ContractRegistry,
        record: &mut DeploymentRecord,
    ) -> Result<()> {
        for spec in specs {
            let step = StepRef::contract(spec);

            let contract = self
                .resolve(spec, nonces, registry)
                .await
                .with_context(|| format!("{step} failed"))?;

            record
                .record_contract(&contract)
                .with_context(|| format!("{step}: failed to update the deployment record"))?;
            let mode = contract.mode();
            registry.record(contract)?;

            let step = step.to_string();
            match mode {
                AcquisitionMode::Deploy => self.ctx.pacing.after_broadcast(&step).await,
                AcquisitionMode::Attach => self.ctx.pacing.after_attach(&step).await,
            }
        }

        tracing::info!(
            contracts = registry.len(),
            next_nonce = nonces.peek(),
            "All contracts resolved"
        );

        Ok(())
    }

    async fn resolve(
        &self,
        spec: &ContractSpec,
        nonces: &mut NonceAllocator,
        registry: &ContractRegistry,
    ) -> Result<DeployedContract> {
        let args = registry.resolve_args(&spec.args, self.ctx).await?;

        match spec.acquire {
            Acquisition::Deploy => {
                let nonce = nonces.allocate();
                ContractDeployer::new(self.ctx)
                    .deploy(spec, args, nonce)
                    .await
            }
            Acquisition::Attach(address) => {
                ContractFetcher::new(self.ctx)
                    .attach(spec, address, args)
                    .await
            }
        }
    }
}
