//! Run execution engine.

use std::marker::PhantomData;

use anyhow::{Context, Result};

use super::{
    ChainClient, RunContext, SourceVerifier,
    stages::{NextStage, RunStage, Sequencing, Verification, Wiring},
};
use crate::{
    nonce::NonceAllocator,
    plan::{ContractSpec, DeploymentPlan, WiringStep},
    record::{ContractRecord, DeploymentRecord, WiringRecord},
    registry::ContractRegistry,
    sequencer::DeploymentSequencer,
    summary::RunSummary,
    verify::{VerificationReport, Verifier},
    wirer::ConfigurationWirer,
};

/// A run of a plan, in stage `S`.
///
/// The run owns the nonce allocator and the registry; a stage can only be entered
/// by completing the previous one.
pub struct Run<'a, C, S: RunStage> {
    ctx: RunContext<'a, C>,
    nonces: NonceAllocator,
    registry: ContractRegistry,
    record: DeploymentRecord,
    wiring: Vec<WiringRecord>,
    _stage: PhantomData<S>,
}

impl<'a, C, S: RunStage> Run<'a, C, S> {
    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn nonces(&self) -> &NonceAllocator {
        &self.nonces
    }

    pub fn record(&self) -> &DeploymentRecord {
        &self.record
    }
}

impl<'a, C, S: NextStage> Run<'a, C, S> {
    fn advance(self) -> Run<'a, C, S::Next> {
        tracing::info!(
            completed = S::NAME,
            next = <S::Next as RunStage>::NAME,
            next_nonce = self.nonces.peek(),
            "Stage complete"
        );
        Run {
            ctx: self.ctx,
            nonces: self.nonces,
            registry: self.registry,
            record: self.record,
            wiring: self.wiring,
            _stage: PhantomData,
        }
    }
}

impl<'a, C: ChainClient> Run<'a, C, Sequencing> {
    pub fn new(ctx: RunContext<'a, C>, nonces: NonceAllocator, record: DeploymentRecord) -> Self {
        Self {
            ctx,
            nonces,
            registry: ContractRegistry::new(),
            record,
            wiring: Vec::new(),
            _stage: PhantomData,
        }
    }

    /// Deploy or attach every contract, in order.
    pub async fn deploy_contracts(mut self, specs: &[ContractSpec]) -> Result<Run<'a, C, Wiring>> {
        tracing::info!(contracts = specs.len(), "Resolving contracts...");
        DeploymentSequencer::new(&self.ctx)
            .run(specs, &mut self.nonces, &mut self.registry, &mut self.record)
            .await?;
        Ok(self.advance())
    }
}

impl<'a, C: ChainClient> Run<'a, C, Wiring> {
    /// Issue every wiring call, in order.
    pub async fn wire(mut self, steps: &[WiringStep]) -> Result<Run<'a, C, Verification>> {
        tracing::info!(steps = steps.len(), "Wiring contracts...");
        self.wiring = ConfigurationWirer::new(&self.ctx)
            .run(steps, &mut self.nonces, &self.registry, &mut self.record)
            .await?;
        Ok(self.advance())
    }
}

impl<'a, C: ChainClient> Run<'a, C, Verification> {
    /// Submit every resolved contract to `service`. Never fails.
    pub async fn verify<V: SourceVerifier>(self, service: &V) -> RunSummary {
        tracing::info!(contracts = self.registry.len(), "Verifying contracts...");
        let report = Verifier::new(service, self.ctx.pacing)
            .verify_all(self.registry.iter())
            .await;
        self.summarize(Some(report))
    }

    /// End the run without verification.
    pub fn finish(self) -> RunSummary {
        tracing::info!("Verification not requested");
        self.summarize(None)
    }

    fn summarize(self, verification: Option<VerificationReport>) -> RunSummary {
        RunSummary {
            chain_id: self.record.chain_id,
            signer: self.nonces.account(),
            initial_nonce: self.nonces.initial(),
            next_nonce: self.nonces.peek(),
            contracts: self.registry.iter().map(ContractRecord::from).collect(),
            wiring: self.wiring,
            verification,
        }
    }
}

/// Validate `plan` then run every stage. Verification runs only when `verifier` is set.
pub async fn execute_plan<C: ChainClient, V: SourceVerifier>(
    plan: &DeploymentPlan,
    ctx: RunContext<'_, C>,
    nonces: NonceAllocator,
    record: DeploymentRecord,
    verifier: Option<&V>,
) -> Result<RunSummary> {
    plan.validate().context("Invalid deployment plan")?;

    tracing::info!(
        contracts = plan.contracts.len(),
        deployments = plan.deploy_count(),
        wiring = plan.wiring.len(),
        first_nonce = nonces.peek(),
        "Executing deployment plan"
    );

    let run = Run::new(ctx, nonces, record)
        .deploy_contracts(&plan.contracts)
        .await?
        .wire(&plan.wiring)
        .await?;

    Ok(match verifier {
        Some(service) => run.verify(service).await,
        None => run.finish(),
    })
}
