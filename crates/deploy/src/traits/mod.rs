//! Trait seams and type-state runner of a deployment run.
//!
//! A run follows a fixed stage order: Sequencing -> Wiring -> Verification.
//!
//! # Example
//!
//! ```no_run
//! use launchpad_deploy::{DeploymentPlan, DeploymentRecord, NonceAllocator, Run, RunContext};
//! # use launchpad_deploy::{ChainClient, SourceVerifier};
//!
//! # async fn example<C: ChainClient, V: SourceVerifier>(
//! #     plan: DeploymentPlan,
//! #     ctx: RunContext<'_, C>,
//! #     nonces: NonceAllocator,
//! #     record: DeploymentRecord,
//! #     verifier: &V,
//! # ) -> anyhow::Result<()> {
//! let summary = Run::new(ctx, nonces, record)
//!     .deploy_contracts(&plan.contracts)
//!     .await?
//!     .wire(&plan.wiring)
//!     .await?
//!     .verify(verifier)
//!     .await;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

mod chain;
mod context;
mod runner;
mod stages;
mod verifier;

pub use chain::{ChainClient, TransactionReceipt};
pub use context::RunContext;
pub use runner::{Run, execute_plan};
pub use stages::{NextStage, RunStage, Sequencing, Verification, Wiring};
pub use verifier::{SourceVerifier, VerificationRequest, VerificationStatus};
