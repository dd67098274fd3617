//! launchpad-deploy - Deployment library for sets of interdependent EVM contracts.
//!
//! A [`DeploymentPlan`] lists contracts to deploy or attach, in dependency order,
//! followed by wiring calls that connect them. A run allocates nonces locally from a
//! single signer, records every step in `deployments.json`, and finishes with a
//! best-effort source verification pass.

mod deployer;
pub use deployer::{DeployOptions, Deployer, LAUNCHPAD_CONFIG_FILENAME};

mod builder;
pub use builder::{DEFAULT_ARTIFACTS_PATH, DEFAULT_PLAN_PATH, DeployerBuilder, OutDataPath};

pub mod traits;
pub use traits::{
    ChainClient, Run, RunContext, SourceVerifier, TransactionReceipt, VerificationRequest,
    VerificationStatus, execute_plan,
};

mod artifact;
pub use artifact::{Artifact, ArtifactName, ArtifactStore, BuildInfo};

mod broadcast;
pub use broadcast::{ContractDeployer, ContractFetcher, TransactionSettings, send_transaction};

mod fs;
pub use fs::{FsHandler, LOCK_FILENAME, OutdataLock};

mod nonce;
pub use nonce::NonceAllocator;

mod pacing;
pub use pacing::Pacing;

mod plan;
pub use plan::{Acquisition, ArgTemplate, ContractSpec, DeploymentPlan, StepRef, WiringStep};

mod record;
pub use record::{ContractRecord, DeploymentRecord, RECORD_FILENAME, WiringRecord};

mod registry;
pub use registry::{AcquisitionMode, ArgValue, ContractRegistry, DeployedContract};

pub mod rpc;
pub use rpc::RpcChain;

mod sequencer;
pub use sequencer::DeploymentSequencer;

mod signer;
pub use signer::{AccountSigner, LegacyTransaction, SignerSource};

mod summary;
pub use summary::{PlanPreview, PreviewStep, RunSummary};

mod verify;
pub use verify::{
    EtherscanVerifier, ExplorerConfig, VerificationEntry, VerificationOutcome,
    VerificationReport, Verifier,
};

mod wirer;
pub use wirer::ConfigurationWirer;
