use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    AccountSigner, ArtifactStore, NonceAllocator, Pacing, SignerSource, TransactionSettings,
    fs::{FsHandler, OutdataLock},
    plan::DeploymentPlan,
    record::{DeploymentRecord, RECORD_FILENAME},
    registry::DeployedContract,
    rpc::RpcChain,
    summary::{PlanPreview, RunSummary},
    traits::{ChainClient, RunContext, SourceVerifier, execute_plan},
    verify::{EtherscanVerifier, ExplorerConfig, VerificationReport, Verifier},
};

/// The default name for the launchpad configuration file.
pub const LAUNCHPAD_CONFIG_FILENAME: &str = "Launchpad.toml";

/// Options of a single `deploy` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    /// Continue from the deployment record in the output directory.
    pub resume: bool,
    /// Run the verification stage after wiring.
    pub verify: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            resume: false,
            verify: true,
        }
    }
}

/// Main deployer that runs a deployment plan against a chain.
///
/// This struct contains all the non-secret configuration of a run and can be
/// serialized to/from TOML format. Keys and API keys are passed to each call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployer {
    /// JSON-RPC endpoint of the target chain.
    pub rpc_url: Url,
    /// The chain id the node must report.
    pub chain_id: u64,
    /// Path to the deployment plan (TOML).
    pub plan: PathBuf,
    /// Root of the compiled artifacts.
    pub artifacts: PathBuf,
    /// Path to the output data directory.
    pub outdata: PathBuf,

    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default)]
    pub transactions: TransactionSettings,

    /// Block explorer used for source verification (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer: Option<ExplorerConfig>,
}

impl Deployer {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployer config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from `Launchpad.toml` inside a directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = Self::config_path(path);

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// `path` itself, or `Launchpad.toml` inside it when it is a directory.
    pub fn config_path(path: &Path) -> PathBuf {
        if path.is_dir() {
            path.join(LAUNCHPAD_CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        }
    }

    /// Save the deployer's configuration to the default location (Launchpad.toml in outdata).
    pub fn save_config(&self) -> Result<PathBuf> {
        let outdata = FsHandler::create_outdata_directory(&self.outdata)?;
        let config_path = outdata.join(LAUNCHPAD_CONFIG_FILENAME);
        self.save_to_file(&config_path)?;
        Ok(config_path)
    }

    pub fn record_path(&self) -> PathBuf {
        self.outdata.join(RECORD_FILENAME)
    }
}

impl Deployer {
    /// Run the plan against the configured RPC endpoint.
    ///
    /// Verification needs both an `explorer` section and an API key; without either
    /// it is skipped with a warning.
    pub async fn deploy(
        &self,
        signer: SignerSource,
        explorer_api_key: Option<String>,
        options: DeployOptions,
    ) -> Result<RunSummary> {
        let chain = RpcChain::new(self.rpc_url.clone())?;
        let signer = signer.into_signer(self.chain_id)?;

        let verifier = if options.verify {
            self.explorer_verifier(explorer_api_key)?
        } else {
            tracing::info!("Verification disabled");
            None
        };

        self.deploy_with(&chain, &signer, verifier.as_ref(), options.resume)
            .await
    }

    /// Run the plan with explicit chain and verification backends.
    pub async fn deploy_with<C: ChainClient, V: SourceVerifier>(
        &self,
        chain: &C,
        signer: &AccountSigner,
        verifier: Option<&V>,
        resume: bool,
    ) -> Result<RunSummary> {
        tracing::info!(
            rpc_url = %self.rpc_url,
            chain_id = self.chain_id,
            signer = %signer.address(),
            plan = %self.plan.display(),
            "Starting deployment process..."
        );

        self.check_chain_id(chain).await?;

        let outdata = FsHandler::create_outdata_directory(&self.outdata)?;
        let _lock = OutdataLock::acquire(&outdata)?;

        let plan = DeploymentPlan::load(&self.plan)?;
        plan.validate().context("Invalid deployment plan")?;
        let fingerprint = plan.fingerprint()?;

        let record_path = outdata.join(RECORD_FILENAME);
        let (plan, mut record) = if resume && record_path.exists() {
            let record = DeploymentRecord::load(&record_path)?;
            self.check_record(&record, signer.address())?;
            if record.plan_fingerprint != fingerprint {
                tracing::warn!(
                    recorded = %record.plan_fingerprint,
                    current = %fingerprint,
                    "The plan changed since the recorded run"
                );
            }
            (record.resume(plan), record)
        } else {
            if resume {
                tracing::warn!(path = %record_path.display(), "No deployment record to resume from, starting from scratch");
            } else if record_path.exists() {
                tracing::warn!(path = %record_path.display(), "Replacing the previous deployment record");
            }
            let record = DeploymentRecord::new(fingerprint, self.chain_id, signer.address())
                .persist_to(&record_path);
            (plan, record)
        };
        record.save()?;

        let mut artifacts = ArtifactStore::new(&self.artifacts);
        artifacts
            .preload(plan.artifact_names())
            .context("Failed to load the plan's artifacts")?;

        let nonces = NonceAllocator::init(chain, signer.address()).await?;

        let ctx = RunContext {
            chain,
            signer,
            artifacts: &artifacts,
            pacing: self.pacing,
            transactions: &self.transactions,
        };

        let summary = execute_plan(&plan, ctx, nonces, record, verifier).await?;

        tracing::info!(
            contracts = summary.contracts.len(),
            wiring = summary.wiring.len(),
            record = %record_path.display(),
            "✓ Deployment complete!"
        );

        Ok(summary)
    }

    /// Predict nonces and addresses of the plan for `signer` without broadcasting.
    pub async fn preview<C: ChainClient>(&self, chain: &C, signer: Address) -> Result<PlanPreview> {
        self.check_chain_id(chain).await?;

        let plan = DeploymentPlan::load(&self.plan)?;
        plan.validate().context("Invalid deployment plan")?;

        ArtifactStore::new(&self.artifacts)
            .preload(plan.artifact_names())
            .context("Failed to load the plan's artifacts")?;

        let nonces = NonceAllocator::init(chain, signer).await?;
        Ok(PlanPreview::new(&plan, signer, nonces.peek()))
    }

    /// Verify the contracts of the existing record using the configured explorer.
    pub async fn verify(&self, explorer_api_key: String) -> Result<VerificationReport> {
        let Some(verifier) = self.explorer_verifier(Some(explorer_api_key))? else {
            anyhow::bail!("No `explorer` section in the configuration");
        };
        self.verify_recorded(&verifier).await
    }

    /// Verify every contract of the existing record with `service`.
    pub async fn verify_recorded<V: SourceVerifier>(
        &self,
        service: &V,
    ) -> Result<VerificationReport> {
        let record = DeploymentRecord::load(&self.record_path())?;
        if record.chain_id != self.chain_id {
            anyhow::bail!(
                "The deployment record is for chain {}, the configuration targets chain {}",
                record.chain_id,
                self.chain_id
            );
        }

        let mut artifacts = ArtifactStore::new(&self.artifacts);
        let contracts = record
            .contracts
            .iter()
            .map(|c| {
                Ok(DeployedContract {
                    id: c.id.clone(),
                    address: c.address,
                    interface: artifacts.load(&c.artifact)?,
                    nonce: c.nonce,
                    tx_hash: c.tx_hash,
                    constructor_args: c.constructor_args.clone(),
                    verify: c.verify,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Verifier::new(service, self.pacing)
            .verify_all(&contracts)
            .await)
    }

    fn explorer_verifier(&self, api_key: Option<String>) -> Result<Option<EtherscanVerifier>> {
        match (&self.explorer, api_key) {
            (Some(config), Some(api_key)) => Ok(Some(EtherscanVerifier::new(
                config.clone(),
                api_key,
                self.chain_id,
                &self.artifacts,
            )?)),
            (Some(_), None) => {
                tracing::warn!("No explorer API key provided, verification skipped");
                Ok(None)
            }
            (None, _) => {
                tracing::info!("No explorer configured, verification skipped");
                Ok(None)
            }
        }
    }

    async fn check_chain_id<C: ChainClient>(&self, chain: &C) -> Result<()> {
        let actual = chain
            .chain_id()
            .await
            .context("Failed to fetch the chain id")?;
        if actual != self.chain_id {
            anyhow::bail!(
                "Chain id mismatch: the node at {} reports {actual}, expected {}",
                self.rpc_url,
                self.chain_id
            );
        }
        Ok(())
    }

    fn check_record(&self, record: &DeploymentRecord, signer: Address) -> Result<()> {
        if record.chain_id != self.chain_id {
            anyhow::bail!(
                "Cannot resume: the deployment record is for chain {}, not {}",
                record.chain_id,
                self.chain_id
            );
        }
        if record.signer != signer {
            anyhow::bail!(
                "Cannot resume: the deployment record was signed by {}, not {signer}",
                record.signer
            );
        }
        Ok(())
    }
}
