//! Builder module for creating a [`Deployer`] configuration.
//!
//! This module provides the [`DeployerBuilder`] struct which simplifies the creation
//! of a [`Deployer`] by handling output directory creation and chain id discovery.

use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;

use crate::{
    Deployer, Pacing, TransactionSettings, fs::FsHandler, rpc::RpcChain, traits::ChainClient,
    verify::ExplorerConfig,
};

/// Specifies how the output data directory should be created.
#[derive(Debug, Clone)]
pub enum OutDataPath {
    /// Use a temporary directory.
    TempDir,
    /// Use a specific path.
    Path(PathBuf),
}

/// Builder for creating a [`Deployer`] configuration.
///
/// This builder handles:
/// - Chain id discovery from the RPC endpoint (if not provided)
/// - Output data directory creation
///
/// # Example
///
/// ```no_run
/// use launchpad_deploy::DeployerBuilder;
///
/// # async fn example() -> anyhow::Result<()> {
/// let deployer = DeployerBuilder::new("https://mainnet.base.org".parse()?)
///     .chain_id(8453)
///     .plan("deploy/plan.toml")
///     .artifacts("artifacts")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeployerBuilder {
    /// The RPC URL of the target chain (required).
    rpc_url: Url,
    /// The expected chain id (optional, fetched from the RPC if not provided).
    chain_id: Option<u64>,
    /// Path to the plan file.
    plan: PathBuf,
    /// Root of the compiled artifacts.
    artifacts: PathBuf,
    /// The output data path specification.
    outdata: Option<OutDataPath>,
    pacing: Pacing,
    transactions: TransactionSettings,
    explorer: Option<ExplorerConfig>,
}

/// Default plan file.
pub const DEFAULT_PLAN_PATH: &str = "plan.toml";

/// Default artifacts root (Hardhat layout).
pub const DEFAULT_ARTIFACTS_PATH: &str = "artifacts";

impl DeployerBuilder {
    /// Create a new [`DeployerBuilder`] with the required RPC URL.
    pub fn new(rpc_url: Url) -> Self {
        Self {
            rpc_url,
            chain_id: None,
            plan: PathBuf::from(DEFAULT_PLAN_PATH),
            artifacts: PathBuf::from(DEFAULT_ARTIFACTS_PATH),
            outdata: None,
            pacing: Pacing::default(),
            transactions: TransactionSettings::default(),
            explorer: None,
        }
    }

    /// Set the expected chain id.
    ///
    /// If not set, the chain id reported by the RPC endpoint is used.
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn plan(mut self, path: impl Into<PathBuf>) -> Self {
        self.plan = path.into();
        self
    }

    pub fn artifacts(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifacts = path.into();
        self
    }

    /// Set the output data directory path.
    ///
    /// If not set, defaults to `./data-<chain-id>`.
    pub fn outdata(mut self, outdata: OutDataPath) -> Self {
        self.outdata = Some(outdata);
        self
    }

    /// Set the output data directory to a specific path.
    pub fn outdata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.outdata = Some(OutDataPath::Path(path.into()));
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn transactions(mut self, transactions: TransactionSettings) -> Self {
        self.transactions = transactions;
        self
    }

    /// Enable source verification on an Etherscan-compatible explorer.
    pub fn explorer(mut self, explorer: ExplorerConfig) -> Self {
        self.explorer = Some(explorer);
        self
    }

    /// Build the [`Deployer`] configuration.
    ///
    /// This method:
    /// 1. Fetches the chain id from the RPC endpoint if not provided
    /// 2. Creates the output data directory if it doesn't exist
    pub async fn build(self) -> Result<Deployer> {
        let chain_id = match self.chain_id {
            Some(chain_id) => chain_id,
            None => RpcChain::new(self.rpc_url.clone())?
                .chain_id()
                .await
                .context("Failed to fetch the chain id from the RPC endpoint")?,
        };

        // Determine output data path
        let outdata_path = match self.outdata {
            None => PathBuf::from(format!("data-{chain_id}")),
            Some(OutDataPath::TempDir) => {
                let temp_dir = tempdir::TempDir::new("data-launchpad-")
                    .context("Failed to create temporary directory")?;
                // The directory outlives the builder.
                temp_dir.into_path()
            }
            Some(OutDataPath::Path(path)) => path,
        };

        let outdata_path = FsHandler::create_outdata_directory(&outdata_path)?;

        tracing::info!(
            rpc_url = %self.rpc_url,
            chain_id,
            plan = %self.plan.display(),
            outdata_path = %outdata_path.display(),
            "Building deployer configuration..."
        );

        Ok(Deployer {
            rpc_url: self.rpc_url,
            chain_id,
            plan: self.plan,
            artifacts: self.artifacts,
            outdata: outdata_path,
            pacing: self.pacing,
            transactions: self.transactions,
            explorer: self.explorer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        "http://localhost:8545".parse().unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let builder = DeployerBuilder::new(url());
        assert!(builder.chain_id.is_none());
        assert!(builder.outdata.is_none());
        assert!(builder.explorer.is_none());
        assert_eq!(builder.plan, PathBuf::from(DEFAULT_PLAN_PATH));
        assert_eq!(builder.pacing, Pacing::default());
    }

    #[tokio::test]
    async fn test_build_with_known_chain_id() {
        let deployer = DeployerBuilder::new(url())
            .chain_id(31337)
            .plan("deploy/plan.toml")
            .outdata(OutDataPath::TempDir)
            .pacing(Pacing::none())
            .build()
            .await
            .unwrap();

        assert_eq!(deployer.chain_id, 31337);
        assert_eq!(deployer.plan, PathBuf::from("deploy/plan.toml"));
        assert!(deployer.outdata.is_dir());
        assert_eq!(deployer.pacing, Pacing::none());

        std::fs::remove_dir_all(&deployer.outdata).unwrap();
    }
}
