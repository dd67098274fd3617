use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use launchpad_deploy::{DEFAULT_ARTIFACTS_PATH, DEFAULT_PLAN_PATH, SignerSource};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutData {
    TempDir,
    #[strum(default)]
    Path(String),
}

#[derive(Parser)]
#[command(name = "launchpad")]
#[command(
    author,
    version,
    about = "Deploy and wire a set of interdependent EVM contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "LAUNCHPAD_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    /// Path to an existing Launchpad.toml configuration file (or its directory) to load.
    ///
    /// When provided, the run uses the configuration from this file, overridden by
    /// `LAUNCHPAD_*` environment variables, instead of the flags below.
    #[arg(long, alias = "conf", env = "LAUNCHPAD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// The JSON-RPC endpoint of the target chain.
    #[arg(long, alias = "rpc", env = "LAUNCHPAD_RPC_URL", global = true)]
    pub rpc_url: Option<Url>,

    /// The expected chain id. The run aborts if the node reports another one.
    #[arg(long, env = "LAUNCHPAD_CHAIN_ID", global = true)]
    pub chain_id: Option<u64>,

    /// The deployment plan.
    #[arg(long, env = "LAUNCHPAD_PLAN", default_value = DEFAULT_PLAN_PATH, global = true)]
    pub plan: PathBuf,

    /// The root of the compiled Hardhat artifacts.
    #[arg(long, env = "LAUNCHPAD_ARTIFACTS", default_value = DEFAULT_ARTIFACTS_PATH, global = true)]
    pub artifacts: PathBuf,

    /// The path to the output data directory (`temp-dir` for a temporary one).
    ///
    /// If not provided, the data will be stored at: ./data-<chain-id>
    #[arg(long, alias = "outdata", env = "LAUNCHPAD_OUTDATA", global = true)]
    pub outdata: Option<OutData>,

    /// API endpoint of an Etherscan-compatible explorer, for source verification.
    #[arg(long, env = "LAUNCHPAD_EXPLORER_URL", global = true)]
    pub explorer_url: Option<Url>,

    #[clap(flatten)]
    pub secrets: Secrets,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Deploy, wire and verify every contract of the plan.
    Deploy {
        /// Continue from the deployment record in the output directory.
        #[arg(long, env = "LAUNCHPAD_RESUME")]
        resume: bool,

        /// Skip source verification.
        #[arg(long)]
        no_verify: bool,
    },
    /// Validate the plan and print the nonce and address of every step, without broadcasting.
    Plan,
    /// Verify the contracts of an existing deployment record.
    Verify,
}

/// Keys and API keys. Never written to the configuration file.
#[derive(Clone, Args)]
pub struct Secrets {
    /// Hex-encoded private key of the deploying account.
    #[arg(long, env = "LAUNCHPAD_PRIVATE_KEY", hide_env_values = true, conflicts_with = "mnemonic", global = true)]
    pub private_key: Option<String>,

    /// BIP-39 mnemonic of the deploying account.
    #[arg(long, env = "LAUNCHPAD_MNEMONIC", hide_env_values = true, global = true)]
    pub mnemonic: Option<String>,

    /// Derivation index of the account in the mnemonic.
    #[arg(long, env = "LAUNCHPAD_MNEMONIC_INDEX", default_value_t = 0, global = true)]
    pub mnemonic_index: u32,

    /// API key of the block explorer.
    #[arg(long, env = "LAUNCHPAD_EXPLORER_API_KEY", hide_env_values = true, global = true)]
    pub explorer_api_key: Option<String>,
}

impl Secrets {
    pub fn signer_source(&self) -> anyhow::Result<SignerSource> {
        match (&self.private_key, &self.mnemonic) {
            (Some(key), _) => Ok(SignerSource::PrivateKey(key.clone())),
            (None, Some(phrase)) => Ok(SignerSource::Mnemonic {
                phrase: phrase.clone(),
                index: self.mnemonic_index,
            }),
            (None, None) => {
                anyhow::bail!("A signer is required: pass --private-key or --mnemonic")
            }
        }
    }
}
