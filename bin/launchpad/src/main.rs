//! launchpad is a CLI tool to deploy and wire a set of interdependent EVM contracts.

mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use cli::{Cli, Command, OutData};
use launchpad_deploy::{
    DeployOptions, Deployer, DeployerBuilder, ExplorerConfig, OutDataPath, Pacing, RpcChain,
    TransactionSettings,
};

/// Environment variables read by clap that are not configuration keys.
const NON_CONFIG_ENV: &[&str] = &[
    "verbosity",
    "config",
    "private_key",
    "mnemonic",
    "mnemonic_index",
    "explorer_api_key",
    "explorer_url",
    "resume",
];

/// Layer defaults < TOML file < `LAUNCHPAD_*` environment.
fn load_config(path: &Path) -> Result<Deployer> {
    let config_path = Deployer::config_path(path);
    if !config_path.exists() {
        anyhow::bail!(
            "Configuration file or directory not found: {}",
            path.display()
        );
    }

    let deployer = Figment::new()
        .merge(Serialized::default("pacing", Pacing::default()))
        .merge(Serialized::default(
            "transactions",
            TransactionSettings::default(),
        ))
        .merge(Toml::file(&config_path))
        .merge(
            Env::prefixed("LAUNCHPAD_")
                .ignore(NON_CONFIG_ENV)
                .split("__"),
        )
        .extract::<Deployer>()
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    tracing::info!(path = %config_path.display(), "Configuration loaded");
    Ok(deployer)
}

async fn build_deployer(cli: &Cli) -> Result<Deployer> {
    // If a config file is provided, load it.
    if let Some(config_path) = &cli.config {
        let deployer = load_config(config_path)?;

        if let Some(expected) = cli.chain_id {
            if expected != deployer.chain_id {
                anyhow::bail!(
                    "--chain-id {expected} does not match the configured chain id {}",
                    deployer.chain_id
                );
            }
        }

        tracing::info!(
            config_path = %config_path.display(),
            outdata_path = %deployer.outdata.display(),
            chain_id = deployer.chain_id,
            rpc_url = %deployer.rpc_url,
            "Loading deployment from config file..."
        );

        return Ok(deployer);
    }

    // Otherwise, create a new configuration from CLI arguments.
    let rpc_url = cli
        .rpc_url
        .clone()
        .context("Either --config or --rpc-url is required")?;

    let mut builder = DeployerBuilder::new(rpc_url)
        .plan(&cli.plan)
        .artifacts(&cli.artifacts);

    if let Some(chain_id) = cli.chain_id {
        builder = builder.chain_id(chain_id);
    }

    if let Some(outdata) = &cli.outdata {
        let outdata_path = match outdata {
            OutData::TempDir => OutDataPath::TempDir,
            OutData::Path(path) => OutDataPath::Path(PathBuf::from(path)),
        };
        builder = builder.outdata(outdata_path);
    }

    if let Some(explorer_url) = &cli.explorer_url {
        builder = builder.explorer(ExplorerConfig::new(explorer_url.clone()));
    }

    let deployer = builder.build().await?;

    // Save the configuration to Launchpad.toml so the run can be replayed with --config.
    deployer.save_config()?;

    Ok(deployer)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let deployer = build_deployer(&cli).await?;

    match &cli.command {
        Command::Deploy { resume, no_verify } => {
            let options = DeployOptions {
                resume: *resume,
                verify: !no_verify,
            };
            let summary = deployer
                .deploy(
                    cli.secrets.signer_source()?,
                    cli.secrets.explorer_api_key.clone(),
                    options,
                )
                .await?;
            println!("{summary}");
        }
        Command::Plan => {
            let signer = cli
                .secrets
                .signer_source()?
                .into_signer(deployer.chain_id)?;
            let chain = RpcChain::new(deployer.rpc_url.clone())?;
            let preview = deployer.preview(&chain, signer.address()).await?;
            println!("{preview}");
        }
        Command::Verify => {
            let api_key = cli
                .secrets
                .explorer_api_key
                .clone()
                .context("--explorer-api-key is required to verify")?;
            let report = deployer.verify(api_key).await?;
            println!("{report}");

            if report.failed() > 0 {
                anyhow::bail!("{} contracts failed verification", report.failed());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_load_config_fills_defaults() {
        let tmp = TempDir::new("launchpad-cli").unwrap();
        let path = tmp.path().join(launchpad_deploy::LAUNCHPAD_CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
                rpc_url = "http://localhost:8545"
                chain_id = 31337
                plan = "plan.toml"
                artifacts = "artifacts"
                outdata = "data"

                [pacing]
                after_broadcast_ms = 0
            "#,
        )
        .unwrap();

        let deployer = load_config(tmp.path()).unwrap();
        assert_eq!(deployer.chain_id, 31337);
        assert_eq!(deployer.pacing.after_broadcast_ms, 0);
        assert_eq!(
            deployer.pacing.after_read_ms,
            Pacing::default().after_read_ms
        );
        assert_eq!(deployer.transactions, TransactionSettings::default());
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config(Path::new("/nonexistent/Launchpad.toml")).is_err());
    }
}
