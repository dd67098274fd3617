//! Best-effort source verification of the resolved contracts.
//!
//! Nothing in this module can fail a run: every problem becomes a
//! [`VerificationOutcome`] in the returned [`VerificationReport`].

use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    artifact::{ArtifactName, ArtifactStore},
    pacing::Pacing,
    registry::DeployedContract,
    rpc,
    traits::{SourceVerifier, VerificationRequest, VerificationStatus},
};

/// Result of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum VerificationOutcome {
    #[strum(serialize = "verified")]
    Verified,
    #[strum(serialize = "already verified")]
    AlreadyVerified,
    /// The service refused the source.
    #[strum(serialize = "rejected: {0}")]
    Rejected(String),
    /// The request could not be completed (network, missing build info, ...).
    #[strum(serialize = "failed: {0}")]
    Failed(String),
    /// Verification is disabled for this contract.
    #[strum(serialize = "skipped")]
    Skipped,
}

impl VerificationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Verified | Self::AlreadyVerified)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Failed(_))
    }
}

impl From<VerificationStatus> for VerificationOutcome {
    fn from(status: VerificationStatus) -> Self {
        match status {
            VerificationStatus::Verified => Self::Verified,
            VerificationStatus::AlreadyVerified => Self::AlreadyVerified,
            VerificationStatus::Rejected(reason) => Self::Rejected(reason),
        }
    }
}

/// Outcome for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEntry {
    pub contract_id: String,
    pub address: Address,
    pub outcome: VerificationOutcome,
}

/// Outcomes of a verification pass, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub entries: Vec<VerificationEntry>,
}

impl VerificationReport {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_failure()).count()
    }

    pub fn get(&self, contract_id: &str) -> Option<&VerificationOutcome> {
        self.entries
            .iter()
            .find(|e| e.contract_id == contract_id)
            .map(|e| &e.outcome)
    }
}

/// Submits resolved contracts to a [`SourceVerifier`], one at a time.
pub struct Verifier<'a, V> {
    service: &'a V,
    pacing: Pacing,
}

impl<'a, V: SourceVerifier> Verifier<'a, V> {
    pub fn new(service: &'a V, pacing: Pacing) -> Self {
        Self { service, pacing }
    }

    /// Verify every contract in order. Failures are logged and never stop the pass.
    pub async fn verify_all<'c>(
        &self,
        contracts: impl IntoIterator<Item = &'c DeployedContract>,
    ) -> VerificationReport {
        let mut report = VerificationReport::default();

        for contract in contracts {
            let outcome = if contract.verify {
                let outcome = self.verify_one(contract).await;
                self.pacing
                    .after_verification(&format!("contract `{}`", contract.id))
                    .await;
                outcome
            } else {
                VerificationOutcome::Skipped
            };

            report.entries.push(VerificationEntry {
                contract_id: contract.id.clone(),
                address: contract.address,
                outcome,
            });
        }

        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Verification pass complete"
        );

        report
    }

    async fn verify_one(&self, contract: &DeployedContract) -> VerificationOutcome {
        let constructor_args = match contract
            .interface
            .encode_constructor_args(&contract.constructor_args)
        {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(contract = %contract.id, error = %format!("{e:#}"), "Cannot encode constructor arguments for verification");
                return VerificationOutcome::Failed(format!("{e:#}"));
            }
        };

        let request = VerificationRequest {
            contract_id: contract.id.clone(),
            address: contract.address,
            artifact: contract.interface.name().to_string(),
            constructor_args,
        };

        tracing::info!(contract = %contract.id, address = %contract.address, "Submitting for verification...");

        match self.service.verify(&request).await {
            Ok(status) => {
                let outcome = VerificationOutcome::from(status);
                if outcome.is_success() {
                    tracing::info!(contract = %contract.id, %outcome, "Verification done");
                } else {
                    tracing::warn!(contract = %contract.id, %outcome, "Verification rejected");
                }
                outcome
            }
            Err(e) => {
                tracing::warn!(contract = %contract.id, error = %format!("{e:#}"), "Verification failed, continuing");
                VerificationOutcome::Failed(format!("{e:#}"))
            }
        }
    }
}

/// Default interval between two verification status checks.
pub const DEFAULT_STATUS_POLL_INTERVAL_SECS: u64 = 5;

/// Default time to wait for the service to process a submission.
pub const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 120;

/// Etherscan-compatible explorer settings. The API key is never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// API endpoint (`https://api.etherscan.io/v2/api`).
    pub api_url: Url,
    #[serde(default = "default_status_poll_interval_secs")]
    pub status_poll_interval_secs: u64,
    #[serde(default = "default_status_timeout_secs")]
    pub status_timeout_secs: u64,
}

fn default_status_poll_interval_secs() -> u64 {
    DEFAULT_STATUS_POLL_INTERVAL_SECS
}

fn default_status_timeout_secs() -> u64 {
    DEFAULT_STATUS_TIMEOUT_SECS
}

impl ExplorerConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            status_poll_interval_secs: DEFAULT_STATUS_POLL_INTERVAL_SECS,
            status_timeout_secs: DEFAULT_STATUS_TIMEOUT_SECS,
        }
    }

    /// Interval between status checks, and how many checks fit in the timeout.
    fn status_polls(&self) -> (Duration, usize) {
        let interval_secs = self.status_poll_interval_secs.max(1);
        let attempts = (self.status_timeout_secs / interval_secs).max(1) as usize;
        (Duration::from_secs(interval_secs), attempts)
    }
}

/// Response envelope of the Etherscan API.
#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

impl EtherscanResponse {
    fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Interpret a `checkverifystatus` result. `None` while the submission is queued.
fn classify_status(result: &str) -> Option<VerificationStatus> {
    let lower = result.to_lowercase();
    if lower.contains("pending") || lower.contains("in queue") {
        None
    } else if lower.contains("already verified") {
        Some(VerificationStatus::AlreadyVerified)
    } else if lower.starts_with("pass") {
        Some(VerificationStatus::Verified)
    } else {
        Some(VerificationStatus::Rejected(result.to_string()))
    }
}

/// [`SourceVerifier`] for Etherscan-compatible explorers (`verifysourcecode`).
///
/// Submits the Hardhat build-info standard-JSON input of the contract's artifact.
pub struct EtherscanVerifier {
    client: reqwest::Client,
    config: ExplorerConfig,
    api_key: String,
    chain_id: u64,
    artifacts: ArtifactStore,
}

impl EtherscanVerifier {
    pub fn new(
        config: ExplorerConfig,
        api_key: impl Into<String>,
        chain_id: u64,
        artifacts_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            client: rpc::create_client(Duration::from_secs(60))?,
            config,
            api_key: api_key.into(),
            chain_id,
            artifacts: ArtifactStore::new(artifacts_root),
        })
    }

    fn endpoint(&self) -> Url {
        let mut url = self.config.api_url.clone();
        url.query_pairs_mut()
            .append_pair("chainid", &self.chain_id.to_string());
        url
    }

    async fn submit(&self, request: &VerificationRequest) -> Result<SubmitOutcome> {
        let name: ArtifactName = request.artifact.parse()?;
        let build_info = self.artifacts.build_info(&name)?;
        let source = serde_json::to_string(&build_info.input)
            .context("Failed to serialize compiler input")?;

        let form = [
            ("apikey", self.api_key.clone()),
            ("module", "contract".to_string()),
            ("action", "verifysourcecode".to_string()),
            ("contractaddress", request.address.to_string()),
            ("sourceCode", source),
            ("codeformat", "solidity-standard-json-input".to_string()),
            ("contractname", request.artifact.clone()),
            ("compilerversion", format!("v{}", build_info.solc_long_version)),
            // Misspelling required by the API.
            ("constructorArguements", hex::encode(&request.constructor_args)),
        ];

        let response: EtherscanResponse = self
            .client
            .post(self.endpoint())
            .form(&form)
            .send()
            .await
            .context("Failed to submit verification request")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        let result = response.result_text();
        if response.status == "1" {
            return Ok(SubmitOutcome::Queued(result));
        }

        match classify_status(&result) {
            Some(VerificationStatus::AlreadyVerified) => {
                Ok(SubmitOutcome::Done(VerificationStatus::AlreadyVerified))
            }
            _ => Ok(SubmitOutcome::Done(VerificationStatus::Rejected(format!(
                "{}: {}",
                response.message, result
            )))),
        }
    }

    async fn check_status(&self, guid: &str) -> Result<Option<VerificationStatus>> {
        let response: EtherscanResponse = self
            .client
            .get(self.endpoint())
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .context("Failed to query verification status")?
            .json()
            .await
            .context("Failed to parse verification status")?;

        Ok(classify_status(&response.result_text()))
    }
}

enum SubmitOutcome {
    /// Accepted for processing under this GUID.
    Queued(String),
    Done(VerificationStatus),
}

impl SourceVerifier for EtherscanVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationStatus> {
        let guid = match self.submit(request).await? {
            SubmitOutcome::Done(status) => return Ok(status),
            SubmitOutcome::Queued(guid) => guid,
        };

        tracing::debug!(contract = %request.contract_id, guid = %guid, "Verification queued");

        let (interval, attempts) = self.config.status_polls();

        let guid = guid.as_str();
        let check = move || async move {
            self.check_status(guid)
                .await?
                .context("Verification still pending")
        };

        check
            .retry(
                ConstantBuilder::default()
                    .with_delay(interval)
                    .with_max_times(attempts),
            )
            .notify(|err, delay| {
                tracing::trace!(contract = %request.contract_id, error = %err, ?delay, "Verification not finished yet");
            })
            .await
            .with_context(|| {
                format!(
                    "Verification of `{}` did not finish within {}s",
                    request.contract_id, self.config.status_timeout_secs
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status("Pending in queue"), None);
        assert_eq!(
            classify_status("Pass - Verified"),
            Some(VerificationStatus::Verified)
        );
        assert_eq!(
            classify_status("Already Verified"),
            Some(VerificationStatus::AlreadyVerified)
        );
        assert_eq!(
            classify_status("Contract source code already verified"),
            Some(VerificationStatus::AlreadyVerified)
        );
        assert_eq!(
            classify_status("Fail - Unable to verify"),
            Some(VerificationStatus::Rejected(
                "Fail - Unable to verify".to_string()
            ))
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(VerificationOutcome::Verified.to_string(), "verified");
        assert_eq!(
            VerificationOutcome::Failed("timeout".into()).to_string(),
            "failed: timeout"
        );
    }

    #[test]
    fn test_report_counts() {
        let entry = |id: &str, outcome| VerificationEntry {
            contract_id: id.to_string(),
            address: Address::ZERO,
            outcome,
        };
        let report = VerificationReport {
            entries: vec![
                entry("A", VerificationOutcome::Verified),
                entry("B", VerificationOutcome::Failed("boom".into())),
                entry("C", VerificationOutcome::AlreadyVerified),
                entry("D", VerificationOutcome::Skipped),
            ],
        };

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.get("D"), Some(&VerificationOutcome::Skipped));
    }

    #[test]
    fn test_endpoint_carries_chain_id() {
        let verifier = EtherscanVerifier::new(
            ExplorerConfig::new("https://api.etherscan.io/v2/api".parse().unwrap()),
            "key",
            8453,
            "artifacts",
        )
        .unwrap();

        assert_eq!(
            verifier.endpoint().as_str(),
            "https://api.etherscan.io/v2/api?chainid=8453"
        );
    }

    #[test]
    fn test_explorer_config_defaults() {
        let config: ExplorerConfig =
            toml::from_str(r#"api_url = "https://api.basescan.org/api""#).unwrap();
        assert_eq!(config.status_poll_interval_secs, DEFAULT_STATUS_POLL_INTERVAL_SECS);
        assert_eq!(config.status_timeout_secs, DEFAULT_STATUS_TIMEOUT_SECS);
    }

    #[test]
    fn test_status_polls_fit_in_timeout() {
        let mut config = ExplorerConfig::new("https://api.basescan.org/api".parse().unwrap());
        assert_eq!(
            config.status_polls(),
            (
                Duration::from_secs(DEFAULT_STATUS_POLL_INTERVAL_SECS),
                (DEFAULT_STATUS_TIMEOUT_SECS / DEFAULT_STATUS_POLL_INTERVAL_SECS) as usize
            )
        );

        // A zero interval is clamped, a short timeout still allows one check.
        config.status_poll_interval_secs = 0;
        config.status_timeout_secs = 0;
        assert_eq!(config.status_polls(), (Duration::from_secs(1), 1));
    }
}
