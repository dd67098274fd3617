//! Persistent record of a run, written after every step.
//!
//! The record lets an operator see exactly which contracts exist after a partial run,
//! and lets `--resume` attach to them instead of deploying them again.

use std::path::{Path, PathBuf};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    artifact::ArtifactName,
    plan::{Acquisition, DeploymentPlan, WiringStep},
    registry::{AcquisitionMode, ArgValue, DeployedContract},
};

/// The record file name inside the output directory.
pub const RECORD_FILENAME: &str = "deployments.json";

/// One resolved contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: String,
    pub artifact: ArtifactName,
    pub address: Address,
    pub mode: AcquisitionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    #[serde(default)]
    pub constructor_args: Vec<ArgValue>,
    #[serde(default = "default_verify")]
    pub verify: bool,
}

fn default_verify() -> bool {
    true
}

impl From<&DeployedContract> for ContractRecord {
    fn from(contract: &DeployedContract) -> Self {
        Self {
            id: contract.id.clone(),
            artifact: contract.interface.name().clone(),
            address: contract.address,
            mode: contract.mode(),
            nonce: contract.nonce,
            tx_hash: contract.tx_hash,
            constructor_args: contract.constructor_args.clone(),
            verify: contract.verify,
        }
    }
}

/// One completed wiring call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringRecord {
    /// Position of the step in the plan's wiring list.
    pub index: usize,
    pub target: String,
    /// Address the call was sent to.
    #[serde(default)]
    pub target_address: Address,
    pub method: String,
    #[serde(default)]
    pub args: Vec<ArgValue>,
    pub nonce: u64,
    pub tx_hash: B256,
}

impl WiringRecord {
    /// Whether this record is the call `step` at position `index` would send now:
    /// same target contract and address, same method, same resolved arguments.
    pub fn matches(
        &self,
        index: usize,
        step: &WiringStep,
        target_address: Address,
        args: &[ArgValue],
    ) -> bool {
        self.index == index
            && self.target == step.target
            && self.target_address == target_address
            && self.method == step.method
            && self.args == args
    }
}

/// Everything a run resolved and broadcast so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Fingerprint of the plan that produced this record.
    pub plan_fingerprint: String,
    pub chain_id: u64,
    pub signer: Address,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub launchpad_version: String,
    #[serde(default)]
    pub contracts: Vec<ContractRecord>,
    #[serde(default)]
    pub wiring: Vec<WiringRecord>,

    /// Where every update is persisted. In-memory only when unset.
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl DeploymentRecord {
    /// A fresh record that is not persisted anywhere.
    pub fn new(plan_fingerprint: impl Into<String>, chain_id: u64, signer: Address) -> Self {
        let now = Utc::now();
        Self {
            plan_fingerprint: plan_fingerprint.into(),
            chain_id,
            signer,
            started_at: now,
            updated_at: now,
            launchpad_version: env!("CARGO_PKG_VERSION").to_string(),
            contracts: Vec::new(),
            wiring: Vec::new(),
            path: None,
        }
    }

    /// Persist every following update to `path`.
    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load a record and keep persisting updates to the same file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment record {}", path.display()))?;
        let record: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployment record {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            contracts = record.contracts.len(),
            wiring = record.wiring.len(),
            "Deployment record loaded"
        );
        Ok(record.persist_to(path))
    }

    /// Write the record to its file, if it has one.
    pub fn save(&mut self) -> Result<()> {
        self.updated_at = Utc::now();

        let Some(path) = &self.path else {
            return Ok(());
        };

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment record")?;

        // The file on disk is always a complete record.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to write deployment record {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Deployment record saved");
        Ok(())
    }

    pub fn contract(&self, id: &str) -> Option<&ContractRecord> {
        self.contracts.iter().find(|c| c.id == id)
    }

    /// Record a resolved contract and persist.
    ///
    /// A contract already recorded at the same address keeps its original entry, so a
    /// resumed run does not lose the nonce and transaction of the first deployment.
    pub fn record_contract(&mut self, contract: &DeployedContract) -> Result<()> {
        match self.contracts.iter().position(|c| c.id == contract.id) {
            Some(i) if self.contracts[i].address == contract.address => return Ok(()),
            Some(i) => self.contracts[i] = ContractRecord::from(contract),
            None => self.contracts.push(ContractRecord::from(contract)),
        }
        self.save()
    }

    /// Record a completed wiring step and persist.
    pub fn record_wiring(&mut self, wiring: WiringRecord) -> Result<()> {
        self.wiring.retain(|w| w.index != wiring.index);
        self.wiring.push(wiring);
        self.save()
    }

    /// The record of `step` at position `index`, if the identical call already completed.
    pub fn completed_wiring(
        &self,
        index: usize,
        step: &WiringStep,
        target_address: Address,
        args: &[ArgValue],
    ) -> Option<&WiringRecord> {
        self.wiring
            .iter()
            .find(|w| w.matches(index, step, target_address, args))
    }

    /// Rewrite `plan` so every contract deployed by an earlier run is attached instead.
    pub fn resume(&self, mut plan: DeploymentPlan) -> DeploymentPlan {
        for spec in plan.contracts.iter_mut() {
            if !spec.acquire.is_deploy() {
                continue;
            }
            if let Some(recorded) = self.contract(&spec.id) {
                tracing::info!(
                    contract = %spec.id,
                    address = %recorded.address,
                    "Already deployed by an earlier run, attaching"
                );
                spec.acquire = Acquisition::Attach(recorded.address);
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ArgTemplate, ContractSpec};
    use tempdir::TempDir;

    fn artifact(s: &str) -> ArtifactName {
        s.parse().unwrap()
    }

    fn deployed(id: &str, address: Address, nonce: u64) -> ContractRecord {
        ContractRecord {
            id: id.to_string(),
            artifact: artifact(&format!("contracts/{id}.sol:{id}")),
            address,
            mode: AcquisitionMode::Deploy,
            nonce: Some(nonce),
            tx_hash: Some(B256::repeat_byte(nonce as u8)),
            constructor_args: vec![],
            verify: true,
        }
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new("launchpad-record").unwrap();
        let path = tmp.path().join(RECORD_FILENAME);

        let mut record =
            DeploymentRecord::new("abc", 8453, Address::repeat_byte(1)).persist_to(&path);
        record
            .contracts
            .push(deployed("HigherFactory", Address::repeat_byte(2), 10));
        record
            .record_wiring(WiringRecord {
                index: 0,
                target: "HigherFactory".into(),
                target_address: Address::repeat_byte(2),
                method: "setCanCreatePair".into(),
                args: vec![ArgValue::Literal("true".into())],
                nonce: 11,
                tx_hash: B256::repeat_byte(11),
            })
            .unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = DeploymentRecord::load(&path).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.path(), Some(path.as_path()));
    }

    #[test]
    fn test_in_memory_record_is_not_written() {
        let mut record = DeploymentRecord::new("abc", 1, Address::ZERO);
        record.save().unwrap();
        assert!(record.path().is_none());
    }

    #[test]
    fn test_resume_converts_recorded_deploys() {
        let a = Address::repeat_byte(0xa);
        let mut record = DeploymentRecord::new("abc", 1, Address::ZERO);
        record.contracts.push(deployed("A", a, 10));

        let plan = DeploymentPlan {
            contracts: vec![
                ContractSpec::deploy("A", artifact("contracts/A.sol:A"), vec![]),
                ContractSpec::deploy(
                    "B",
                    artifact("contracts/B.sol:B"),
                    vec![ArgTemplate::AddressOf("A".into())],
                ),
            ],
            wiring: vec![],
        };

        let resumed = record.resume(plan);
        assert_eq!(resumed.contracts[0].acquire, Acquisition::Attach(a));
        assert_eq!(resumed.contracts[1].acquire, Acquisition::Deploy);
        assert_eq!(resumed.deploy_count(), 1);
    }

    #[test]
    fn test_completed_wiring_matches_the_resolved_call() {
        let database = Address::repeat_byte(0xd);
        let router = ArgValue::Address(Address::repeat_byte(0xe));

        let mut record = DeploymentRecord::new("abc", 1, Address::ZERO);
        record.wiring.push(WiringRecord {
            index: 1,
            target: "HigherDatabase".into(),
            target_address: database,
            method: "setRouter".into(),
            args: vec![router.clone()],
            nonce: 5,
            tx_hash: B256::ZERO,
        });

        let step = WiringStep::new("HigherDatabase", "setRouter", vec![]);
        let args = [router];
        assert!(record.completed_wiring(1, &step, database, &args).is_some());
        assert!(record.completed_wiring(0, &step, database, &args).is_none());

        let other = WiringStep::new("HigherDatabase", "setFeeRecipient", vec![]);
        assert!(record.completed_wiring(1, &other, database, &args).is_none());

        // Another target address or other arguments mean the call must be sent again.
        let moved = Address::repeat_byte(0xf);
        assert!(record.completed_wiring(1, &step, moved, &args).is_none());
        let new_router = [ArgValue::Address(Address::repeat_byte(0x77))];
        assert!(record.completed_wiring(1, &step, database, &new_router).is_none());
    }
}
