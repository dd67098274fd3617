//! The operator-supplied deployment plan.
//!
//! A plan is an ordered list of contract specs followed by an ordered list of wiring
//! steps. Arguments may only reference contracts declared earlier in the plan, so the
//! dependency graph is acyclic by construction.

use std::{collections::HashMap, path::Path};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifact::ArtifactName;

/// Template of one constructor or method argument, resolved right before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgTemplate {
    /// A literal coerced to the ABI parameter type.
    Literal(String),
    /// The resolved address of an earlier contract.
    AddressOf(String),
    /// The signing account's address.
    Signer,
    /// The single return value of a zero-argument read call on an earlier contract.
    Call { contract: String, method: String },
}

impl ArgTemplate {
    /// The contract this argument depends on, if any.
    pub fn dependency(&self) -> Option<&str> {
        match self {
            Self::AddressOf(id) => Some(id),
            Self::Call { contract, .. } => Some(contract),
            Self::Literal(_) | Self::Signer => None,
        }
    }
}

/// How a contract spec obtains its address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acquisition {
    /// Broadcast a contract-creation transaction.
    #[default]
    Deploy,
    /// Reuse a contract that is already on chain.
    Attach(Address),
}

impl Acquisition {
    pub fn is_deploy(&self) -> bool {
        matches!(self, Self::Deploy)
    }
}

fn default_verify() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// One contract of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// Unique identifier, used by later references.
    pub id: String,
    /// Fully qualified artifact name.
    pub artifact: ArtifactName,
    /// Constructor arguments, in ABI order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgTemplate>,
    #[serde(default, skip_serializing_if = "Acquisition::is_deploy")]
    pub acquire: Acquisition,
    /// Submit this contract to the verification service.
    #[serde(default = "default_verify", skip_serializing_if = "is_true")]
    pub verify: bool,
}

impl ContractSpec {
    pub fn deploy(id: impl Into<String>, artifact: ArtifactName, args: Vec<ArgTemplate>) -> Self {
        Self {
            id: id.into(),
            artifact,
            args,
            acquire: Acquisition::Deploy,
            verify: true,
        }
    }

    pub fn attach(id: impl Into<String>, artifact: ArtifactName, address: Address) -> Self {
        Self {
            id: id.into(),
            artifact,
            args: Vec::new(),
            acquire: Acquisition::Attach(address),
            verify: true,
        }
    }
}

/// One administrative call issued after every contract is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringStep {
    /// Identifier of the contract the call is sent to.
    pub target: String,
    /// Method name, or full signature for overloaded methods.
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgTemplate>,
}

impl WiringStep {
    pub fn new(target: impl Into<String>, method: impl Into<String>, args: Vec<ArgTemplate>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            args,
        }
    }
}

/// Identifies the step a fatal error happened in.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum StepRef {
    #[display("contract `{_0}`")]
    Contract(String),
    #[display("wiring #{index} {target}.{method}")]
    Wiring {
        index: usize,
        target: String,
        method: String,
    },
}

impl StepRef {
    pub fn contract(spec: &ContractSpec) -> Self {
        Self::Contract(spec.id.clone())
    }

    pub fn wiring(index: usize, step: &WiringStep) -> Self {
        Self::Wiring {
            index,
            target: step.target.clone(),
            method: step.method.clone(),
        }
    }
}

/// Ordered contract specs followed by ordered wiring steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    #[serde(default)]
    pub contracts: Vec<ContractSpec>,
    #[serde(default)]
    pub wiring: Vec<WiringStep>,
}

impl DeploymentPlan {
    /// Parse a plan from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("Failed to parse deployment plan")
    }

    /// Load a plan from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("In {}", path.display()))
    }

    /// Check the structural invariants of the plan.
    ///
    /// Runs before any network access, so a malformed plan never broadcasts anything.
    pub fn validate(&self) -> Result<()> {
        let mut declared: HashMap<&str, usize> = HashMap::new();

        for (index, spec) in self.contracts.iter().enumerate() {
            let step = StepRef::contract(spec);

            if spec.id.trim().is_empty() {
                anyhow::bail!("Contract #{index} has an empty id");
            }
            if let Acquisition::Attach(address) = spec.acquire {
                if address.is_zero() {
                    anyhow::bail!("{step}: cannot attach to the zero address");
                }
            }

            check_args(&step, &spec.args, &declared)?;

            if declared.insert(spec.id.as_str(), index).is_some() {
                anyhow::bail!("{step} is declared more than once");
            }
        }

        for (index, wiring) in self.wiring.iter().enumerate() {
            let step = StepRef::wiring(index, wiring);

            if !declared.contains_key(wiring.target.as_str()) {
                anyhow::bail!("{step}: unknown target `{}`", wiring.target);
            }
            if wiring.method.trim().is_empty() {
                anyhow::bail!("{step}: empty method name");
            }

            check_args(&step, &wiring.args, &declared)?;
        }

        Ok(())
    }

    /// Every artifact the plan names, in plan order, without duplicates.
    pub fn artifact_names(&self) -> Vec<&ArtifactName> {
        let mut names: Vec<&ArtifactName> = Vec::new();
        for spec in &self.contracts {
            if !names.contains(&&spec.artifact) {
                names.push(&spec.artifact);
            }
        }
        names
    }

    /// Number of contract-creation transactions the plan will broadcast.
    pub fn deploy_count(&self) -> usize {
        self.contracts
            .iter()
            .filter(|spec| spec.acquire.is_deploy())
            .count()
    }

    /// Total number of transactions (and therefore nonces) the plan will use.
    pub fn broadcast_count(&self) -> usize {
        self.deploy_count() + self.wiring.len()
    }

    /// SHA-256 of the canonical JSON form of the plan, hex-encoded.
    pub fn fingerprint(&self) -> Result<String> {
        let json = serde_json::to_string(self).context("Failed to serialize plan")?;

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// References must point at contracts declared before the step; wiring steps see them all.
fn check_args(step: &StepRef, args: &[ArgTemplate], declared: &HashMap<&str, usize>) -> Result<()> {
    for (i, arg) in args.iter().enumerate() {
        if let ArgTemplate::Call { method, .. } = arg {
            if method.trim().is_empty() {
                anyhow::bail!("{step}: argument #{i} calls an empty method name");
            }
        }

        if let Some(dependency) = arg.dependency() {
            if !declared.contains_key(dependency) {
                anyhow::bail!(
                    "{step}: argument #{i} references `{dependency}`, which is not declared before it"
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
[[contracts]]
id = "HigherDatabase"
artifact = "contracts/Database.sol:HigherDatabase"
acquire = { attach = "0x5ad45DCFC2049362eB62321265248e6D6053b5D9" }
verify = false

[[contracts]]
id = "HigherFactory"
artifact = "contracts/Factory.sol:HigherFactory"
args = [{ address_of = "HigherDatabase" }]

[[contracts]]
id = "FeeReceiver"
artifact = "contracts/FeeReceiver.sol:FeeReceiver"
args = ["signer", { literal = "250" }, { call = { contract = "HigherFactory", method = "INIT_CODE_PAIR_HASH" } }]

[[wiring]]
target = "HigherDatabase"
method = "setFeeRecipient"
args = [{ address_of = "FeeReceiver" }]

[[wiring]]
target = "HigherFactory"
method = "setCanCreatePair"
args = [{ address_of = "FeeReceiver" }, { literal = "true" }]
"#;

    fn artifact(s: &str) -> ArtifactName {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_plan() {
        let plan = DeploymentPlan::from_toml_str(PLAN).unwrap();
        plan.validate().unwrap();

        assert_eq!(plan.contracts.len(), 3);
        assert_eq!(plan.wiring.len(), 2);

        let database = &plan.contracts[0];
        assert_eq!(
            database.acquire,
            Acquisition::Attach(
                "0x5ad45DCFC2049362eB62321265248e6D6053b5D9"
                    .parse()
                    .unwrap()
            )
        );
        assert!(!database.verify);

        let factory = &plan.contracts[1];
        assert_eq!(factory.acquire, Acquisition::Deploy);
        assert!(factory.verify);
        assert_eq!(
            factory.args,
            vec![ArgTemplate::AddressOf("HigherDatabase".to_string())]
        );

        let fee_receiver = &plan.contracts[2];
        assert_eq!(
            fee_receiver.args,
            vec![
                ArgTemplate::Signer,
                ArgTemplate::Literal("250".to_string()),
                ArgTemplate::Call {
                    contract: "HigherFactory".to_string(),
                    method: "INIT_CODE_PAIR_HASH".to_string(),
                },
            ]
        );

        assert_eq!(plan.deploy_count(), 2);
        assert_eq!(plan.broadcast_count(), 4);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = DeploymentPlan::from_toml_str(PLAN).unwrap();
        let b = DeploymentPlan::from_toml_str(PLAN).unwrap();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_changes_with_plan() {
        let plan = DeploymentPlan::from_toml_str(PLAN).unwrap();
        let mut edited = plan.clone();
        edited.contracts[1].acquire = Acquisition::Attach(Address::repeat_byte(1));

        assert_eq!(plan.fingerprint().unwrap().len(), 64);
        assert_ne!(plan.fingerprint().unwrap(), edited.fingerprint().unwrap());
    }

    #[test]
    fn test_forward_reference_is_rejected() {
        let plan = DeploymentPlan {
            contracts: vec![
                ContractSpec::deploy(
                    "B",
                    artifact("contracts/B.sol:B"),
                    vec![ArgTemplate::AddressOf("A".into())],
                ),
                ContractSpec::deploy("A", artifact("contracts/A.sol:A"), vec![]),
            ],
            wiring: vec![],
        };

        let err = plan.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "contract `B`: argument #0 references `A`, which is not declared before it"
        );
    }

    #[test]
    fn test_self_reference_is_rejected() {
        let plan = DeploymentPlan {
            contracts: vec![ContractSpec::deploy(
                "A",
                artifact("contracts/A.sol:A"),
                vec![ArgTemplate::Call {
                    contract: "A".into(),
                    method: "owner".into(),
                }],
            )],
            wiring: vec![],
        };

        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let plan = DeploymentPlan {
            contracts: vec![
                ContractSpec::deploy("A", artifact("contracts/A.sol:A"), vec![]),
                ContractSpec::deploy("A", artifact("contracts/A.sol:A"), vec![]),
            ],
            wiring: vec![],
        };

        assert_eq!(
            plan.validate().unwrap_err().to_string(),
            "contract `A` is declared more than once"
        );
    }

    #[test]
    fn test_unknown_wiring_target_is_rejected() {
        let plan = DeploymentPlan {
            contracts: vec![ContractSpec::deploy("A", artifact("contracts/A.sol:A"), vec![])],
            wiring: vec![WiringStep::new("D", "setRouter", vec![])],
        };

        assert_eq!(
            plan.validate().unwrap_err().to_string(),
            "wiring #0 D.setRouter: unknown target `D`"
        );
    }

    #[test]
    fn test_wiring_may_reference_any_contract() {
        let plan = DeploymentPlan {
            contracts: vec![
                ContractSpec::deploy("A", artifact("contracts/A.sol:A"), vec![]),
                ContractSpec::deploy("B", artifact("contracts/B.sol:B"), vec![]),
            ],
            wiring: vec![WiringStep::new(
                "A",
                "setRouter",
                vec![ArgTemplate::AddressOf("B".into())],
            )],
        };

        plan.validate().unwrap();
    }

    #[test]
    fn test_attach_to_zero_address_is_rejected() {
        let plan = DeploymentPlan {
            contracts: vec![ContractSpec::attach(
                "A",
                artifact("contracts/A.sol:A"),
                Address::ZERO,
            )],
            wiring: vec![],
        };

        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_artifact_names_are_deduplicated() {
        let plan = DeploymentPlan {
            contracts: vec![
                ContractSpec::deploy("A", artifact("contracts/A.sol:A"), vec![]),
                ContractSpec::deploy("A2", artifact("contracts/A.sol:A"), vec![]),
                ContractSpec::deploy("B", artifact("contracts/B.sol:B"), vec![]),
            ],
            wiring: vec![],
        };

        let names: Vec<String> = plan.artifact_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["contracts/A.sol:A", "contracts/B.sol:B"]);
    }

    #[test]
    fn test_step_ref_display() {
        assert_eq!(StepRef::Contract("A".into()).to_string(), "contract `A`");
        assert_eq!(
            StepRef::wiring(3, &WiringStep::new("HigherDatabase", "setRouter", vec![])).to_string(),
            "wiring #3 HigherDatabase.setRouter"
        );
    }

    #[test]
    fn test_shipped_plans_are_valid() {
        let plans = [
            (include_str!("../../../plans/higher.toml"), 9, 11),
            (include_str!("../../../plans/og-bonding-curve.toml"), 0, 1),
            (include_str!("../../../plans/change-owner.toml"), 0, 4),
        ];

        for (toml, deploys, wiring) in plans {
            let plan = DeploymentPlan::from_toml_str(toml).unwrap();
            plan.validate().unwrap();
            assert_eq!(plan.deploy_count(), deploys);
            assert_eq!(plan.wiring.len(), wiring);
            assert_eq!(plan.broadcast_count(), deploys + wiring);
        }
    }

    #[test]
    fn test_higher_plan_order() {
        let plan = DeploymentPlan::from_toml_str(include_str!("../../../plans/higher.toml")).unwrap();

        let ids: Vec<_> = plan.contracts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "HigherDatabase",
                "HigherVolumeTracker",
                "HigherFactory",
                "HigherRouter",
                "HigherGenerator",
                "HigherTokenImp",
                "BondingCurve",
                "LiquidityAdder",
                "FeeReceiver",
                "SupplyFetcher",
            ]
        );
        assert!(!plan.contracts[0].acquire.is_deploy());
        assert_eq!(
            plan.contracts[7].args[3],
            ArgTemplate::Call {
                contract: "HigherFactory".into(),
                method: "INIT_CODE_PAIR_HASH".into(),
            }
        );
        assert_eq!(plan.contracts[8].args[..3], [ArgTemplate::Signer, ArgTemplate::Signer, ArgTemplate::Signer]);
        assert_eq!(plan.wiring[10].target, "HigherFactory");
        assert_eq!(plan.wiring[10].method, "setCanCreatePair");
    }
}
