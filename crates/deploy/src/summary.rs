//! Human readable output of a run and of a plan preview.

use std::fmt;

use alloy_core::primitives::Address;
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};

use crate::{
    plan::{Acquisition, DeploymentPlan},
    record::{ContractRecord, WiringRecord},
    verify::VerificationReport,
};

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub chain_id: u64,
    pub signer: Address,
    /// First nonce the run could allocate.
    pub initial_nonce: u64,
    /// Nonce the next transaction of this account will use.
    pub next_nonce: u64,
    pub contracts: Vec<ContractRecord>,
    pub wiring: Vec<WiringRecord>,
    /// `None` when verification was not requested.
    pub verification: Option<VerificationReport>,
}

impl RunSummary {
    /// Nonces allocated by this run, in order.
    pub fn nonces_used(&self) -> std::ops::Range<u64> {
        self.initial_nonce..self.next_nonce
    }

    pub fn address_of(&self, id: &str) -> Option<Address> {
        self.contracts.iter().find(|c| c.id == id).map(|c| c.address)
    }
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_header(header.to_vec());
    table
}

fn opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "chain {} / signer {}", self.chain_id, self.signer)?;

        let mut contracts = table(&["Contract", "Mode", "Address", "Nonce"]);
        for contract in &self.contracts {
            contracts.add_row(vec![
                contract.id.clone(),
                contract.mode.to_string(),
                contract.address.to_string(),
                opt(contract.nonce),
            ]);
        }
        writeln!(f, "{contracts}")?;

        if !self.wiring.is_empty() {
            let mut wiring = table(&["#", "Call", "Nonce", "Transaction"]);
            for step in &self.wiring {
                wiring.add_row(vec![
                    step.index.to_string(),
                    format!("{}.{}", step.target, step.method),
                    step.nonce.to_string(),
                    step.tx_hash.to_string(),
                ]);
            }
            writeln!(f, "{wiring}")?;
        }

        let used = self.nonces_used();
        if used.is_empty() {
            writeln!(f, "No transaction sent")?;
        } else {
            writeln!(
                f,
                "Nonces {}..={} ({} transactions)",
                used.start,
                used.end - 1,
                used.end - used.start
            )?;
        }

        if let Some(report) = &self.verification {
            write!(f, "{report}")?;
        }

        Ok(())
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut verification = table(&["Contract", "Address", "Verification"]);
        for entry in &self.entries {
            verification.add_row(vec![
                entry.contract_id.clone(),
                entry.address.to_string(),
                entry.outcome.to_string(),
            ]);
        }
        writeln!(f, "{verification}")?;
        writeln!(
            f,
            "{} verified, {} failed, {} entries",
            self.succeeded(),
            self.failed(),
            self.entries.len()
        )
    }
}

/// One predicted transaction or attachment of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewStep {
    Deploy {
        id: String,
        nonce: u64,
        address: Address,
    },
    Attach {
        id: String,
        address: Address,
    },
    Wiring {
        index: usize,
        target: String,
        method: String,
        nonce: u64,
    },
}

/// Nonces and CREATE addresses a plan will use, computed without broadcasting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPreview {
    pub signer: Address,
    pub steps: Vec<PreviewStep>,
}

impl PlanPreview {
    /// Predict every step of `plan` for `signer` starting at `first_nonce`.
    pub fn new(plan: &DeploymentPlan, signer: Address, first_nonce: u64) -> Self {
        let mut nonce = first_nonce;
        let mut steps = Vec::with_capacity(plan.contracts.len() + plan.wiring.len());

        for spec in &plan.contracts {
            steps.push(match spec.acquire {
                Acquisition::Deploy => {
                    let step = PreviewStep::Deploy {
                        id: spec.id.clone(),
                        nonce,
                        address: signer.create(nonce),
                    };
                    nonce += 1;
                    step
                }
                Acquisition::Attach(address) => PreviewStep::Attach {
                    id: spec.id.clone(),
                    address,
                },
            });
        }

        for (index, step) in plan.wiring.iter().enumerate() {
            steps.push(PreviewStep::Wiring {
                index,
                target: step.target.clone(),
                method: step.method.clone(),
                nonce,
            });
            nonce += 1;
        }

        Self { signer, steps }
    }

    /// Predicted address of contract `id`.
    pub fn address_of(&self, id: &str) -> Option<Address> {
        self.steps.iter().find_map(|step| match step {
            PreviewStep::Deploy { id: i, address, .. } | PreviewStep::Attach { id: i, address }
                if i == id =>
            {
                Some(*address)
            }
            _ => None,
        })
    }
}

impl fmt::Display for PlanPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "signer {}", self.signer)?;

        let mut steps = table(&["Step", "Action", "Nonce", "Address"]);
        for step in &self.steps {
            let row = match step {
                PreviewStep::Deploy { id, nonce, address } => vec![
                    id.clone(),
                    "deploy".to_string(),
                    nonce.to_string(),
                    address.to_string(),
                ],
                PreviewStep::Attach { id, address } => vec![
                    id.clone(),
                    "attach".to_string(),
                    "-".to_string(),
                    address.to_string(),
                ],
                PreviewStep::Wiring {
                    index,
                    target,
                    method,
                    nonce,
                } => vec![
                    format!("wiring #{index}"),
                    format!("{target}.{method}"),
                    nonce.to_string(),
                    "-".to_string(),
                ],
            };
            steps.add_row(row);
        }

        writeln!(f, "{steps}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ArgTemplate, ContractSpec, WiringStep};
    use crate::registry::AcquisitionMode;

    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn plan() -> DeploymentPlan {
        let artifact = |s: &str| s.parse().unwrap();
        DeploymentPlan {
            contracts: vec![
                ContractSpec::attach("DB", artifact("contracts/DB.sol:DB"), Address::repeat_byte(1)),
                ContractSpec::deploy("A", artifact("contracts/A.sol:A"), vec![]),
                ContractSpec::deploy(
                    "B",
                    artifact("contracts/B.sol:B"),
                    vec![ArgTemplate::AddressOf("A".into())],
                ),
            ],
            wiring: vec![WiringStep::new(
                "DB",
                "setRouter",
                vec![ArgTemplate::AddressOf("B".into())],
            )],
        }
    }

    #[test]
    fn test_preview_predicts_nonces_and_addresses() {
        let signer: Address = DEV_ADDRESS.parse().unwrap();
        let preview = PlanPreview::new(&plan(), signer, 0);

        assert_eq!(
            preview.address_of("A"),
            Some(
                "0x5FbDB2315678afecb367f032d93F642f64180aa3"
                    .parse()
                    .unwrap()
            )
        );
        assert_eq!(preview.address_of("B"), Some(signer.create(1)));
        assert_eq!(preview.address_of("DB"), Some(Address::repeat_byte(1)));
        assert_eq!(
            preview.steps.last(),
            Some(&PreviewStep::Wiring {
                index: 0,
                target: "DB".into(),
                method: "setRouter".into(),
                nonce: 2,
            })
        );

        let rendered = preview.to_string();
        assert!(rendered.contains("DB.setRouter"));
        assert!(rendered.contains("attach"));
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            chain_id: 31337,
            signer: Address::ZERO,
            initial_nonce: 10,
            next_nonce: 12,
            contracts: vec![ContractRecord {
                id: "HigherFactory".into(),
                artifact: "contracts/Factory.sol:HigherFactory".parse().unwrap(),
                address: Address::repeat_byte(2),
                mode: AcquisitionMode::Deploy,
                nonce: Some(10),
                tx_hash: None,
                constructor_args: vec![],
                verify: true,
            }],
            wiring: vec![],
            verification: None,
        };

        assert_eq!(summary.nonces_used(), 10..12);
        let rendered = summary.to_string();
        assert!(rendered.contains("HigherFactory"));
        assert!(rendered.contains("Nonces 10..=11 (2 transactions)"));
    }
}
