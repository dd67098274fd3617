//! Interface to a public source-verification service.

use std::future::Future;

use alloy_core::primitives::{Address, Bytes};
use anyhow::Result;

/// Everything a verification service needs to match source against a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    /// Identifier of the contract in the plan (for logging only).
    pub contract_id: String,
    /// Deployed address.
    pub address: Address,
    /// Fully qualified artifact name (`contracts/Factory.sol:HigherFactory`).
    pub artifact: String,
    /// ABI-encoded constructor arguments, without the creation bytecode.
    pub constructor_args: Bytes,
}

/// Terminal answer of the verification service for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    /// The service accepted the source.
    Verified,
    /// The source was already verified before this run.
    AlreadyVerified,
    /// The service answered and refused the source.
    Rejected(String),
}

/// A source-verification backend.
///
/// Errors returned here are never fatal to a run; the caller downgrades them to a
/// logged outcome.
pub trait SourceVerifier: Send + Sync {
    /// Submit one contract and wait for the service's verdict.
    fn verify(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = Result<VerificationStatus>> + Send;
}
