//! Read-only collaborators shared by every step of a run.

use crate::{AccountSigner, ArtifactStore, Pacing, TransactionSettings};

/// Everything a step needs besides the mutable run state (nonce allocator and registry).
pub struct RunContext<'a, C> {
    pub chain: &'a C,
    pub signer: &'a AccountSigner,
    pub artifacts: &'a ArtifactStore,
    pub pacing: Pacing,
    pub transactions: &'a TransactionSettings,
}

impl<C> Clone for RunContext<'_, C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain,
            signer: self.signer,
            artifacts: self.artifacts,
            pacing: self.pacing,
            transactions: self.transactions,
        }
    }
}
