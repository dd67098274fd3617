//! Transaction nonce allocation for the single signing account.

use alloy_core::primitives::Address;
use anyhow::{Context, Result};

use crate::traits::ChainClient;

/// Hands out the signing account's nonces in strict program order.
///
/// The allocator is an explicit object passed by `&mut` into every broadcasting call
/// site, so two allocations can never race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceAllocator {
    account: Address,
    initial: u64,
    next: u64,
}

impl NonceAllocator {
    /// Seed the allocator from the account's pending transaction count.
    ///
    /// This is the only network read of the allocator and is not retried: a failure
    /// here is a misconfiguration of the run.
    pub async fn init<C: ChainClient>(chain: &C, account: Address) -> Result<Self> {
        let next = chain
            .transaction_count(account)
            .await
            .with_context(|| format!("Failed to fetch the transaction count of {account}"))?;

        tracing::info!(%account, nonce = next, "Nonce allocator seeded from chain");

        Ok(Self::starting_at(account, next))
    }

    /// Create an allocator whose first allocation returns `nonce`.
    pub fn starting_at(account: Address, nonce: u64) -> Self {
        Self {
            account,
            initial: nonce,
            next: nonce,
        }
    }

    /// Return the current cursor and advance it by one.
    pub fn allocate(&mut self) -> u64 {
        let nonce = self.next;
        self.next += 1;
        tracing::debug!(account = %self.account, nonce, "Nonce allocated");
        nonce
    }

    /// The nonce the next call to [`Self::allocate`] will return.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// The nonce the allocator was seeded with.
    pub fn initial(&self) -> u64 {
        self.initial
    }

    /// Number of nonces handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next - self.initial
    }

    /// The account the nonces belong to.
    pub fn account(&self) -> Address {
        self.account
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocations_are_contiguous() {
        let mut nonces = NonceAllocator::starting_at(Address::ZERO, 10);

        assert_eq!(nonces.allocate(), 10);
        assert_eq!(nonces.allocate(), 11);
        assert_eq!(nonces.allocate(), 12);
        assert_eq!(nonces.peek(), 13);
        assert_eq!(nonces.initial(), 10);
        assert_eq!(nonces.allocated(), 3);
    }

    #[test]
    fn test_fresh_allocator_has_allocated_nothing() {
        let nonces = NonceAllocator::starting_at(Address::ZERO, 0);
        assert_eq!(nonces.allocated(), 0);
        assert_eq!(nonces.peek(), 0);
    }
}
