//! Signing account and legacy transaction encoding.

use std::str::FromStr;

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    rlp::{EMPTY_STRING_CODE, Encodable, Header},
};
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use anyhow::Context;

/// An unsigned EIP-155 legacy transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    /// `None` for a contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
}

/// ECDSA signature in the EIP-155 `(v, r, s)` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Eip155Signature {
    v: u64,
    r: U256,
    s: U256,
}

impl LegacyTransaction {
    /// RLP-encode the transaction fields, followed by either the EIP-155 signing
    /// suffix `(chain_id, 0, 0)` or the signature.
    fn encode(&self, chain_id: u64, signature: Option<Eip155Signature>) -> Vec<u8> {
        let mut payload = Vec::new();
        self.nonce.encode(&mut payload);
        self.gas_price.encode(&mut payload);
        self.gas_limit.encode(&mut payload);
        match self.to {
            Some(to) => to.encode(&mut payload),
            None => payload.push(EMPTY_STRING_CODE),
        }
        self.value.encode(&mut payload);
        self.input.encode(&mut payload);
        match signature {
            Some(sig) => {
                sig.v.encode(&mut payload);
                sig.r.encode(&mut payload);
                sig.s.encode(&mut payload);
            }
            None => {
                chain_id.encode(&mut payload);
                0u8.encode(&mut payload);
                0u8.encode(&mut payload);
            }
        }

        let mut out = Vec::with_capacity(payload.len() + 9);
        Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(&payload);
        out
    }

    /// The EIP-155 signing hash.
    pub fn signing_hash(&self, chain_id: u64) -> B256 {
        keccak256(self.encode(chain_id, None))
    }
}

/// The single account that signs every transaction of a run.
#[derive(Debug, Clone)]
pub struct AccountSigner {
    inner: PrivateKeySigner,
    chain_id: u64,
}

impl AccountSigner {
    /// Load a signer from a hex-encoded private key (with or without 0x prefix).
    pub fn from_private_key(private_key: &str, chain_id: u64) -> anyhow::Result<Self> {
        let inner = PrivateKeySigner::from_str(private_key.trim())
            .map_err(|e| anyhow::anyhow!("Invalid private key: {}", e))?;
        Ok(Self { inner, chain_id })
    }

    /// Derive a signer from a BIP-39 mnemonic at `m/44'/60'/0'/0/{index}`.
    pub fn from_mnemonic(phrase: &str, index: u32, chain_id: u64) -> anyhow::Result<Self> {
        let inner = MnemonicBuilder::<English>::default()
            .phrase(phrase.trim())
            .index(index)
            .context("Invalid mnemonic derivation index")?
            .build()
            .context("Failed to derive a key from the mnemonic")?;
        Ok(Self { inner, chain_id })
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sign `tx` and return the raw transaction bytes ready for broadcast.
    pub fn sign_transaction(&self, tx: &LegacyTransaction) -> anyhow::Result<Bytes> {
        let hash = tx.signing_hash(self.chain_id);
        let key: &k256::ecdsa::SigningKey = self.inner.credential();
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(hash.as_slice())
            .context("Failed to sign transaction")?;

        let rs = signature.to_bytes();
        let signature = Eip155Signature {
            v: recovery_id.to_byte() as u64 + 35 + 2 * self.chain_id,
            r: U256::from_be_slice(&rs[..32]),
            s: U256::from_be_slice(&rs[32..]),
        };

        Ok(Bytes::from(tx.encode(self.chain_id, Some(signature))))
    }
}

/// Where the signing key comes from. Never serialized.
#[derive(Clone)]
pub enum SignerSource {
    PrivateKey(String),
    Mnemonic { phrase: String, index: u32 },
}

impl std::fmt::Debug for SignerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrivateKey(_) => f.write_str("PrivateKey(<redacted>)"),
            Self::Mnemonic { index, .. } => {
                write!(f, "Mnemonic {{ phrase: <redacted>, index: {index} }}")
            }
        }
    }
}

impl SignerSource {
    pub fn into_signer(self, chain_id: u64) -> anyhow::Result<AccountSigner> {
        match self {
            Self::PrivateKey(key) => AccountSigner::from_private_key(&key, chain_id),
            Self::Mnemonic { phrase, index } => AccountSigner::from_mnemonic(&phrase, index, chain_id),
        }
    }
}
