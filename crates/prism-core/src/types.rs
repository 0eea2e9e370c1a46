// Consensus-critical. Changes require spec update + tests.
//! Canonical protocol types for Prism.
//!
//! This module defines all consensus-visible data structures and primitive
//! value types used across the protocol. All types here must remain
//! backward-compatible once released.

use crate::constants::*;
use borsh::{BorshDeserialize, BorshSerialize};
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors related to parsing, validation, or construction of core protocol types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Hex string had an unexpected byte length.
    #[error("invalid hex length: expected {expected} bytes, got {got} bytes")]
    InvalidHexLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes provided.
        got: usize,
    },

    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Arithmetic overflow or underflow occurred.
    #[error("amount overflow or underflow")]
    AmountOverflow,

    /// A value violated protocol constraints.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
}

/// Fixed-size 32-byte hash used throughout the protocol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hash32(pub [u8; HASH32_LEN]);

impl Hash32 {
    /// Returns an all-zero hash.
    ///
    /// Zero doubles as the "null" sentinel for optional hash fields
    /// (`prev_poa` of the first PoA block, `prev` of genesis).
    pub const fn zero() -> Self {
        Self([0u8; HASH32_LEN])
    }

    /// Returns the underlying byte array.
    pub const fn as_bytes(&self) -> &[u8; HASH32_LEN] {
        &self.0
    }

    /// Whether this is the all-zero (null) hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH32_LEN]
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; HASH32_LEN]> for Hash32 {
    fn from(value: [u8; HASH32_LEN]) -> Self {
        Self(value)
    }
}

impl From<Hash32> for [u8; HASH32_LEN] {
    fn from(value: Hash32) -> Self {
        value.0
    }
}

impl FromStr for Hash32 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        if bytes.len() != HASH32_LEN {
            return Err(CoreError::InvalidHexLength {
                expected: HASH32_LEN,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; HASH32_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// Block hash type.
pub type BlockHash = Hash32;

/// Transaction identifier type.
pub type TxId = Hash32;

/// Zero-blinded Pedersen commitment carried on an output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Commitment(pub [u8; HASH32_LEN]);

impl Commitment {
    /// Returns an all-zero commitment.
    pub const fn zero() -> Self {
        Self([0u8; HASH32_LEN])
    }

    /// Returns the underlying byte array.
    pub const fn as_bytes(&self) -> &[u8; HASH32_LEN] {
        &self.0
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", hex::encode(self.0))
    }
}

/// Amount expressed in the smallest unit ("atoms").
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Amount(pub u64);

impl Amount {
    /// Returns a zero amount.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Constructs an amount from atoms.
    pub const fn from_atoms(atoms: u64) -> Self {
        Self(atoms)
    }

    /// Returns the underlying atom value.
    pub const fn atoms(self) -> u64 {
        self.0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Amount) -> Result<Self, CoreError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(CoreError::AmountOverflow)
    }

    /// Checked multiplication by a count.
    pub fn checked_mul(self, n: u64) -> Result<Self, CoreError> {
        self.0
            .checked_mul(n)
            .map(Self)
            .ok_or(CoreError::AmountOverflow)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({} atoms)", self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} atoms", self.0)
    }
}

/// How a block was produced.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BlockKind {
    /// Mined proof-of-work block (heights up to the PoW cutoff).
    PoW,
    /// Staked proof-of-stake block.
    PoS,
    /// Proof-of-audit block attesting to a run of PoS blocks.
    PoA,
}

impl BlockKind {
    /// Whether this is a proof-of-stake block.
    pub fn is_pos(self) -> bool {
        matches!(self, BlockKind::PoS)
    }

    /// Whether this is a proof-of-audit block.
    pub fn is_poa(self) -> bool {
        matches!(self, BlockKind::PoA)
    }
}

/// Summary of one audited PoS block, embedded in a PoA block.
///
/// The tuple must match the audited block's index entry exactly; a zero
/// `time` is the sentinel for known historical orphans whose stake kernel
/// can no longer be re-verified.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoSBlockSummary {
    /// Hash of the audited PoS block.
    pub hash: BlockHash,
    /// Height of the audited PoS block.
    pub height: u32,
    /// Timestamp of the audited PoS block (Unix seconds; 0 = orphan sentinel).
    pub time: u64,
}

/// Transaction kind.
///
/// `Coinbase` is the only transaction type allowed to mint new supply.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TransactionKind {
    /// Coinbase transaction (must be tx[0] of a block).
    Coinbase,
    /// Regular transaction.
    Regular,
}

/// A transaction output with an explicit value and its zero-blind commitment.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Output {
    /// Output value in atoms.
    pub value: Amount,
    /// Commitment to `value` with a zero blinding factor.
    pub commitment: Commitment,
}

/// Public transaction container.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transaction {
    /// Protocol version for this transaction.
    pub version: u16,
    /// Transaction kind.
    pub kind: TransactionKind,
    /// Outputs created by this transaction.
    pub outputs: Vec<Output>,
}

impl Transaction {
    /// Performs basic structural validation.
    pub fn validate_sanity(&self) -> Result<(), CoreError> {
        if self.version != PROTOCOL_VERSION {
            return Err(CoreError::InvalidValue("unsupported transaction version"));
        }
        if self.outputs.is_empty() {
            return Err(CoreError::InvalidValue("transaction has no outputs"));
        }
        if self.outputs.len() > MAX_OUTPUTS_PER_TX {
            return Err(CoreError::InvalidValue("too many outputs"));
        }
        Ok(())
    }
}

/// Block header containing consensus-critical metadata.
///
/// The PoA fields (`prev_poa`, `audit_root`, `mined_hash`) are zero on
/// PoW and PoS headers.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u16,
    /// How this block was produced.
    pub kind: BlockKind,
    /// Hash of the previous block.
    pub prev: BlockHash,
    /// Hash of the nearest PoA ancestor (zero for the first PoA block).
    pub prev_poa: BlockHash,
    /// Merkle root over the embedded audit set.
    pub audit_root: Hash32,
    /// Block timestamp (Unix seconds).
    pub time: u64,
    /// Compact difficulty target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u64,
    /// Proof hash satisfying `bits` (distinct from the block identity hash).
    pub mined_hash: Hash32,
}

/// Full block (header + transactions + audit set).
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Transactions included in this block.
    pub txs: Vec<Transaction>,
    /// Ordered summaries of the PoS blocks audited by this block.
    ///
    /// Empty on PoW and PoS blocks.
    pub audited: Vec<PoSBlockSummary>,
}

impl Block {
    /// Performs basic structural validation.
    pub fn validate_sanity(&self) -> Result<(), CoreError> {
        if self.header.version != PROTOCOL_VERSION {
            return Err(CoreError::InvalidValue("unsupported block version"));
        }
        if self.txs.is_empty() {
            return Err(CoreError::InvalidValue("block has no transactions"));
        }
        match self.header.kind {
            BlockKind::PoA => {
                if self.audited.is_empty() {
                    return Err(CoreError::InvalidValue("PoA block audits no blocks"));
                }
            }
            BlockKind::PoW | BlockKind::PoS => {
                if !self.audited.is_empty() {
                    return Err(CoreError::InvalidValue("non-PoA block carries an audit set"));
                }
            }
        }
        for tx in &self.txs {
            tx.validate_sanity()?;
        }
        Ok(())
    }
}
