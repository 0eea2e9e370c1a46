//! Protocol-wide constants for Prism.

/// Protocol semantic version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Length in bytes of a 32-byte hash.
pub const HASH32_LEN: usize = 32;

/// Number of atomic units per one coin.
///
/// 1 PRISM = 10^8 atoms.
pub const ATOMS_PER_COIN: u64 = 100_000_000;

/// Hard cap on total supply (70M coins).
pub const TOTAL_SUPPLY_ATOMS: u64 = 70_000_000 * ATOMS_PER_COIN;

/// Domain separator used when hashing block headers.
///
/// Prevents cross-domain hash collisions.
pub const DS_BLOCK_HEADER: &[u8] = b"PRISM::BLOCK_HEADER::V1";

/// Domain separator used when hashing transactions.
///
/// Prevents cross-domain hash collisions.
pub const DS_TX: &[u8] = b"PRISM::TX::V1";

/// Domain separator for audit merkle leaves.
pub const DS_AUDIT_LEAF: &[u8] = b"PRISM::AUDIT_LEAF::V1";

/// Domain separator for audit merkle interior nodes.
pub const DS_AUDIT_NODE: &[u8] = b"PRISM::AUDIT_NODE::V1";

/// Maximum number of outputs allowed in a single transaction.
///
/// This is a DoS-prevention bound, not a protocol limitation.
pub const MAX_OUTPUTS_PER_TX: usize = 16;

/// Upper bound on an encoded transaction accepted for hashing.
///
/// A consensus transaction here is a coinbase with a handful of outputs;
/// anything near this bound is malformed input.
pub const MAX_TX_BYTES: usize = 100_000;
