// Consensus-critical. Changes require spec update + tests.
//! Canonical encoding and hashing.
//!
//! Every object that feeds a consensus hash is Borsh-encoded first, and
//! the digest is BLAKE3 over `domain || encoding` with a per-object
//! domain separator from [`crate::constants`]. Nothing else may reach a
//! hasher: no JSON, no ad-hoc byte layouts.

use crate::constants::*;
use crate::types::{BlockHeader, CoreError, Hash32, Transaction};

/// Borsh-encode a consensus object.
pub fn to_bytes<T: borsh::BorshSerialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    borsh::to_vec(value).map_err(|_| CoreError::InvalidValue("borsh serialization failed"))
}

/// BLAKE3 over `domain || bytes`.
pub fn hash32(domain: &[u8], bytes: &[u8]) -> Hash32 {
    let digest = blake3::Hasher::new()
        .update(domain)
        .update(bytes)
        .finalize();
    Hash32(*digest.as_bytes())
}

/// Transaction id under [`DS_TX`].
///
/// Encodings above [`MAX_TX_BYTES`] have no id and are rejected before
/// hashing.
pub fn txid(tx: &Transaction) -> Result<Hash32, CoreError> {
    let encoded = to_bytes(tx)?;
    if encoded.len() > MAX_TX_BYTES {
        return Err(CoreError::InvalidValue("transaction exceeds MAX_TX_BYTES"));
    }
    Ok(hash32(DS_TX, &encoded))
}

/// Block identity hash under [`DS_BLOCK_HEADER`].
///
/// Covers every header field, including the PoA ones (`prev_poa`,
/// `audit_root`, `mined_hash`).
pub fn block_header_hash(header: &BlockHeader) -> Result<Hash32, CoreError> {
    Ok(hash32(DS_BLOCK_HEADER, &to_bytes(header)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Amount, BlockKind, Commitment, Output, Transaction, TransactionKind,
    };

    fn atom_output() -> Output {
        Output {
            value: Amount::from_atoms(1),
            commitment: Commitment::zero(),
        }
    }

    #[test]
    fn domain_separators_keep_hashes_apart() {
        let payload = [7u8; 16];
        assert_ne!(hash32(DS_TX, &payload), hash32(DS_BLOCK_HEADER, &payload));
        assert_ne!(hash32(DS_AUDIT_LEAF, &payload), hash32(DS_AUDIT_NODE, &payload));
    }

    #[test]
    fn header_hash_binds_the_block_kind() {
        let mut header = BlockHeader {
            version: PROTOCOL_VERSION,
            kind: BlockKind::PoS,
            prev: Hash32::zero(),
            prev_poa: Hash32::zero(),
            audit_root: Hash32::zero(),
            time: 1,
            bits: 0x1e00_ffff,
            nonce: 0,
            mined_hash: Hash32::zero(),
        };
        let pos = block_header_hash(&header).unwrap();
        header.kind = BlockKind::PoA;
        let poa = block_header_hash(&header).unwrap();
        assert_ne!(pos, poa);
    }

    #[test]
    fn oversized_transaction_has_no_txid() {
        let tx = Transaction {
            version: PROTOCOL_VERSION,
            kind: TransactionKind::Coinbase,
            outputs: vec![atom_output(); MAX_TX_BYTES / 8],
        };
        assert!(txid(&tx).is_err());
    }

    #[test]
    fn txid_is_stable_across_calls() {
        let tx = Transaction {
            version: PROTOCOL_VERSION,
            kind: TransactionKind::Coinbase,
            outputs: vec![atom_output()],
        };
        assert_eq!(txid(&tx).unwrap(), txid(&tx).unwrap());
    }
}
