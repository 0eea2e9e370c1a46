// Consensus-critical. Changes require spec update + tests.
//! Forensic audit exception tables.
//!
//! Four historical PoA blocks (17152, 135946, 311330, 311331) recorded
//! incorrect audit references on the live chain. The tables below are
//! consensus rules, not debug scaffolding: removing any entry makes a
//! block that is already buried in the chain fail validation, halting
//! sync. Entries are versioned per network; only mainnet carries any.

use prism_core::Hash32;

/// Correct block references for the blocks whose audits went wrong.
/// Checked where an audit-chain walk would otherwise land on the wrong
/// fork (blocks 17152, 135946, 311330, 311331).
const FIXED_AUDIT: [[u8; 32]; 4] = [
    hex32("9965850037f14dcb4abf1168016e9f96f53692322714e7fac92a2b8838544135"),
    hex32("dd3d1dccf8f39a220e3a83cfabaf1b567b6696af877073ec580d09af6198f098"),
    hex32("e8aafd0513a8b2da536d55d9efd788956d03c6a0baa8acc4251f8dc0f3f03e87"),
    hex32("2666169b99521f12b6c69454f66e23af465c63e4a4807a5a8ed45467846ebe93"),
];

/// Orphaned references recorded by blocks 135946, 311330 and 311331.
/// Accepted where the predecessor's last audited hash is expected in the
/// index but never will be.
const WRONG_AUDIT: [[u8; 32]; 3] = [
    hex32("ef99f7882a681a075ebd51fa83be01685257ca66ccb736950fefc037f00e1538"),
    hex32("6514be1fad4d956a059924d5185a6f9db20a62f2f99e3e9b79257d6d3ca36065"),
    hex32("fd5a19a7a7df25774a6a030295f01bae6395be4229ebe2caf4974d536432e0dd"),
];

/// Predecessor-PoA heights at which the audit-continuity check is skipped
/// entirely.
const RECENT_HASH_BYPASS: [u32; 4] = [17_077, 17_154, 135_887, 311_272];

/// Heights at which the no-PoA-in-audit-set check is skipped.
const AUDITED_POA_BYPASS: [u32; 3] = [17_154, 135_948, 311_332];

/// Per-network forensic whitelist consulted by the PoA validator.
#[derive(Clone, Debug, Default)]
pub struct AuditExceptions {
    /// Accepted stand-in hashes for mis-audited fork points.
    pub fixed_audit: Vec<Hash32>,
    /// Known-orphan hashes tolerated as a predecessor's last audit entry.
    pub wrong_audit: Vec<Hash32>,
    /// Heights bypassing the audit-continuity check.
    pub recent_hash_bypass: Vec<u32>,
    /// Heights bypassing the no-PoA-in-audit-set check.
    pub audited_poa_bypass: Vec<u32>,
}

impl AuditExceptions {
    /// The mainnet tables.
    pub fn mainnet() -> Self {
        Self {
            fixed_audit: FIXED_AUDIT.iter().copied().map(Hash32).collect(),
            wrong_audit: WRONG_AUDIT.iter().copied().map(Hash32).collect(),
            recent_hash_bypass: RECENT_HASH_BYPASS.to_vec(),
            audited_poa_bypass: AUDITED_POA_BYPASS.to_vec(),
        }
    }

    /// Empty tables (testnet, regtest).
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether `hash` is an accepted stand-in for a mis-audited fork point.
    pub fn is_fixed_audit(&self, hash: &Hash32) -> bool {
        self.fixed_audit.contains(hash)
    }

    /// Whether `hash` is a tolerated orphan audit reference.
    pub fn is_wrong_audit(&self, hash: &Hash32) -> bool {
        self.wrong_audit.contains(hash)
    }

    /// Whether the audit-continuity check is bypassed for a predecessor
    /// PoA at `height`.
    pub fn bypasses_recent_hash_check(&self, height: u32) -> bool {
        self.recent_hash_bypass.contains(&height)
    }

    /// Whether the no-PoA-in-audit-set check is bypassed at `height`.
    pub fn bypasses_audited_poa_check(&self, height: u32) -> bool {
        self.audited_poa_bypass.contains(&height)
    }
}

const fn hex32(s: &str) -> [u8; 32] {
    let bytes = s.as_bytes();
    assert!(bytes.len() == 64, "hash literal must be 64 hex digits");
    let mut out = [0u8; 32];
    let mut i = 0;
    while i < 32 {
        out[i] = (nibble(bytes[2 * i]) << 4) | nibble(bytes[2 * i + 1]);
        i += 1;
    }
    out
}

const fn nibble(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => panic!("invalid hex digit in hash literal"),
    }
}
