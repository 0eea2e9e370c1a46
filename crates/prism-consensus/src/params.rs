// Consensus-critical. Changes require spec update + tests.
//! Per-network chain parameters.
//!
//! Parameters are selected once at process startup and published as an
//! immutable `Arc<ChainParams>`; validators receive a reference, never a
//! global. The single runtime-adjustable knob (`max_reorg_depth`) lives
//! in [`Tunables`] behind an atomic so the params themselves stay
//! freely shareable across threads.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::One;
use prism_core::{Amount, ATOMS_PER_COIN};

use crate::difficulty::target_to_bits;
use crate::exceptions::AuditExceptions;

/// Which chain a node participates in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Network {
    /// The live chain.
    Mainnet,
    /// The public test chain.
    Testnet,
    /// Local regression testing.
    Regtest,
}

/// Fixed PoA target before `soft_fork_height`.
pub const POA_BITS: u32 = 0x1e05_0000;
/// Fixed PoA target from `soft_fork_height` to `poa_new_diff_height`.
pub const POA_BITS_SOFT_FORK: u32 = 0x1e12_7ff8;
/// Fixed PoA target from `poa_new_diff_height` on.
pub const POA_BITS_NEW_DIFF: u32 = 0x1e02_b2dc;

/// Upper bound on the audit set before `poa_padding_height` activates the
/// configured maximum.
pub const MAX_AUDITED_BEFORE_PADDING: usize = 120;

/// Immutable per-network constants and activation heights.
#[derive(Clone, Debug)]
pub struct ChainParams {
    /// Network these parameters describe.
    pub network: Network,
    /// Easiest admissible proof-of-work target.
    pub pow_limit: BigUint,
    /// Easiest admissible proof-of-stake target (protocol V1).
    pub pos_limit_v1: BigUint,
    /// Easiest admissible proof-of-stake target (protocol V2).
    pub pos_limit_v2: BigUint,
    /// Compact form of `pow_limit`.
    pub pow_limit_bits: u32,
    /// Target seconds between blocks.
    pub target_spacing: u64,
    /// Retarget window, protocol V1 (seconds).
    pub target_timespan_v1: u64,
    /// Retarget window, protocol V2 (seconds).
    pub target_timespan_v2: u64,
    /// Height at/below which PoW blocks are produced.
    pub last_pow_block: u32,
    /// First height at which PoA blocks are permitted.
    pub start_poa_block: u32,
    /// First PoA difficulty regime boundary.
    pub soft_fork_height: u32,
    /// Second PoA difficulty regime boundary.
    pub poa_new_diff_height: u32,
    /// Height switching the audit reward to 0.25 coin and enabling the
    /// padding check.
    pub hard_fork_height: u32,
    /// Height activating the configured audit-count maximum and padding
    /// distance.
    pub poa_padding_height: u32,
    /// Minimum height gap between a PoA block and its last audited PoS
    /// block.
    pub poa_padding: u32,
    /// Minimum seconds between consecutive PoA blocks.
    pub poa_block_time: u64,
    /// Minimum audit set size.
    pub min_pos_blocks_audited: usize,
    /// Maximum audit set size (after `poa_padding_height`).
    pub max_pos_blocks_audited: usize,
    /// Fixed PoA target for the first regime; zero disables PoA
    /// retargeting entirely.
    pub poa_bits: u32,
    /// Fixed PoA target for the soft-fork regime.
    pub poa_bits_soft_fork: u32,
    /// Fixed PoA target for the new-diff regime.
    pub poa_bits_new_diff: u32,
    /// Skip mined-hash checks (regtest).
    pub skip_pow_check: bool,
    /// Forensic audit exception tables for this network.
    pub exceptions: AuditExceptions,
}

impl ChainParams {
    /// Parameters for `network`, ready to publish.
    pub fn for_network(network: Network) -> Arc<Self> {
        Arc::new(match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        })
    }

    fn mainnet() -> Self {
        Self::build(
            Network::Mainnet,
            20,
            24,
            20,
            Heights {
                last_pow_block: 200,
                start_poa_block: 230,
                soft_fork_height: 16_000,
                poa_new_diff_height: 120_000,
                hard_fork_height: 275_000,
                poa_padding_height: 297_000,
            },
            PoaSchedule {
                poa_padding: 5,
                poa_block_time: 3600,
                min_pos_blocks_audited: 59,
                max_pos_blocks_audited: 100,
            },
            false,
            AuditExceptions::mainnet(),
        )
    }

    fn testnet() -> Self {
        Self::build(
            Network::Testnet,
            16,
            16,
            16,
            Heights {
                last_pow_block: 200,
                start_poa_block: 230,
                soft_fork_height: 500,
                poa_new_diff_height: 1000,
                hard_fork_height: 1500,
                poa_padding_height: 2000,
            },
            PoaSchedule {
                poa_padding: 5,
                poa_block_time: 300,
                min_pos_blocks_audited: 2,
                max_pos_blocks_audited: 120,
            },
            false,
            AuditExceptions::none(),
        )
    }

    fn regtest() -> Self {
        Self::build(
            Network::Regtest,
            1,
            1,
            1,
            Heights {
                last_pow_block: 100,
                start_poa_block: 110,
                soft_fork_height: 200,
                poa_new_diff_height: 300,
                hard_fork_height: 400,
                poa_padding_height: 500,
            },
            PoaSchedule {
                poa_padding: 2,
                poa_block_time: 60,
                min_pos_blocks_audited: 1,
                max_pos_blocks_audited: 120,
            },
            true,
            AuditExceptions::none(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        network: Network,
        pow_shift: u32,
        pos_v1_shift: u32,
        pos_v2_shift: u32,
        heights: Heights,
        schedule: PoaSchedule,
        skip_pow_check: bool,
        exceptions: AuditExceptions,
    ) -> Self {
        let pow_limit = limit_shifted(pow_shift);
        // Limits are well-formed by construction.
        let pow_limit_bits = target_to_bits(&pow_limit).unwrap_or(0x207f_ffff);
        Self {
            network,
            pos_limit_v1: limit_shifted(pos_v1_shift),
            pos_limit_v2: limit_shifted(pos_v2_shift),
            pow_limit,
            pow_limit_bits,
            target_spacing: 60,
            target_timespan_v1: 40 * 60,
            target_timespan_v2: 30 * 60,
            last_pow_block: heights.last_pow_block,
            start_poa_block: heights.start_poa_block,
            soft_fork_height: heights.soft_fork_height,
            poa_new_diff_height: heights.poa_new_diff_height,
            hard_fork_height: heights.hard_fork_height,
            poa_padding_height: heights.poa_padding_height,
            poa_padding: schedule.poa_padding,
            poa_block_time: schedule.poa_block_time,
            min_pos_blocks_audited: schedule.min_pos_blocks_audited,
            max_pos_blocks_audited: schedule.max_pos_blocks_audited,
            poa_bits: POA_BITS,
            poa_bits_soft_fork: POA_BITS_SOFT_FORK,
            poa_bits_new_diff: POA_BITS_NEW_DIFF,
            skip_pow_check,
            exceptions,
        }
    }

    /// Reward paid per audited PoS block at the given tip height.
    pub fn poa_reward_per_audit(&self, tip_height: u32) -> Amount {
        if tip_height >= self.hard_fork_height {
            Amount::from_atoms(ATOMS_PER_COIN / 4)
        } else {
            Amount::from_atoms(ATOMS_PER_COIN / 2)
        }
    }

    /// Upper bound on the audit set at the given tip height.
    pub fn max_audited_at(&self, tip_height: u32) -> usize {
        if tip_height > self.poa_padding_height {
            self.max_pos_blocks_audited
        } else {
            MAX_AUDITED_BEFORE_PADDING
        }
    }
}

struct Heights {
    last_pow_block: u32,
    start_poa_block: u32,
    soft_fork_height: u32,
    poa_new_diff_height: u32,
    hard_fork_height: u32,
    poa_padding_height: u32,
}

struct PoaSchedule {
    poa_padding: u32,
    poa_block_time: u64,
    min_pos_blocks_audited: usize,
    max_pos_blocks_audited: usize,
}

fn limit_shifted(shift: u32) -> BigUint {
    ((BigUint::one() << 256u32) - BigUint::one()) >> shift
}

/// Runtime-adjustable knobs, separate from the immutable [`ChainParams`].
#[derive(Debug)]
pub struct Tunables {
    max_reorg_depth: AtomicU32,
}

impl Tunables {
    /// Default reorg-depth limit.
    pub const DEFAULT_MAX_REORG_DEPTH: u32 = 100;

    /// Create tunables with the default limits.
    pub fn new() -> Self {
        Self {
            max_reorg_depth: AtomicU32::new(Self::DEFAULT_MAX_REORG_DEPTH),
        }
    }

    /// Deepest reorganization the node will follow.
    pub fn max_reorg_depth(&self) -> u32 {
        self.max_reorg_depth.load(Ordering::Relaxed)
    }

    /// Adjust the reorg-depth limit at runtime.
    pub fn set_max_reorg_depth(&self, depth: u32) {
        self.max_reorg_depth.store(depth, Ordering::Relaxed);
    }
}

impl Default for Tunables {
    fn default() -> Self {
        Self::new()
    }
}
