#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod chain;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use prism_chain::ChainDb;
use prism_consensus::{ChainParams, CommitmentVerifier, Network, StakeVerifier, Tunables};
use prism_core::{BlockKind, Output};
use tracing::info;

use chain::{build_genesis, ChainState};

/// Stake kernels are re-verified by the staking subsystem before blocks
/// reach the chain state; replay trusts the verdicts recorded there.
struct RecordedStake;

impl StakeVerifier for RecordedStake {
    fn reverify_pos_block(&self, _entry: &prism_chain::IndexEntry) -> bool {
        true
    }
}

/// Commitment verification lives in the privacy subsystem; replay trusts
/// stored outputs.
struct RecordedCommitments;

impl CommitmentVerifier for RecordedCommitments {
    fn verify_zero_blind_commitment(&self, _output: &Output) -> bool {
        true
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let network = match env::var("PRISM_NETWORK")
        .unwrap_or_else(|_| "mainnet".to_string())
        .as_str()
    {
        "mainnet" => Network::Mainnet,
        "testnet" => Network::Testnet,
        "regtest" => Network::Regtest,
        other => bail!("unknown network {other:?}"),
    };
    let db_path = PathBuf::from(
        env::var("PRISM_DB").unwrap_or_else(|_| "prism.chain.db".to_string()),
    );

    let params = ChainParams::for_network(network);
    let tunables = Arc::new(Tunables::new());
    info!(?network, db = %db_path.display(), "starting prism node");

    let db = ChainDb::open(&db_path).context("open chain database")?;
    let genesis = build_genesis(&params);
    let chain = ChainState::load_or_init(
        db,
        genesis,
        Arc::clone(&params),
        Arc::clone(&tunables),
        RecordedStake,
        RecordedCommitments,
    )
    .context("load chain state")?;

    // Replay report: tip plus the most recent audit attestation.
    let tip_height = chain.tip_height();
    let tip_hash = chain.tip_hash();
    info!(height = tip_height, hash = %tip_hash, "active tip");

    let mut cursor = Some(chain.tip());
    while let Some(id) = cursor {
        let entry = chain.index().entry(id);
        if entry.kind == BlockKind::PoA {
            let body = chain.read_block(id).context("read PoA block body")?;
            let last = body.audited.last().map(|s| s.height).unwrap_or(0);
            info!(
                height = entry.height,
                audited = body.audited.len(),
                last_audited_height = last,
                "most recent audit attestation"
            );
            break;
        }
        cursor = entry.prev;
    }

    Ok(())
}
