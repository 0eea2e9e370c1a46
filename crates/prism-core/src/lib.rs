#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Prism canonical protocol types.
//!
//! This crate is responsible for:
//! - consensus-visible data structures (headers, blocks, audit summaries)
//! - canonical Borsh serialization and BLAKE3 hashing
//! - the audit merkle tree embedded in PoA blocks
//!
//! It intentionally does **not** include chain state, storage, or
//! validation rules beyond structural sanity.

pub mod constants;
pub mod merkle;
pub mod serialization;
pub mod types;

pub use constants::*;
pub use merkle::*;
pub use serialization::*;
pub use types::*;
