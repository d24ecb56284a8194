//! Hash-linked block chain secured by proof-of-work.
//!
//! A [`Chain`] owns an append-only list of [`Block`]s. Every block commits to
//! its payload, its predecessor's hash, a timestamp and a nonce through
//! SHA-256; appending requires finding a nonce whose hash starts with
//! `difficulty` zero hex digits. [`Chain::validate`] recomputes every hash, so
//! any edit made after mining is caught.

pub mod block;
pub mod chain;
pub mod constants;
pub mod error;
pub mod pow;

pub type Hash = [u8; constants::HASH_SIZE];

pub use block::Block;
pub use chain::{create_genesis, BlockSummary, Chain, Clock, SystemClock};
pub use error::{BlockFault, ChainError, MineError, ValidationError};
pub use pow::{CancelToken, MineStats, MinerConfig, SearchMode};
