//! Plain-text and JSON renderings of a chain.

use chrono::DateTime;
use powchain_core::{pow::expected_attempts, BlockSummary, Chain, Clock};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Serialize)]
pub struct ChainReport {
    pub difficulty: u32,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub blocks: Vec<BlockSummary>,
}

impl ChainReport {
    pub fn new<C: Clock>(chain: &Chain<C>) -> Self {
        let validation = chain.validate();
        Self {
            difficulty: chain.difficulty(),
            valid: validation.is_ok(),
            error: validation.err().map(|e| e.to_string()),
            blocks: chain.summaries(),
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC, or the raw number when out of range.
pub fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

pub fn write_blocks<W: Write>(out: &mut W, blocks: &[BlockSummary]) -> io::Result<()> {
    for block in blocks {
        writeln!(out, "\n--- Block {} ---", block.index)?;
        writeln!(out, "Timestamp: {}", format_timestamp(block.timestamp))?;
        writeln!(out, "Data: {}", block.data)?;
        writeln!(out, "Nonce: {}", block.nonce)?;
        writeln!(out, "PrevHash: {}", block.prev_hash)?;
        writeln!(out, "Hash: {}", block.hash)?;
    }
    Ok(())
}

pub fn write_validation<W: Write, C: Clock>(out: &mut W, chain: &Chain<C>) -> io::Result<bool> {
    match chain.validate() {
        Ok(()) => {
            writeln!(out, "Chain is valid")?;
            Ok(true)
        }
        Err(err) => {
            writeln!(out, "Chain is invalid: {err}")?;
            Ok(false)
        }
    }
}

pub fn write_difficulty_table<W: Write>(out: &mut W, max: u32) -> io::Result<()> {
    for difficulty in 1..=max {
        writeln!(
            out,
            "Difficulty {difficulty}: ~{} attempts",
            expected_attempts(difficulty)
        )?;
    }
    Ok(())
}
