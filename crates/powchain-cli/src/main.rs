mod cli;
mod logging;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, MiningArgs};
use powchain_core::{CancelToken, Chain};
use report::ChainReport;
use std::io::{self, Write};
use tracing::{info, warn};

const DEMO_PAYLOADS: [&str; 3] = [
    "Alice sends 10 BTC to Bob",
    "Bob sends 5 BTC to Charlie",
    "Charlie sends 3 BTC to Alice",
];
const TAMPERED_PAYLOAD: &str = "Alice sends 1000 BTC to Bob";
const DEMO_TABLE_MAX: u32 = 6;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.log_format);

    match cli.command {
        Command::Demo { mining } => demo(mining).await,
        Command::Mine { mining, data, json } => mine(mining, data, json).await,
        Command::Table { max } => {
            let mut out = io::stdout().lock();
            report::write_difficulty_table(&mut out, max)?;
            Ok(())
        }
    }
}

/// Mine genesis plus one block per payload on a blocking thread.
/// Ctrl-C cancels the search and surfaces as an error.
async fn build_chain(mining: &MiningArgs, payloads: Vec<String>) -> Result<Chain> {
    let cancel = CancelToken::new();
    let miner = mining.miner_config(cancel.clone());
    let difficulty = mining.difficulty;

    let mut worker = tokio::task::spawn_blocking(move || {
        let mut chain = Chain::with_miner(difficulty, miner)?;
        for data in payloads {
            info!(index = chain.len(), %data, "mining block");
            chain.add_block(data)?;
        }
        Ok::<_, powchain_core::ChainError>(chain)
    });

    let finished = tokio::select! {
        joined = &mut worker => Some(joined),
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    warn!("interrupt received, cancelling mining");
                    cancel.cancel();
                }
                Err(err) => warn!(%err, "cannot listen for ctrl-c"),
            }
            None
        }
    };
    let joined = match finished {
        Some(joined) => joined,
        None => worker.await,
    };
    let chain = joined
        .context("mining task failed")?
        .context("could not build chain")?;
    Ok(chain)
}

async fn demo(mining: MiningArgs) -> Result<()> {
    {
        let mut out = io::stdout().lock();
        writeln!(out, "Proof-of-Work Blockchain")?;
        writeln!(out, "\nDifficulty: {}", mining.difficulty)?;
        out.flush()?;
    }

    let payloads = DEMO_PAYLOADS.iter().map(|p| p.to_string()).collect();
    let mut chain = build_chain(&mining, payloads).await?;
    let mut out = io::stdout().lock();

    writeln!(out, "\nBlockchain Contents")?;
    report::write_blocks(&mut out, &chain.summaries())?;

    writeln!(out, "\nValidation")?;
    report::write_validation(&mut out, &chain)?;

    writeln!(out, "\nTamper Detection")?;
    let block = chain
        .block_mut(1)
        .context("demo chain has no block 1")?;
    let stored = block.hash_hex();
    block.set_data(TAMPERED_PAYLOAD);
    let actual = hex::encode(block.compute_hash());
    if report::write_validation(&mut out, &chain)? {
        writeln!(out, "Tampering went unnoticed")?;
    } else {
        writeln!(out, "Tampering detected")?;
    }
    writeln!(out, "\nStored hash:   {stored}")?;
    writeln!(out, "Actual hash:   {actual}")?;

    writeln!(out, "\nDifficulty Comparison")?;
    report::write_difficulty_table(&mut out, DEMO_TABLE_MAX)?;
    Ok(())
}

async fn mine(mining: MiningArgs, data: Vec<String>, json: bool) -> Result<()> {
    let chain = build_chain(&mining, data).await?;
    let mut out = io::stdout().lock();

    if json {
        let report = ChainReport::new(&chain);
        serde_json::to_writer_pretty(&mut out, &report).context("could not encode chain")?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "Difficulty: {}", chain.difficulty())?;
    report::write_blocks(&mut out, &chain.summaries())?;
    writeln!(out)?;
    report::write_validation(&mut out, &chain)?;
    Ok(())
}
