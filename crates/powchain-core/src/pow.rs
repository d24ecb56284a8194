//! Proof-of-work search.
//!
//! The search walks the nonce space upwards from a starting nonce and stops at
//! the first nonce whose hash has at least `difficulty` leading zero hex
//! digits. Whether it may also stop early is decided by a [`StopCondition`],
//! so the same loop serves the unbounded miner and the cancellable one.

use crate::{constants::PROGRESS_INTERVAL, error::MineError, Hash};
use rayon::prelude::*;
use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::debug;

/// Nonces handed to rayon per round in parallel mode.
const PARALLEL_BATCH: u64 = 1 << 16;

/// Number of leading `'0'` characters in the lowercase hex form of `hash`.
pub fn leading_zero_nibbles(hash: &Hash) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 2;
        } else {
            if *b < 0x10 {
                total += 1;
            }
            break;
        }
    }
    total
}

pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    leading_zero_nibbles(hash) >= difficulty
}

/// Average number of hashes needed to meet `difficulty` (16^difficulty),
/// saturating at `u128::MAX`.
pub fn expected_attempts(difficulty: u32) -> u128 {
    16u128.checked_pow(difficulty).unwrap_or(u128::MAX)
}

/// Cloneable flag used to abort a running search from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Decides whether a search must give up before finding a nonce.
///
/// `check` is called with the number of hashes computed so far.
pub trait StopCondition {
    type Error;

    fn check(&self, attempts: u64) -> Result<(), Self::Error>;
}

/// Never stops: the search runs until it finds a nonce.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unbounded;

impl StopCondition for Unbounded {
    type Error = Infallible;

    fn check(&self, _attempts: u64) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Stops on cancellation or once a deadline has passed.
#[derive(Clone, Debug, Default)]
pub struct Limits {
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl Limits {
    pub fn new(deadline: Option<Instant>, cancel: Option<CancelToken>) -> Self {
        Self { deadline, cancel }
    }
}

impl StopCondition for Limits {
    type Error = MineError;

    fn check(&self, attempts: u64) -> Result<(), MineError> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(MineError::Cancelled { attempts });
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(MineError::DeadlineExceeded { attempts });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchMode {
    #[default]
    Sequential,
    /// Scan batches of nonces on the rayon pool. The winning nonce is the
    /// lowest one in the batch, so results match the sequential search.
    Parallel,
}

/// How a block gets mined: search mode, progress reporting and the optional
/// timeout and cancellation that bound the search.
#[derive(Clone, Debug)]
pub struct MinerConfig {
    pub mode: SearchMode,
    /// Emit a progress event every this many hashes; 0 disables it.
    pub progress_interval: u64,
    /// Per-block time budget, measured from the start of each search.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::Sequential,
            progress_interval: PROGRESS_INTERVAL,
            timeout: None,
            cancel: None,
        }
    }
}

impl MinerConfig {
    pub fn parallel(mut self) -> Self {
        self.mode = SearchMode::Parallel;
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_progress_interval(mut self, every: u64) -> Self {
        self.progress_interval = every;
        self
    }

    /// Stop condition for a search starting now. A timeout too large to
    /// represent as an `Instant` means no deadline.
    pub fn limits(&self) -> Limits {
        Limits::new(
            self.timeout.and_then(|timeout| Instant::now().checked_add(timeout)),
            self.cancel.clone(),
        )
    }
}

/// Outcome of a successful search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MineStats {
    pub nonce: u64,
    pub hash: Hash,
    /// Hashes computed, including the winning one.
    pub attempts: u64,
    pub elapsed: Duration,
}

/// Search for the first nonce at or after `start` whose hash (as produced by
/// `hash_at`) meets `difficulty`.
///
/// The nonce wraps around at `u64::MAX`. `stop` is polled before every hash
/// in sequential mode and before every batch in parallel mode.
pub fn search<F, S>(
    start: u64,
    difficulty: u32,
    config: &MinerConfig,
    hash_at: F,
    stop: &S,
) -> Result<MineStats, S::Error>
where
    F: Fn(u64) -> Hash + Sync,
    S: StopCondition,
{
    match config.mode {
        SearchMode::Sequential => {
            search_sequential(start, difficulty, config.progress_interval, hash_at, stop)
        }
        SearchMode::Parallel => {
            search_parallel(start, difficulty, config.progress_interval, hash_at, stop)
        }
    }
}

fn search_sequential<F, S>(
    start: u64,
    difficulty: u32,
    progress_interval: u64,
    hash_at: F,
    stop: &S,
) -> Result<MineStats, S::Error>
where
    F: Fn(u64) -> Hash,
    S: StopCondition,
{
    let started = Instant::now();
    let mut nonce = start;
    let mut attempts = 0u64;
    loop {
        stop.check(attempts)?;
        let hash = hash_at(nonce);
        attempts += 1;
        if meets_difficulty(&hash, difficulty) {
            return Ok(MineStats {
                nonce,
                hash,
                attempts,
                elapsed: started.elapsed(),
            });
        }
        if progress_interval != 0 && attempts % progress_interval == 0 {
            debug!(attempts, current = %hex::encode(&hash[..8]), "mining...");
        }
        nonce = nonce.wrapping_add(1);
    }
}

fn search_parallel<F, S>(
    start: u64,
    difficulty: u32,
    progress_interval: u64,
    hash_at: F,
    stop: &S,
) -> Result<MineStats, S::Error>
where
    F: Fn(u64) -> Hash + Sync,
    S: StopCondition,
{
    let started = Instant::now();
    let mut base = start;
    let mut attempts = 0u64;
    loop {
        stop.check(attempts)?;
        let end = base.saturating_add(PARALLEL_BATCH - 1);
        let found = (base..=end)
            .into_par_iter()
            .find_first(|nonce| meets_difficulty(&hash_at(*nonce), difficulty));

        if let Some(nonce) = found {
            attempts = attempts.saturating_add(nonce - base + 1);
            return Ok(MineStats {
                nonce,
                hash: hash_at(nonce),
                attempts,
                elapsed: started.elapsed(),
            });
        }

        let before = attempts;
        attempts = attempts.saturating_add(end - base + 1);
        if progress_interval != 0 && attempts / progress_interval > before / progress_interval {
            debug!(attempts, next = end.wrapping_add(1), "mining...");
        }
        base = end.wrapping_add(1);
    }
}
