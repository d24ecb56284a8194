use crate::{
    block::Block,
    constants::{GENESIS_DATA, MAX_DIFFICULTY},
    error::{BlockFault, ChainError, MineError, ValidationError},
    pow::MinerConfig,
};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Source of block timestamps, in Unix seconds.
pub trait Clock {
    fn now(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or_default()
    }
}

/// Append-only sequence of mined blocks sharing one difficulty.
///
/// A chain always holds at least its genesis block.
#[derive(Clone, Debug)]
pub struct Chain<C: Clock = SystemClock> {
    blocks: Vec<Block>,
    difficulty: u32,
    clock: C,
    miner: MinerConfig,
}

impl Chain<SystemClock> {
    pub fn new(difficulty: u32) -> Result<Self, ChainError> {
        Self::with_clock(difficulty, SystemClock, MinerConfig::default())
    }

    pub fn with_miner(difficulty: u32, miner: MinerConfig) -> Result<Self, ChainError> {
        Self::with_clock(difficulty, SystemClock, miner)
    }
}

impl<C: Clock> Chain<C> {
    /// Build a chain and mine its genesis block.
    pub fn with_clock(difficulty: u32, clock: C, miner: MinerConfig) -> Result<Self, ChainError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(ChainError::DifficultyOutOfRange {
                difficulty,
                max: MAX_DIFFICULTY,
            });
        }
        let genesis = create_genesis(difficulty, clock.now(), &miner)?;
        info!(difficulty, hash = %genesis.hash_hex(), "genesis block created");
        Ok(Self {
            blocks: vec![genesis],
            difficulty,
            clock,
            miner,
        })
    }

    /// Mine a block on top of the tip and append it.
    ///
    /// Only fails when the miner config carries a timeout or cancel token;
    /// the chain is unchanged in that case.
    pub fn add_block(&mut self, data: impl Into<Vec<u8>>) -> Result<&Block, ChainError> {
        let index = self.blocks.len();
        let mut block = Block::new(data, Some(self.tip().hash()), self.clock.now());
        let stats = block.mine_with(self.difficulty, &self.miner)?;
        info!(
            index,
            nonce = stats.nonce,
            attempts = stats.attempts,
            hash = %block.hash_hex(),
            "block appended"
        );
        self.blocks.push(block);
        Ok(&self.blocks[index])
    }

    /// Walk the chain and report the first invalid block.
    ///
    /// Blocks 1.. are checked in order (own hash and difficulty, link to the
    /// predecessor, timestamp order); genesis is checked last.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (offset, pair) in self.blocks.windows(2).enumerate() {
            let index = offset + 1;
            let (prev, current) = (&pair[0], &pair[1]);
            current
                .verify(self.difficulty)
                .and_then(|()| check_link(prev, current))
                .map_err(|fault| reject(index, fault))?;
        }
        self.blocks[0]
            .verify(self.difficulty)
            .map_err(|fault| reject(0, fault))
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn tip(&self) -> &Block {
        // never empty: genesis is pushed at construction
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a chain holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn summaries(&self) -> Vec<BlockSummary> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(index, block)| BlockSummary::new(index, block))
            .collect()
    }

    /// Direct mutable access to a block, for simulating tampering.
    #[cfg(any(test, feature = "tamper"))]
    pub fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }
}

/// The first block: payload "Genesis", no predecessor, mined to `difficulty`.
pub fn create_genesis(
    difficulty: u32,
    timestamp: i64,
    miner: &MinerConfig,
) -> Result<Block, MineError> {
    let mut genesis = Block::new(GENESIS_DATA, None, timestamp);
    genesis.mine_with(difficulty, miner)?;
    Ok(genesis)
}

fn check_link(prev: &Block, current: &Block) -> Result<(), BlockFault> {
    if current.prev_hash() != Some(prev.hash()) {
        return Err(BlockFault::LinkageBroken);
    }
    if current.timestamp() < prev.timestamp() {
        return Err(BlockFault::TimestampNotMonotonic {
            previous: prev.timestamp(),
            current: current.timestamp(),
        });
    }
    Ok(())
}

fn reject(index: usize, fault: BlockFault) -> ValidationError {
    warn!(index, %fault, "chain validation failed");
    ValidationError { index, fault }
}

/// Display row for one block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    pub index: usize,
    pub timestamp: i64,
    /// Payload as UTF-8, with invalid sequences replaced.
    pub data: String,
    pub nonce: u64,
    pub prev_hash: String,
    pub hash: String,
}

impl BlockSummary {
    pub fn new(index: usize, block: &Block) -> Self {
        Self {
            index,
            timestamp: block.timestamp(),
            data: String::from_utf8_lossy(block.data()).into_owned(),
            nonce: block.nonce(),
            prev_hash: block.prev_hash().map(hex::encode).unwrap_or_default(),
            hash: block.hash_hex(),
        }
    }
}
