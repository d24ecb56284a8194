use thiserror::Error;

/// Why a single block failed verification.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum BlockFault {
    #[error("stored hash does not match the block contents")]
    HashMismatch,
    #[error("hash has {found} leading zero digits, difficulty requires {required}")]
    DifficultyNotMet { required: u32, found: u32 },
    #[error("previous hash does not match the preceding block")]
    LinkageBroken,
    #[error("timestamp {current} is earlier than the preceding block's {previous}")]
    TimestampNotMonotonic { previous: i64, current: i64 },
}

/// First failure found while walking a chain.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("block {index} is invalid: {fault}")]
pub struct ValidationError {
    pub index: usize,
    pub fault: BlockFault,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MineError {
    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
    #[error("mining deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u64 },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("difficulty {difficulty} is out of range (max {max})")]
    DifficultyOutOfRange { difficulty: u32, max: u32 },
    #[error(transparent)]
    Mining(#[from] MineError),
}
