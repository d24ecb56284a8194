pub const BYTE: usize = 8;
pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// Highest difficulty that can ever be met: every hex digit of the hash is '0'.
pub const MAX_DIFFICULTY: u32 = HASH_HEX_SIZE as u32;
pub const DEFAULT_DIFFICULTY: u32 = 3;
pub const PROGRESS_INTERVAL: u64 = 10_000;
pub const GENESIS_DATA: &[u8] = b"Genesis";
