use crate::{
    constants::{BYTE, HASH_SIZE},
    error::{BlockFault, MineError},
    pow::{self, leading_zero_nibbles, MineStats, MinerConfig, StopCondition, Unbounded},
    Hash,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

/// One link of the chain.
///
/// `hash` is always the output of hashing the other four fields; nothing
/// outside this module writes it. Mining only ever changes `nonce` and `hash`.
///
/// A deserialized block carries whatever fields the input held, stored hash
/// included. Treat it as untrusted until [`Block::verify`] passes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(with = "hex::serde")]
    hash: Hash,
    #[serde(with = "hex::serde")]
    data: Vec<u8>,
    #[serde(with = "prev_hash_hex")]
    prev_hash: Option<Hash>,
    timestamp: i64,
    nonce: u64,
}

impl Block {
    /// An unmined block with nonce 0. `prev_hash` is `None` for genesis.
    pub fn new(data: impl Into<Vec<u8>>, prev_hash: Option<Hash>, timestamp: i64) -> Self {
        let mut block = Self {
            hash: [0u8; HASH_SIZE],
            data: data.into(),
            prev_hash,
            timestamp,
            nonce: 0,
        };
        block.derive_hash();
        block
    }

    /// Canonical pre-image: `data ++ prev_hash ++ timestamp_be ++ nonce_be`.
    /// The genesis block contributes no bytes for its missing `prev_hash`.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let prev = self.prev_hash_bytes();
        let mut bytes = Vec::with_capacity(self.data.len() + prev.len() + BYTE + BYTE);
        bytes.extend_from_slice(&self.data);
        bytes.extend_from_slice(prev);
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes
    }

    /// Hash of the current field values, without storing it.
    pub fn compute_hash(&self) -> Hash {
        finish(self.prefix_hasher(), self.nonce)
    }

    /// Recompute the hash from the current fields and store it.
    pub fn derive_hash(&mut self) -> Hash {
        self.hash = self.compute_hash();
        self.hash
    }

    /// Increment the nonce until the hash meets `difficulty`. Never gives up.
    pub fn mine(&mut self, difficulty: u32) -> MineStats {
        match self.mine_until(difficulty, &MinerConfig::default(), &Unbounded) {
            Ok(stats) => stats,
            Err(never) => match never {},
        }
    }

    /// Like [`Block::mine`], but honours the config's search mode, timeout and
    /// cancellation. On error the block is left as it was.
    pub fn mine_with(
        &mut self,
        difficulty: u32,
        config: &MinerConfig,
    ) -> Result<MineStats, MineError> {
        self.mine_until(difficulty, config, &config.limits())
    }

    fn mine_until<S: StopCondition>(
        &mut self,
        difficulty: u32,
        config: &MinerConfig,
        stop: &S,
    ) -> Result<MineStats, S::Error> {
        let prefix = self.prefix_hasher();
        let stats = pow::search(
            self.nonce,
            difficulty,
            config,
            |nonce| finish(prefix.clone(), nonce),
            stop,
        )?;
        self.nonce = stats.nonce;
        self.hash = stats.hash;
        info!(
            nonce = stats.nonce,
            attempts = stats.attempts,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            hash = %self.hash_hex(),
            "block mined"
        );
        Ok(stats)
    }

    /// True when the stored hash matches the contents and meets `difficulty`.
    pub fn validate(&self, difficulty: u32) -> bool {
        self.verify(difficulty).is_ok()
    }

    /// Same checks as [`Block::validate`], reporting which one failed.
    /// The hash is always recomputed; the stored value is never trusted.
    pub fn verify(&self, difficulty: u32) -> Result<(), BlockFault> {
        if self.compute_hash() != self.hash {
            return Err(BlockFault::HashMismatch);
        }
        let found = leading_zero_nibbles(&self.hash);
        if found < difficulty {
            return Err(BlockFault::DifficultyNotMet {
                required: difficulty,
                found,
            });
        }
        Ok(())
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn prev_hash(&self) -> Option<Hash> {
        self.prev_hash
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_none()
    }

    fn prev_hash_bytes(&self) -> &[u8] {
        match &self.prev_hash {
            Some(prev) => prev,
            None => &[],
        }
    }

    /// Hasher primed with everything but the nonce.
    fn prefix_hasher(&self) -> Sha256 {
        let mut hasher = Sha256::new();
        hasher.update(&self.data);
        hasher.update(self.prev_hash_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hasher
    }
}

/// Field setters that bypass re-hashing, for simulating external tampering.
#[cfg(any(test, feature = "tamper"))]
impl Block {
    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) {
        self.data = data.into();
    }

    pub fn set_prev_hash(&mut self, prev_hash: Option<Hash>) {
        self.prev_hash = prev_hash;
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }
}

fn finish(mut hasher: Sha256, nonce: u64) -> Hash {
    hasher.update(nonce.to_be_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest[..]);
    out
}

/// Hex for a present link, empty string for genesis.
mod prev_hash_hex {
    use crate::{constants::HASH_SIZE, Hash};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Hash>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.map(hex::encode).unwrap_or_default())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Hash>, D::Error> {
        let s = String::deserialize(d)?;
        if s.is_empty() {
            return Ok(None);
        }
        let mut out = [0u8; HASH_SIZE];
        hex::decode_to_slice(&s, &mut out).map_err(D::Error::custom)?;
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::{CancelToken, SearchMode};
    use std::time::Duration;

    const TS: i64 = 1_600_000_200;

    fn mined(data: &str, prev: Option<Hash>, difficulty: u32) -> Block {
        let mut block = Block::new(data, prev, TS);
        block.mine(difficulty);
        block
    }

    #[test]
    fn hash_bytes_layout() {
        let block = Block::new("abc", Some([7u8; 32]), TS);
        let bytes = block.hash_bytes();
        assert_eq!(bytes.len(), 3 + 32 + 8 + 8);
        assert_eq!(&bytes[0..3], b"abc");
        assert_eq!(&bytes[3..35], &[7u8; 32]);
        assert_eq!(&bytes[35..43], &TS.to_be_bytes());
        assert_eq!(&bytes[43..51], &0u64.to_be_bytes());
    }

    #[test]
    fn genesis_pre_image_has_no_prev_bytes() {
        let block = Block::new("Genesis", None, 1);
        let bytes = block.hash_bytes();
        assert_eq!(bytes.len(), 7 + 8 + 8);
        assert_eq!(&bytes[7..15], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert!(block.is_genesis());
    }

    #[test]
    fn negative_timestamp_is_twos_complement_big_endian() {
        let block = Block::new("", None, -1);
        assert_eq!(&block.hash_bytes()[0..8], &[0xFF; 8]);
    }

    #[test]
    fn hash_is_sha256_of_pre_image() {
        let block = Block::new("payload", Some([1u8; 32]), TS);
        let digest = Sha256::digest(block.hash_bytes());
        assert_eq!(&block.hash()[..], &digest[..]);
    }

    #[test]
    fn known_hash_for_fixed_fields() {
        // sha256("" ++ "" ++ 0_i64 be ++ 0_u64 be) = sha256 of sixteen zero bytes
        let block = Block::new(Vec::new(), None, 0);
        assert_eq!(
            block.hash_hex(),
            "374708fff7719dd5979ec875d56cd2286f6d3cf7ec317a3b25632aab28ec37bb"
        );
    }

    #[test]
    fn known_nonce_for_genesis() {
        let mut block = Block::new("Genesis", None, 1_600_000_000);
        let stats = block.mine(2);
        assert_eq!(stats.nonce, 270);
        assert_eq!(stats.attempts, 271);
        assert_eq!(
            block.hash_hex(),
            "00c1014f5e097e5bfdd6bcd3d70766deea73eb4d2eb8118507c204119c0282db"
        );
    }

    #[test]
    fn derive_hash_is_deterministic() {
        let mut block = Block::new("A", Some([9u8; 32]), TS);
        let first = block.derive_hash();
        let second = block.derive_hash();
        assert_eq!(first, second);
        assert_eq!(first, block.compute_hash());
    }

    #[test]
    fn hash_changes_with_nonce() {
        let mut block = Block::new("A", None, TS);
        let before = block.hash();
        block.set_nonce(1);
        assert_ne!(before, block.derive_hash());
    }

    #[test]
    fn mining_meets_difficulty() {
        let block = mined("Alice sends 10 BTC to Bob", Some([3u8; 32]), 2);
        assert!(block.hash_hex().starts_with("00"));
        assert!(block.validate(2));
        assert_eq!(block.hash(), block.compute_hash());
    }

    #[test]
    fn difficulty_zero_mines_on_first_attempt() {
        let mut block = Block::new("anything", None, TS);
        let stats = block.mine(0);
        assert_eq!(stats.nonce, 0);
        assert_eq!(stats.attempts, 1);
        assert_eq!(block.nonce(), 0);
        assert!(block.validate(0));
    }

    #[test]
    fn parallel_mining_finds_the_same_nonce() {
        let mut sequential = Block::new("same", None, TS);
        let mut parallel = sequential.clone();
        sequential.mine(3);
        let config = MinerConfig::default().with_mode(SearchMode::Parallel);
        parallel.mine_with(3, &config).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn cancelled_mining_leaves_block_untouched() {
        let mut block = Block::new("slow", None, TS);
        let before = block.clone();
        let cancel = CancelToken::new();
        cancel.cancel();
        let config = MinerConfig::default().with_cancel(cancel);
        let err = block.mine_with(10, &config).unwrap_err();
        assert!(matches!(err, MineError::Cancelled { .. }));
        assert_eq!(block, before);
    }

    #[test]
    fn timed_out_mining_reports_deadline() {
        let mut block = Block::new("slow", None, TS);
        let config = MinerConfig::default().with_timeout(Duration::from_millis(5));
        let err = block.mine_with(64, &config).unwrap_err();
        assert!(matches!(err, MineError::DeadlineExceeded { .. }));
    }

    #[test]
    fn tampering_any_field_is_detected() {
        let original = mined("A", Some([5u8; 32]), 1);

        let mut data = original.clone();
        data.set_data("B");
        assert_eq!(data.verify(1), Err(BlockFault::HashMismatch));

        let mut prev = original.clone();
        prev.set_prev_hash(Some([6u8; 32]));
        assert!(!prev.validate(1));

        let mut unlinked = original.clone();
        unlinked.set_prev_hash(None);
        assert!(!unlinked.validate(1));

        let mut ts = original.clone();
        ts.set_timestamp(TS + 1);
        assert!(!ts.validate(1));

        let mut nonce = original.clone();
        nonce.set_nonce(original.nonce() + 1);
        assert!(!nonce.validate(1));

        assert!(original.validate(1));
    }

    #[test]
    fn unmined_block_fails_difficulty_only() {
        let block = Block::new("A", None, TS);
        let found = leading_zero_nibbles(&block.hash());
        let required = found + 1;
        assert_eq!(
            block.verify(required),
            Err(BlockFault::DifficultyNotMet { required, found })
        );
        assert!(block.validate(found));
    }

    #[test]
    fn serializes_hashes_as_hex() {
        let genesis = mined("Genesis", None, 1);
        let json = serde_json::to_value(&genesis).unwrap();
        assert_eq!(json["hash"], genesis.hash_hex());
        assert_eq!(json["prev_hash"], "");
        assert_eq!(json["data"], hex::encode("Genesis"));

        let child = mined("A", Some(genesis.hash()), 1);
        let text = serde_json::to_string(&child).unwrap();
        let back: Block = serde_json::from_str(&text).unwrap();
        assert_eq!(back, child);
        assert!(back.validate(1));
    }

    #[test]
    fn deserialized_hash_is_not_trusted() {
        let block = mined("A", None, 1);
        let mut json = serde_json::to_value(&block).unwrap();
        json["data"] = hex::encode("B").into();
        let forged: Block = serde_json::from_value(json).unwrap();
        assert_eq!(forged.hash(), block.hash());
        assert_eq!(forged.verify(1), Err(BlockFault::HashMismatch));

        let mut json = serde_json::to_value(&block).unwrap();
        json["hash"] = hex::encode([0u8; 32]).into();
        let forged: Block = serde_json::from_value(json).unwrap();
        assert_eq!(forged.verify(0), Err(BlockFault::HashMismatch));
    }
}
