use crate::constants::{POW_EPOCH_LENGTH, WORK_SHARES_THRESHOLD_DIFF};
use crate::errors::{RuleError, RuleResult};
use braid_consensus_core::hashing::HasherExtensions;
use braid_consensus_core::header::Header;
use braid_consensus_core::{Context, CONTEXT_DEPTH};
use braid_hashes::{Hash, Hasher, HasherBase, PowHash};
use lru::LruCache;
use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

const EPOCH_CACHE_SIZE: usize = 8;
const HASH_CACHE_SIZE: usize = 512;

/// The proof-of-work target a hash must not exceed: 2^256 / difficulty.
pub fn target_from_difficulty(difficulty: &BigUint) -> BigUint {
    (BigUint::from(1u8) << 256u32) / difficulty
}

/// The easier target a work share must clear instead of the full block target.
pub fn work_share_target(difficulty: &BigUint) -> BigUint {
    target_from_difficulty(difficulty) << WORK_SHARES_THRESHOLD_DIFF
}

/// The light proof-of-work engine. Treats the hash as an opaque strong
/// function of (seal hash, nonce, epoch seed); the epoch seed is derived by
/// iterated hashing and cached per epoch, and computed (mix, pow) pairs are
/// cached by header identity.
pub struct PowEngine {
    epoch_seeds: Mutex<LruCache<u64, Hash>>,
    hash_cache: Mutex<LruCache<Hash, (Hash, Hash)>>,
}

impl Default for PowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PowEngine {
    pub fn new() -> Self {
        Self {
            epoch_seeds: Mutex::new(LruCache::new(NonZeroUsize::new(EPOCH_CACHE_SIZE).unwrap())),
            hash_cache: Mutex::new(LruCache::new(NonZeroUsize::new(HASH_CACHE_SIZE).unwrap())),
        }
    }

    /// Computes the (mix hash, pow hash) pair for a header. The epoch is
    /// derived from the prime terminus number, so zone reorgs do not rotate
    /// the seed.
    pub fn compute_pow_light(&self, header: &Header) -> (Hash, Hash) {
        let id = header.hash();
        if let Some(pair) = self.hash_cache.lock().get(&id) {
            return *pair;
        }

        let seed = self.epoch_seed(header.prime_terminus_number / POW_EPOCH_LENGTH);
        let seal = header.seal_hash();

        let mut mixer = PowHash::new();
        mixer.update(seal).update(seed).write_u64(header.nonce);
        let mix_hash = mixer.finalize();

        let mut finisher = PowHash::new();
        finisher.update(mix_hash).update(seal);
        let pow_hash = finisher.finalize();

        self.hash_cache.lock().put(id, (mix_hash, pow_hash));
        (mix_hash, pow_hash)
    }

    /// Recomputes the pow hash and checks the header's mix hash commitment.
    pub fn compute_pow_hash(&self, header: &Header) -> RuleResult<Hash> {
        let (mix_hash, pow_hash) = self.compute_pow_light(header);
        if header.mix_hash != mix_hash {
            return Err(RuleError::InvalidMixHash);
        }
        Ok(pow_hash)
    }

    /// Checks whether a header satisfies the PoW difficulty requirement at
    /// its work (zone) difficulty. Returns the pow hash on success.
    pub fn verify_seal(&self, header: &Header) -> RuleResult<Hash> {
        let difficulty = header.difficulty(Context::Zone);
        if difficulty.is_zero() {
            return Err(RuleError::NonPositiveDifficulty);
        }
        let pow_hash = self.compute_pow_hash(header)?;
        if BigUint::from_bytes_be(&pow_hash.as_bytes()) > target_from_difficulty(difficulty) {
            return Err(RuleError::InvalidPoW);
        }
        Ok(pow_hash)
    }

    /// Classifies a block's order: the smallest context whose difficulty
    /// target its pow hash clears. A block clearing no target at all is
    /// invalid work.
    pub fn calc_order(&self, header: &Header) -> RuleResult<Context> {
        let pow_hash = self.compute_pow_hash(header)?;
        let work = BigUint::from_bytes_be(&pow_hash.as_bytes());
        let mut order = None;
        for ctx in (0..CONTEXT_DEPTH).rev() {
            let difficulty = &header.difficulty[ctx];
            if !difficulty.is_zero() && work <= target_from_difficulty(difficulty) {
                order = Some(Context::from_index(ctx).unwrap());
            }
        }
        order.ok_or(RuleError::InvalidPoW)
    }

    /// Whether a header, valid at `node_ctx`, also counts for an ancestor
    /// level.
    pub fn is_dom_coincident(&self, header: &Header, node_ctx: Context) -> RuleResult<bool> {
        Ok(self.calc_order(header)? < node_ctx)
    }

    /// Checks a failed seal against the weaker work-share target.
    pub fn check_work_share(&self, header: &Header) -> RuleResult<()> {
        let difficulty = header.difficulty(Context::Zone);
        if difficulty.is_zero() {
            return Err(RuleError::NonPositiveDifficulty);
        }
        let pow_hash = self.compute_pow_hash(header)?;
        if BigUint::from_bytes_be(&pow_hash.as_bytes()) > work_share_target(difficulty) {
            return Err(RuleError::InvalidWorkShare(header.hash()));
        }
        Ok(())
    }

    fn epoch_seed(&self, epoch: u64) -> Hash {
        if let Some(seed) = self.epoch_seeds.lock().get(&epoch) {
            return *seed;
        }
        let mut seed = PowHash::hash(b"epoch-seed");
        for _ in 0..epoch {
            seed = PowHash::hash(seed);
        }
        self.epoch_seeds.lock().put(epoch, seed);
        seed
    }
}
