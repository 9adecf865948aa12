use crate::model::ChainHeaderReader;
use crate::params::Params;
use braid_consensus_core::header::Header;
use braid_consensus_core::Context;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;

/// Fixed-point fractional bits used by the log-entropy representation.
const ENTROPY_MANT_BITS: u32 = 64;

/// Difficulty adjustment. Returns the difficulty a new zone block must carry
/// when built on `parent`:
///
///   e = (DurationLimit - (parent.time - grandparent.time)) * parent.difficulty
///   k = floor(log2(parent.difficulty))
///   difficulty = max(parent.difficulty + e*k / (DurationLimit*AdjustmentFactor*AdjustmentPeriod), MinDifficulty)
///
/// A genesis parent keeps its difficulty unchanged, as does a parent whose
/// own parent is genesis (no grandparent interval exists yet).
pub fn calc_difficulty<R: ChainHeaderReader>(params: &Params, chain: &R, parent: &Header) -> BigUint {
    let parent_difficulty = parent.difficulty(Context::Zone);
    if chain.is_genesis(parent.hash()) {
        return parent_difficulty.clone();
    }
    let grandparent = match chain.get_header(parent.parent_hash(Context::Zone)) {
        Some(grandparent) if !chain.is_genesis(grandparent.hash()) => grandparent,
        _ => return parent_difficulty.clone(),
    };

    let interval = BigInt::from(parent.time) - BigInt::from(grandparent.time);
    let k = parent_difficulty.bits().saturating_sub(1);

    let mut x = BigInt::from(params.duration_limit) - interval;
    x *= BigInt::from_biguint(Sign::Plus, parent_difficulty.clone());
    x *= BigInt::from(k);
    x /= BigInt::from(params.duration_limit);
    x /= BigInt::from(params.difficulty_adjustment_factor);
    x /= BigInt::from(params.difficulty_adjustment_period);
    x += BigInt::from_biguint(Sign::Plus, parent_difficulty.clone());

    let candidate = x.to_biguint().unwrap_or_default();
    candidate.max(params.min_difficulty.clone())
}

/// The work contribution of one sealed block, as a fixed-point approximation
/// of log2(difficulty): integer part in the high bits, a linear-interpolated
/// fraction in the low `ENTROPY_MANT_BITS`.
pub fn intrinsic_log_entropy(difficulty: &BigUint) -> BigUint {
    if difficulty.bits() <= 1 {
        return BigUint::zero();
    }
    let k = difficulty.bits() as u32 - 1;
    let mantissa = ((difficulty << ENTROPY_MANT_BITS) >> k) - (BigUint::from(1u8) << ENTROPY_MANT_BITS);
    (BigUint::from(k) << ENTROPY_MANT_BITS) + mantissa
}

/// Total accumulated log-entropy through `header`, as seen from `ctx`.
pub fn total_log_entropy(header: &Header, ctx: Context) -> BigUint {
    &header.parent_entropy[ctx.index()] + intrinsic_log_entropy(header.difficulty(Context::Zone))
}

/// Log-entropy accumulated at `ctx` since the last coincidence with the
/// dominant chain.
pub fn delta_log_entropy(header: &Header, ctx: Context) -> BigUint {
    &header.parent_delta_entropy[ctx.index()] + intrinsic_log_entropy(header.difficulty(Context::Zone))
}

/// Like [`delta_log_entropy`] but accumulating the work of included uncles.
pub fn uncled_delta_log_entropy(header: &Header, uncles: &[Header], ctx: Context) -> BigUint {
    let uncle_work: BigUint = uncles.iter().map(|uncle| intrinsic_log_entropy(uncle.difficulty(Context::Zone))).sum();
    &header.parent_uncled_delta_entropy[ctx.index()] + uncle_work
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_consensus_core::block::Block;
    use braid_hashes::Hash;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct MapChain {
        headers: HashMap<Hash, Arc<Header>>,
        genesis: Hash,
    }

    impl ChainHeaderReader for MapChain {
        fn get_header(&self, hash: Hash) -> Option<Arc<Header>> {
            self.headers.get(&hash).cloned()
        }
        fn get_block(&self, _hash: Hash) -> Option<Arc<Block>> {
            None
        }
        fn get_td(&self, _hash: Hash) -> Option<BigUint> {
            None
        }
        fn is_genesis(&self, hash: Hash) -> bool {
            hash == self.genesis
        }
    }

    fn params() -> Params {
        use braid_consensus_core::{Address, Location};
        Params::new(1, Location::zone(0, 0), 1000u32.into(), 16u32.into(), 10, Address::default(), Address::default())
    }

    fn chain_of(headers: &[&Header], genesis: Hash) -> MapChain {
        MapChain { headers: headers.iter().map(|h| (h.hash(), Arc::new((*h).clone()))).collect(), genesis }
    }

    fn header_at(parent: &Header, time: u64, difficulty: u32) -> Header {
        let mut header = Header { time, ..Default::default() };
        header.parent_hash[Context::Zone.index()] = parent.hash();
        header.difficulty[Context::Zone.index()] = difficulty.into();
        header.finalize();
        header
    }

    #[test]
    fn genesis_parent_keeps_difficulty() {
        let params = params();
        let genesis = params.genesis_header();
        let chain = chain_of(&[&genesis], genesis.hash());
        assert_eq!(calc_difficulty(&params, &chain, &genesis), params.genesis_difficulty);
    }

    #[test]
    fn slow_blocks_drop_difficulty_and_fast_blocks_raise_it() {
        let params = params();
        let genesis = params.genesis_header();
        let parent = header_at(&genesis, 100, 1 << 20);
        let chain = chain_of(&[&genesis, &parent], genesis.hash());

        // parent of parent is genesis: interval unknown, difficulty carried
        assert_eq!(calc_difficulty(&params, &chain, &parent), BigUint::from(1u32 << 20));

        let slow_child = header_at(&parent, 100 + 50, 1 << 20);
        let chain = chain_of(&[&genesis, &parent, &slow_child], genesis.hash());
        let slow = calc_difficulty(&params, &chain, &slow_child);
        assert!(slow < BigUint::from(1u32 << 20), "late block must lower difficulty, got {}", slow);

        let fast_child = header_at(&parent, 100 + 1, 1 << 20);
        let chain = chain_of(&[&genesis, &parent, &fast_child], genesis.hash());
        let fast = calc_difficulty(&params, &chain, &fast_child);
        assert!(fast > BigUint::from(1u32 << 20), "early block must raise difficulty, got {}", fast);
    }

    #[test]
    fn difficulty_is_clamped_at_the_minimum() {
        let mut params = params();
        params.min_difficulty = BigUint::from(1u32 << 20);
        let genesis = params.genesis_header();
        let parent = header_at(&genesis, 100, 1 << 20);
        // enormous interval so the adjustment would fall below the minimum
        let child = header_at(&parent, 1_000_000, 1 << 20);
        let chain = chain_of(&[&genesis, &parent, &child], genesis.hash());
        assert_eq!(calc_difficulty(&params, &chain, &child), params.min_difficulty);
    }

    #[test]
    fn intrinsic_entropy_is_monotone_in_difficulty() {
        let low = intrinsic_log_entropy(&BigUint::from(1u32 << 10));
        let mid = intrinsic_log_entropy(&BigUint::from((1u32 << 12) + 17));
        let high = intrinsic_log_entropy(&BigUint::from(1u32 << 13));
        assert!(low < mid && mid < high);
        assert!(intrinsic_log_entropy(&BigUint::zero()).is_zero());
        // exact powers of two carry a zero fraction
        assert_eq!(intrinsic_log_entropy(&BigUint::from(1u32 << 10)), BigUint::from(10u32) << ENTROPY_MANT_BITS);
    }

    #[test]
    fn total_entropy_accumulates_on_parent_slot() {
        let mut header = Header::default();
        header.parent_entropy[Context::Region.index()] = BigUint::from(5u32) << ENTROPY_MANT_BITS;
        header.difficulty[Context::Zone.index()] = BigUint::from(1u32 << 3);
        header.finalize();
        assert_eq!(total_log_entropy(&header, Context::Region), BigUint::from(8u32) << ENTROPY_MANT_BITS);
    }
}
