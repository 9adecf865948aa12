use crate::constants::{MIN_GAS_LIMIT, MIN_STATE_LIMIT};
use braid_consensus_core::header::Header;
use braid_consensus_core::{Address, Context, Location, CONTEXT_DEPTH};
use braid_hashes::Hash;
use num_bigint::BigUint;

/// Zone block reward in base units; Region pays 3x and Prime 9x.
pub const ZONE_BLOCK_REWARD: u128 = 5_000_000_000_000_000_000;

/// Chain-instance parameters. One `Params` value describes one slice node:
/// its location in the hierarchy, the shared genesis, and the difficulty,
/// limit and reward tuning of the network it runs on.
#[derive(Clone, Debug)]
pub struct Params {
    pub chain_id: u64,
    /// This node's location; fixed for the process lifetime.
    pub location: Location,
    /// Target seconds between blocks at a zone.
    pub duration_limit: u64,
    pub difficulty_adjustment_factor: u64,
    pub difficulty_adjustment_period: u64,
    pub min_difficulty: BigUint,
    pub genesis_difficulty: BigUint,
    pub gas_ceil: u64,
    pub state_ceil: u64,
    pub blocks_per_month: u64,
    /// Path of the per-zone genesis allocation file, if this node applies one.
    pub gen_allocs_path: Option<String>,
    pub zone_block_reward: u128,
    /// Coinbase lockup tranches mature one epoch after the epoch they accrue in.
    pub lockup_epoch_blocks: u64,
    /// Addresses newly generated pending headers pay out to.
    pub primary_coinbase: Address,
    pub secondary_coinbase: Address,
    /// RPC timeout toward dom/sub peers, in milliseconds.
    pub rpc_timeout_millis: u64,

    genesis_hash: Hash,
}

impl Params {
    pub fn new(
        chain_id: u64,
        location: Location,
        genesis_difficulty: BigUint,
        min_difficulty: BigUint,
        duration_limit: u64,
        primary_coinbase: Address,
        secondary_coinbase: Address,
    ) -> Self {
        let mut params = Self {
            chain_id,
            location,
            duration_limit,
            difficulty_adjustment_factor: 40,
            difficulty_adjustment_period: 360,
            min_difficulty,
            genesis_difficulty,
            gas_ceil: 20_000_000,
            state_ceil: 10_000_000,
            blocks_per_month: 259_200,
            gen_allocs_path: None,
            zone_block_reward: ZONE_BLOCK_REWARD,
            lockup_epoch_blocks: 3600,
            primary_coinbase,
            secondary_coinbase,
            rpc_timeout_millis: 5_000,
            genesis_hash: Hash::default(),
        };
        params.genesis_hash = params.genesis_header().hash();
        params
    }

    pub fn node_ctx(&self) -> Context {
        self.location.context()
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis_hash
    }

    pub fn is_genesis(&self, hash: Hash) -> bool {
        hash == self.genesis_hash
    }

    /// The shared genesis header of the whole tree. Deterministic in the
    /// chain id and difficulty settings, so every node derives the same hash.
    pub fn genesis_header(&self) -> Header {
        let mut header = Header {
            difficulty: std::array::from_fn(|_| self.genesis_difficulty.clone()),
            gas_limit: [MIN_GAS_LIMIT; CONTEXT_DEPTH],
            state_limit: self.state_ceil.max(MIN_STATE_LIMIT),
            extra: self.chain_id.to_be_bytes().to_vec(),
            ..Default::default()
        };
        header.finalize();
        header
    }

    pub fn region_block_reward(&self) -> u128 {
        3 * self.zone_block_reward
    }

    pub fn prime_block_reward(&self) -> u128 {
        9 * self.zone_block_reward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_hash_is_shared_across_contexts() {
        let a = Params::new(1, Location::zone(0, 0), 100u32.into(), 10u32.into(), 10, Address::default(), Address::default());
        let b = Params::new(1, Location::region(1), 100u32.into(), 10u32.into(), 10, Address::default(), Address::default());
        assert_eq!(a.genesis_hash(), b.genesis_hash());

        let other_chain = Params::new(2, Location::zone(0, 0), 100u32.into(), 10u32.into(), 10, Address::default(), Address::default());
        assert_ne!(a.genesis_hash(), other_chain.genesis_hash());
    }

    #[test]
    fn reward_ratios() {
        let params = Params::new(1, Location::zone(0, 0), 100u32.into(), 10u32.into(), 10, Address::default(), Address::default());
        assert_eq!(params.region_block_reward(), 3 * params.zone_block_reward);
        assert_eq!(params.prime_block_reward(), 3 * params.region_block_reward());
    }
}
