use crate::constants::{INCLUSION_REWARD_DIVISOR, UNCLE_REWARD_DEPTH};
use crate::params::Params;
use braid_consensus_core::header::Header;
use braid_consensus_core::{Address, Context};
use braid_hashes::Hash;

/// The opaque account state machine rewards and unlocks are applied against.
pub trait StateLedger {
    fn add_balance(&mut self, address: Address, amount: u128);
    fn set_nonce(&mut self, address: Address, nonce: u64);
    /// The state commitment after all pending mutations.
    fn intermediate_root(&mut self) -> Hash;
}

/// Reward paid for a block of the given order.
pub fn block_reward(order: Context, params: &Params) -> u128 {
    match order {
        Context::Prime => params.prime_block_reward(),
        Context::Region => params.region_block_reward(),
        Context::Zone => params.zone_block_reward,
    }
}

/// The classical depth-discounted uncle reward:
/// (uncle.number + 8 - header.number) * blockReward / 8. Zero once the uncle
/// is too deep.
pub fn uncle_reward(uncle_number: u64, header_number: u64, reward: u128) -> u128 {
    let depth_bonus = (uncle_number + UNCLE_REWARD_DEPTH).saturating_sub(header_number);
    reward * depth_bonus as u128 / UNCLE_REWARD_DEPTH as u128
}

/// Accumulates the block and uncle rewards into the ledger: each uncle's
/// coinbase receives its discounted reward, and the miner receives the block
/// reward plus reward/32 per included uncle.
pub fn accumulate_rewards<L: StateLedger>(ledger: &mut L, header: &Header, uncles: &[Header], order: Context, params: &Params) {
    let node_ctx = params.node_ctx();
    let reward = block_reward(order, params);

    let mut miner_reward = reward;
    for uncle in uncles {
        let r = uncle_reward(uncle.number(node_ctx), header.number(node_ctx), reward);
        ledger.add_balance(uncle.primary_coinbase, r);
        miner_reward += reward / INCLUSION_REWARD_DIVISOR;
    }
    ledger.add_balance(header.primary_coinbase, miner_reward);
}
