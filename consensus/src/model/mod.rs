pub mod stores;

use braid_consensus_core::block::Block;
use braid_consensus_core::header::Header;
use braid_hashes::Hash;
use num_bigint::BigUint;
use std::sync::Arc;

/// Read access to the locally known chain, as required by header
/// verification and difficulty calculation.
pub trait ChainHeaderReader {
    fn get_header(&self, hash: Hash) -> Option<Arc<Header>>;
    fn get_block(&self, hash: Hash) -> Option<Arc<Block>>;
    fn get_td(&self, hash: Hash) -> Option<BigUint>;
    fn is_genesis(&self, hash: Hash) -> bool;
}
