use crate::hashing::HasherExtensions;
use crate::location::{Address, Context, Location, CONTEXT_DEPTH};
use braid_hashes::{BlockHash, Hash, Hasher, HasherBase, InnerHeaderHash, SealHash};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// A work header. Per-context fields are arrays indexed by [`Context`], so a
/// single header simultaneously commits to its position at every level it may
/// count for; pending-header composition overwrites the slots above a node's
/// own context with the dominant values.
///
/// The carried (per-context) portion is committed to by `inner_hash`; the
/// seal hash covers `inner_hash` plus the scalar work fields, and the block
/// identity covers the seal plus nonce and mix hash.
#[derive(Clone, PartialEq, Eq, Default, Debug, Serialize, Deserialize)]
pub struct Header {
    // Per-context commitments
    pub parent_hash: [Hash; CONTEXT_DEPTH],
    pub number: [u64; CONTEXT_DEPTH],
    pub difficulty: [BigUint; CONTEXT_DEPTH],
    pub uncle_hash: [Hash; CONTEXT_DEPTH],
    pub evm_root: [Hash; CONTEXT_DEPTH],
    pub tx_hash: [Hash; CONTEXT_DEPTH],
    pub etx_hash: [Hash; CONTEXT_DEPTH],
    pub etx_rollup_hash: [Hash; CONTEXT_DEPTH],
    pub manifest_hash: [Hash; CONTEXT_DEPTH],
    pub receipt_hash: [Hash; CONTEXT_DEPTH],
    pub gas_limit: [u64; CONTEXT_DEPTH],
    pub gas_used: [u64; CONTEXT_DEPTH],
    pub base_fee: [u128; CONTEXT_DEPTH],
    pub parent_entropy: [BigUint; CONTEXT_DEPTH],
    pub parent_delta_entropy: [BigUint; CONTEXT_DEPTH],
    pub parent_uncled_delta_entropy: [BigUint; CONTEXT_DEPTH],

    // Scalar fields
    pub location: Location,
    pub time: u64,
    pub extra: Vec<u8>,
    pub prime_terminus_hash: Hash,
    pub prime_terminus_number: u64,
    pub state_limit: u64,
    pub state_used: u64,
    pub utxo_root: Hash,
    pub efficiency_score: u16,
    pub threshold_count: u16,
    pub expansion_number: u8,
    pub primary_coinbase: Address,
    pub secondary_coinbase: Address,

    /// Commitment to the carried portion above; recomputed by [`Header::finalize`]
    /// and checked by consensus (a header whose commitment mismatches is invalid).
    pub inner_hash: Hash,

    // Seal fields
    pub nonce: u64,
    pub mix_hash: Hash,
}

impl Header {
    /// Recomputes the inner commitment. Must be called after the carried
    /// fields are fully populated and before sealing.
    pub fn finalize(&mut self) {
        self.inner_hash = self.compute_inner_hash();
    }

    /// Hash over the carried (per-context) portion of the header.
    pub fn compute_inner_hash(&self) -> Hash {
        let mut hasher = InnerHeaderHash::new();
        hasher
            .write_var_array(&self.parent_hash)
            .write_var_array(&self.uncle_hash)
            .write_var_array(&self.evm_root)
            .write_var_array(&self.tx_hash)
            .write_var_array(&self.etx_hash)
            .write_var_array(&self.etx_rollup_hash)
            .write_var_array(&self.manifest_hash)
            .write_var_array(&self.receipt_hash);
        for ctx in 0..CONTEXT_DEPTH {
            hasher
                .write_u64(self.number[ctx])
                .write_u64(self.gas_limit[ctx])
                .write_u64(self.gas_used[ctx])
                .write_u128(self.base_fee[ctx])
                .write_biguint(&self.parent_entropy[ctx])
                .write_biguint(&self.parent_delta_entropy[ctx])
                .write_biguint(&self.parent_uncled_delta_entropy[ctx]);
        }
        hasher
            .update(self.prime_terminus_hash)
            .write_u64(self.prime_terminus_number)
            .write_u64(self.state_limit)
            .write_u64(self.state_used)
            .update(self.utxo_root)
            .write_u16(self.efficiency_score)
            .write_u16(self.threshold_count)
            .write_u8(self.expansion_number)
            .update(self.primary_coinbase)
            .update(self.secondary_coinbase)
            .write_var_bytes(&self.extra);
        hasher.finalize()
    }

    /// The commitment miners grind over: everything except nonce and mix hash.
    pub fn seal_hash(&self) -> Hash {
        let mut hasher = SealHash::new();
        hasher.update(self.inner_hash);
        for ctx in 0..CONTEXT_DEPTH {
            hasher.write_biguint(&self.difficulty[ctx]);
        }
        hasher
            .write_u8(self.location.region.map(|r| r + 1).unwrap_or(0))
            .write_u8(self.location.zone.map(|z| z + 1).unwrap_or(0))
            .write_u64(self.time);
        hasher.finalize()
    }

    /// The header identity.
    pub fn hash(&self) -> Hash {
        let mut hasher = BlockHash::new();
        hasher.update(self.seal_hash()).write_u64(self.nonce).update(self.mix_hash);
        hasher.finalize()
    }

    #[inline]
    pub fn parent_hash(&self, ctx: Context) -> Hash {
        self.parent_hash[ctx.index()]
    }

    #[inline]
    pub fn number(&self, ctx: Context) -> u64 {
        self.number[ctx.index()]
    }

    #[inline]
    pub fn difficulty(&self, ctx: Context) -> &BigUint {
        &self.difficulty[ctx.index()]
    }

    /// Whether the body roots at `ctx` commit to an empty body.
    pub fn has_empty_body(&self, ctx: Context) -> bool {
        let i = ctx.index();
        self.tx_hash[i].is_zero() && self.uncle_hash[i].is_zero() && self.etx_hash[i].is_zero() && self.manifest_hash[i].is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        let mut header = Header {
            parent_hash: [1u64.into(), 2u64.into(), 3u64.into()],
            number: [4, 5, 6],
            difficulty: [BigUint::from(100u32), BigUint::from(200u32), BigUint::from(300u32)],
            location: Location::zone(0, 1),
            time: 1_700_000_000,
            nonce: 42,
            ..Default::default()
        };
        header.finalize();
        header
    }

    #[test]
    fn inner_commitment_tracks_carried_fields() {
        let mut header = sample_header();
        let before = header.inner_hash;
        header.number[Context::Zone.index()] += 1;
        assert_eq!(header.inner_hash, before, "commitment only moves on finalize");
        header.finalize();
        assert_ne!(header.inner_hash, before);
    }

    #[test]
    fn seal_hash_excludes_nonce() {
        let mut header = sample_header();
        let seal = header.seal_hash();
        let id = header.hash();
        header.nonce += 1;
        assert_eq!(header.seal_hash(), seal);
        assert_ne!(header.hash(), id);
    }

    #[test]
    fn identity_distinguishes_location() {
        let mut a = sample_header();
        let mut b = sample_header();
        b.location = Location::zone(1, 1);
        a.finalize();
        b.finalize();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn serde_round_trip_preserves_identity() {
        let header = sample_header();
        let bytes = bincode::serialize(&header).unwrap();
        let decoded: Header = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.hash(), header.hash());
    }
}
