use crate::Hash;
use sha3::{Digest, Keccak256};

/// Streaming hasher over Keccak-256 with per-use domain separation.
pub trait HasherBase {
    fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self;
}

pub trait Hasher: HasherBase + Clone + Default {
    fn finalize(self) -> Hash;
    fn hash<A: AsRef<[u8]>>(data: A) -> Hash {
        let mut hasher = Self::default();
        hasher.update(data);
        hasher.finalize()
    }
}

macro_rules! keccak_hasher {
    ($(#[$meta:meta])* $name:ident, $domain:literal) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(Keccak256);

        impl $name {
            #[inline]
            pub fn new() -> Self {
                let mut state = Keccak256::new();
                state.update($domain);
                Self(state)
            }
        }

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl HasherBase for $name {
            #[inline]
            fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self {
                self.0.update(data.as_ref());
                self
            }
        }

        impl Hasher for $name {
            #[inline]
            fn finalize(self) -> Hash {
                Hash::from_slice(&self.0.finalize())
            }
        }
    };
}

keccak_hasher!(
    /// Identity hash of a work header (covers nonce and mix hash).
    BlockHash,
    b"BraidBlockHash"
);
keccak_hasher!(
    /// Commitment the miner seals over: the header minus nonce and mix hash.
    SealHash,
    b"BraidSealHash"
);
keccak_hasher!(
    /// Commitment to the carried (per-context) portion of a header.
    InnerHeaderHash,
    b"BraidInnerHash"
);
keccak_hasher!(
    /// Transaction identity hash.
    TransactionHash,
    b"BraidTxHash"
);
keccak_hasher!(
    /// Rolling commitment to an ordered list of sub-level block hashes.
    ManifestHash,
    b"BraidManifest"
);
keccak_hasher!(
    /// The proof-of-work light hash and its epoch seed derivation.
    PowHash,
    b"BraidProofOfWork"
);
keccak_hasher!(
    /// Element hash fed into the UTXO multiset accumulator.
    MultisetElementHash,
    b"BraidMultisetElement"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_separate() {
        let a = BlockHash::hash(b"payload");
        let b = SealHash::hash(b"payload");
        let c = BlockHash::hash(b"payload");
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn streaming_matches_oneshot() {
        let mut hasher = TransactionHash::new();
        hasher.update(b"pay").update(b"load");
        assert_eq!(hasher.finalize(), TransactionHash::hash(b"payload"));
    }
}
