use crate::{Hash, Hasher, HasherBase, MultisetElementHash};
use serde::{Deserialize, Serialize};

/// An order-independent 256-bit additive accumulator over element hashes.
/// Elements may be added and removed in any order; two multisets holding the
/// same elements produce the same commitment. Removal of an element that was
/// never added is the caller's bug and simply yields a different commitment.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Serialize, Deserialize)]
pub struct Multiset {
    limbs: [u64; 4],
}

impl Multiset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, element: &[u8]) {
        self.accumulate(element, false);
    }

    pub fn remove(&mut self, element: &[u8]) {
        self.accumulate(element, true);
    }

    /// The current commitment over all accumulated elements.
    pub fn commitment(&self) -> Hash {
        let mut hasher = MultisetElementHash::new();
        for limb in self.limbs {
            hasher.update(limb.to_le_bytes());
        }
        hasher.finalize()
    }

    fn accumulate(&mut self, element: &[u8], negate: bool) {
        let digest = MultisetElementHash::hash(element).as_bytes();
        let mut carry = false;
        for (i, chunk) in digest.chunks_exact(8).enumerate() {
            let word = u64::from_le_bytes(chunk.try_into().unwrap());
            let (sum, c1) = if negate { self.limbs[i].overflowing_sub(word) } else { self.limbs[i].overflowing_add(word) };
            let (sum, c2) = if negate { sum.overflowing_sub(carry as u64) } else { sum.overflowing_add(carry as u64) };
            self.limbs[i] = sum;
            carry = c1 | c2;
        }
        // carry out of the top limb wraps mod 2^256
    }
}
