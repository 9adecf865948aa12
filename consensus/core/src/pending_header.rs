use crate::header::Header;
use braid_hashes::Hash;
use serde::{Deserialize, Serialize};

/// Number of termini tracked per block: one per possible subordinate chain
/// plus the coincident terminus at the node's own context.
pub const TERMINI_LENGTH: usize = 4;

const TERMINUS_INDEX: usize = 3;

/// Per-block termini record written during the coincident reference check.
/// Slots 0..3 hold the last-known sub-terminus per child index; slot 3 holds
/// the terminus, the last coincident ancestor at the node's own context. The
/// two kinds sit behind distinct accessors: the cyclic-reference check reads
/// a parent's stored terminus, never a freshly assigned sub slot.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Serialize, Deserialize)]
pub struct Termini([Hash; TERMINI_LENGTH]);

impl Termini {
    pub fn new(termini: [Hash; TERMINI_LENGTH]) -> Self {
        Self(termini)
    }

    /// All four slots set to the same hash; the genesis record.
    pub fn from_single(hash: Hash) -> Self {
        Self([hash; TERMINI_LENGTH])
    }

    pub fn sub_terminus(&self, index: usize) -> Hash {
        debug_assert!(index < TERMINUS_INDEX);
        self.0[index]
    }

    pub fn set_sub_terminus(&mut self, index: usize, hash: Hash) {
        debug_assert!(index < TERMINUS_INDEX);
        self.0[index] = hash;
    }

    /// The last coincident ancestor at the node's own context.
    pub fn terminus(&self) -> Hash {
        self.0[TERMINUS_INDEX]
    }

    pub fn set_terminus(&mut self, hash: Hash) {
        self.0[TERMINUS_INDEX] = hash;
    }
}

/// The best candidate header this node could seal next, paired with the
/// termini of the block it extends. Cached keyed by its terminus hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingHeader {
    pub header: Header,
    pub termini: Termini,
}

impl PendingHeader {
    pub fn new(header: Header, termini: Termini) -> Self {
        Self { header, termini }
    }
}
