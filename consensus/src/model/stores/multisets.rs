use braid_database::prelude::{CachedDbAccess, DirectDbWriter, StoreResult, DB};
use braid_hashes::{Hash, Multiset};
use std::sync::Arc;

const MULTISETS_STORE_PREFIX: &[u8] = b"utxo-multisets";

/// UTXO multiset accumulator per block, keyed by block hash.
#[derive(Clone)]
pub struct DbMultisetsStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, Multiset>,
}

impl DbMultisetsStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, MULTISETS_STORE_PREFIX) }
    }

    pub fn get(&self, hash: Hash) -> Option<Multiset> {
        self.access.read(hash).ok().map(|set| *set)
    }

    pub fn set(&self, hash: Hash, multiset: Multiset) -> StoreResult<()> {
        self.access.write(DirectDbWriter::new(&self.db), hash, &Arc::new(multiset))
    }
}
