use braid_consensus_core::pending_header::Termini;
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, DirectDbWriter, StoreResult, DB};
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use std::sync::Arc;

const TERMINI_STORE_PREFIX: &[u8] = b"termini";

/// Per-block termini written during PCRC. Immutable once written for a given
/// block hash.
#[derive(Clone)]
pub struct DbTerminiStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, Termini>,
}

impl DbTerminiStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, TERMINI_STORE_PREFIX) }
    }

    pub fn get(&self, hash: Hash) -> Option<Termini> {
        self.access.read(hash).ok().map(|termini| *termini)
    }

    pub fn set(&self, hash: Hash, termini: Termini) -> StoreResult<()> {
        self.access.write(DirectDbWriter::new(&self.db), hash, &Arc::new(termini))
    }

    pub fn set_batch(&self, batch: &mut WriteBatch, hash: Hash, termini: Termini) -> StoreResult<()> {
        self.access.write(BatchDbWriter::new(batch), hash, &Arc::new(termini))
    }
}
