use braid_consensus_core::block::Body;
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, DirectDbWriter, StoreResult, DB};
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use std::sync::Arc;

const BODIES_STORE_PREFIX: &[u8] = b"block-bodies";

/// Accepted block bodies, keyed by the block hash.
#[derive(Clone)]
pub struct DbBodiesStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, Body>,
}

impl DbBodiesStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, BODIES_STORE_PREFIX) }
    }

    pub fn set(&self, hash: Hash, body: Arc<Body>) -> StoreResult<()> {
        self.access.write(DirectDbWriter::new(&self.db), hash, &body)
    }

    pub fn get(&self, hash: Hash) -> StoreResult<Arc<Body>> {
        self.access.read(hash)
    }

    pub fn has(&self, hash: Hash) -> StoreResult<bool> {
        self.access.has(hash)
    }

    pub fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, body: Arc<Body>) -> StoreResult<()> {
        self.access.write(BatchDbWriter::new(batch), hash, &body)
    }
}
