use braid_database::prelude::{BatchDbWriter, CachedDbAccess, DirectDbWriter, StoreResult, DB};
use braid_hashes::Hash;
use num_bigint::BigUint;
use rocksdb::WriteBatch;
use std::sync::Arc;

const TD_STORE_PREFIX: &[u8] = b"block-td";

/// Total difficulty per accepted block.
#[derive(Clone)]
pub struct DbTdStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, BigUint>,
}

impl DbTdStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, TD_STORE_PREFIX) }
    }

    pub fn get(&self, hash: Hash) -> Option<BigUint> {
        self.access.read(hash).ok().map(|td| (*td).clone())
    }

    pub fn set(&self, hash: Hash, td: &BigUint) -> StoreResult<()> {
        self.access.write(DirectDbWriter::new(&self.db), hash, &Arc::new(td.clone()))
    }

    pub fn set_batch(&self, batch: &mut WriteBatch, hash: Hash, td: &BigUint) -> StoreResult<()> {
        self.access.write(BatchDbWriter::new(batch), hash, &Arc::new(td.clone()))
    }
}
