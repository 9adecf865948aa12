use braid_consensus_core::tx::PendingEtxs;
use braid_database::prelude::{CachedDbAccess, DirectDbWriter, StoreResult, DB};
use braid_hashes::Hash;
use std::sync::Arc;

const PENDING_ETXS_STORE_PREFIX: &[u8] = b"pending-etxs";

/// The per-context ETX slices a block made referencable, keyed by block hash.
/// Written when a sub shares them upward and read back when a manifest
/// containing the block is rolled up.
#[derive(Clone)]
pub struct DbPendingEtxsStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, PendingEtxs>,
}

impl DbPendingEtxsStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, PENDING_ETXS_STORE_PREFIX) }
    }

    pub fn get(&self, hash: Hash) -> Option<Arc<PendingEtxs>> {
        self.access.read(hash).ok()
    }

    pub fn has(&self, hash: Hash) -> StoreResult<bool> {
        self.access.has(hash)
    }

    pub fn set(&self, hash: Hash, etxs: Arc<PendingEtxs>) -> StoreResult<()> {
        self.access.write(DirectDbWriter::new(&self.db), hash, &etxs)
    }
}
