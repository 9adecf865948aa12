use braid_consensus_core::block::Body;
use braid_database::prelude::{CachedDbAccess, DirectDbWriter, StoreResult, DB};
use braid_hashes::Hash;
use std::sync::Arc;

const PENDING_BODY_STORE_PREFIX: &[u8] = b"pending-body";

/// Body parts awaiting a sealed header, keyed by the state root the header
/// will carry. Local block construction reads them back by that root.
#[derive(Clone)]
pub struct DbPendingBodyStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, Body>,
}

impl DbPendingBodyStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, PENDING_BODY_STORE_PREFIX) }
    }

    pub fn get(&self, root: Hash) -> Option<Arc<Body>> {
        self.access.read(root).ok()
    }

    pub fn set(&self, root: Hash, body: Arc<Body>) -> StoreResult<()> {
        self.access.write(DirectDbWriter::new(&self.db), root, &body)
    }
}
