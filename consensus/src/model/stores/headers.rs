use braid_consensus_core::header::Header;
use braid_database::prelude::{BatchDbWriter, CachedDbAccess, DirectDbWriter, StoreError, StoreResult, DB};
use braid_hashes::Hash;
use rocksdb::WriteBatch;
use std::sync::Arc;

const HEADERS_STORE_PREFIX: &[u8] = b"headers";

pub trait HeaderStoreReader {
    fn has(&self, hash: Hash) -> StoreResult<bool>;
    fn get_header(&self, hash: Hash) -> StoreResult<Arc<Header>>;
}

/// A DB + cache implementation of header storage, keyed by header identity.
/// Append only.
#[derive(Clone)]
pub struct DbHeadersStore {
    db: Arc<DB>,
    access: CachedDbAccess<Hash, Header>,
}

impl DbHeadersStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, HEADERS_STORE_PREFIX) }
    }

    pub fn insert(&self, hash: Hash, header: Arc<Header>) -> StoreResult<()> {
        if self.access.has(hash)? {
            return Err(StoreError::KeyAlreadyExists(hash.to_string()));
        }
        self.access.write(DirectDbWriter::new(&self.db), hash, &header)
    }

    pub fn insert_batch(&self, batch: &mut WriteBatch, hash: Hash, header: Arc<Header>) -> StoreResult<()> {
        if self.access.has(hash)? {
            return Err(StoreError::KeyAlreadyExists(hash.to_string()));
        }
        self.access.write(BatchDbWriter::new(batch), hash, &header)
    }
}

impl HeaderStoreReader for DbHeadersStore {
    fn has(&self, hash: Hash) -> StoreResult<bool> {
        self.access.has(hash)
    }

    fn get_header(&self, hash: Hash) -> StoreResult<Arc<Header>> {
        self.access.read(hash)
    }
}
