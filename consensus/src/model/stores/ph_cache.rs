use braid_consensus_core::etx_set::EtxSet;
use braid_consensus_core::pending_header::PendingHeader;
use braid_database::prelude::{CachedDbItem, DbWriter, StoreResult, DB};
use braid_hashes::Hash;
use std::collections::HashMap;
use std::sync::Arc;

const PH_CACHE_KEY: &[u8] = b"ph-cache";
const PH_HEAD_KEY: &[u8] = b"ph-head-hash";
const CURRENT_HEADER_KEY: &[u8] = b"current-header-hash";
const ETX_SET_KEY: &[u8] = b"etx-set";

/// Snapshot storage for the slice state that must survive restarts: the
/// pending-header cache, its head hash, the canonical head hash, and the
/// inbound ETX set.
#[derive(Clone)]
pub struct DbSliceStateStore {
    ph_cache: CachedDbItem<HashMap<Hash, PendingHeader>>,
    ph_head: CachedDbItem<Hash>,
    current_header: CachedDbItem<Hash>,
    etx_set: CachedDbItem<EtxSet>,
}

impl DbSliceStateStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self {
            ph_cache: CachedDbItem::new(Arc::clone(&db), PH_CACHE_KEY),
            ph_head: CachedDbItem::new(Arc::clone(&db), PH_HEAD_KEY),
            current_header: CachedDbItem::new(Arc::clone(&db), CURRENT_HEADER_KEY),
            etx_set: CachedDbItem::new(db, ETX_SET_KEY),
        }
    }

    pub fn read_ph_cache(&self) -> Option<HashMap<Hash, PendingHeader>> {
        self.ph_cache.read().ok()
    }

    pub fn write_ph_cache(&mut self, writer: impl DbWriter, cache: &HashMap<Hash, PendingHeader>) -> StoreResult<()> {
        self.ph_cache.write(writer, cache)
    }

    pub fn read_ph_head(&self) -> Option<Hash> {
        self.ph_head.read().ok()
    }

    pub fn write_ph_head(&mut self, writer: impl DbWriter, hash: Hash) -> StoreResult<()> {
        self.ph_head.write(writer, &hash)
    }

    pub fn read_current_header(&self) -> Option<Hash> {
        self.current_header.read().ok()
    }

    pub fn write_current_header(&mut self, writer: impl DbWriter, hash: Hash) -> StoreResult<()> {
        self.current_header.write(writer, &hash)
    }

    pub fn read_etx_set(&self) -> Option<EtxSet> {
        self.etx_set.read().ok()
    }

    pub fn write_etx_set(&mut self, writer: impl DbWriter, set: &EtxSet) -> StoreResult<()> {
        self.etx_set.write(writer, set)
    }
}
