use crate::errors::{RuleError, SliceResult};
use crate::header_verifier::{order_of, verify_header, verify_uncles};
use crate::model::stores::bodies::DbBodiesStore;
use crate::model::stores::headers::{DbHeadersStore, HeaderStoreReader};
use crate::model::stores::ph_cache::DbSliceStateStore;
use crate::model::stores::td::DbTdStore;
use crate::model::stores::termini::DbTerminiStore;
use crate::model::ChainHeaderReader;
use crate::params::Params;
use crate::pow::PowEngine;
use braid_consensus_core::block::{manifest_commitment, ordered_commitment, Block, BlockManifest, Body};
use braid_consensus_core::etx_set::EtxSet;
use braid_consensus_core::events::{ChainEvent, Feed};
use braid_consensus_core::header::Header;
use braid_consensus_core::pending_header::Termini;
use braid_consensus_core::tx::Transaction;
use braid_database::prelude::{BatchDbWriter, DirectDbWriter, DB};
use braid_hashes::Hash;
use log::debug;
use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::{Mutex, RwLock};
use rocksdb::WriteBatch;
use std::sync::Arc;

const HEADERS_CACHE_SIZE: u64 = 2048;
const BODIES_CACHE_SIZE: u64 = 512;
const TERMINI_CACHE_SIZE: u64 = 2048;
const TD_CACHE_SIZE: u64 = 2048;

/// The local chain at this node's context: verified headers and bodies,
/// per-block termini and total difficulty, the canonical head, the inbound
/// ETX set and the chain event feed.
pub struct HeaderChain {
    db: Arc<DB>,
    params: Arc<Params>,
    engine: Arc<PowEngine>,
    headers: DbHeadersStore,
    bodies: DbBodiesStore,
    termini_store: DbTerminiStore,
    td_store: DbTdStore,
    state_store: Arc<Mutex<DbSliceStateStore>>,
    current_header: RwLock<Arc<Header>>,
    etx_set: RwLock<EtxSet>,
    chain_feed: Feed<ChainEvent>,
}

impl HeaderChain {
    pub fn new(db: Arc<DB>, params: Arc<Params>, engine: Arc<PowEngine>, state_store: Arc<Mutex<DbSliceStateStore>>) -> SliceResult<Self> {
        let headers = DbHeadersStore::new(Arc::clone(&db), HEADERS_CACHE_SIZE);
        let bodies = DbBodiesStore::new(Arc::clone(&db), BODIES_CACHE_SIZE);
        let termini_store = DbTerminiStore::new(Arc::clone(&db), TERMINI_CACHE_SIZE);
        let td_store = DbTdStore::new(Arc::clone(&db), TD_CACHE_SIZE);

        let genesis = Arc::new(params.genesis_header());
        let genesis_hash = genesis.hash();
        if !headers.has(genesis_hash)? {
            headers.insert(genesis_hash, Arc::clone(&genesis))?;
            bodies.set(genesis_hash, Arc::new(Body::default()))?;
            td_store.set(genesis_hash, &BigUint::zero())?;
        }

        let current_header = match state_store.lock().read_current_header().and_then(|hash| headers.get_header(hash).ok()) {
            Some(header) => header,
            None => genesis,
        };
        let etx_set = state_store.lock().read_etx_set().unwrap_or_default();

        Ok(Self {
            db,
            params,
            engine,
            headers,
            bodies,
            termini_store,
            td_store,
            state_store,
            current_header: RwLock::new(current_header),
            etx_set: RwLock::new(etx_set),
            chain_feed: Feed::new(),
        })
    }

    /// Whether the chain holds nothing beyond genesis.
    pub fn is_empty(&self) -> bool {
        self.current_header.read().hash() == self.params.genesis_hash()
    }

    pub fn has_header(&self, hash: Hash) -> bool {
        self.headers.has(hash).unwrap_or(false)
    }

    pub fn current_header(&self) -> Arc<Header> {
        Arc::clone(&self.current_header.read())
    }

    pub fn set_current_header(&self, header: Arc<Header>) -> SliceResult<()> {
        self.state_store.lock().write_current_header(DirectDbWriter::new(&self.db), header.hash())?;
        *self.current_header.write() = header;
        Ok(())
    }

    pub fn get_termini_by_hash(&self, hash: Hash) -> Option<Termini> {
        self.termini_store.get(hash)
    }

    pub fn get_td_by_hash(&self, hash: Hash) -> Option<BigUint> {
        self.td_store.get(hash)
    }

    pub fn termini_store(&self) -> &DbTerminiStore {
        &self.termini_store
    }

    pub fn td_store(&self) -> &DbTdStore {
        &self.td_store
    }

    pub fn etx_set(&self) -> &RwLock<EtxSet> {
        &self.etx_set
    }

    pub fn chain_feed(&self) -> &Feed<ChainEvent> {
        &self.chain_feed
    }

    pub fn send_chain_event(&self, event: ChainEvent) {
        self.chain_feed.send(event);
    }

    /// Verifies and stages `block` into the write batch, and folds the given
    /// inbound ETXs into the set at the block's height.
    pub fn append(&self, batch: &mut WriteBatch, block: &Block, manifest_hash: Hash, inbound_etxs: &[Transaction]) -> SliceResult<()> {
        let node_ctx = self.params.node_ctx();
        let header = block.header();

        verify_header(&self.params, &self.engine, self, header, braid_core::time::unix_now_secs())?;
        verify_uncles(&self.params, &self.engine, self, block)?;
        self.verify_body_roots(block, manifest_hash)?;

        self.headers.insert_batch(batch, block.hash(), Arc::new(header.clone()))?;
        self.bodies.insert_batch(batch, block.hash(), Arc::new(block.body().clone()))?;

        let mut etx_set = self.etx_set.write();
        etx_set.update(inbound_etxs, block.number(node_ctx), self.params.location);
        self.state_store.lock().write_etx_set(BatchDbWriter::new(batch), &etx_set)?;
        debug!("staged block {} at height {}", block.hash(), block.number(node_ctx));
        Ok(())
    }

    /// The ordered list of own-context block hashes since the last coincident
    /// ancestor, for the dom to commit to.
    pub fn collect_block_manifest(&self, header: &Header) -> SliceResult<BlockManifest> {
        let node_ctx = self.params.node_ctx();
        let mut manifest = Vec::new();
        let mut cursor = header.parent_hash(node_ctx);
        while !self.params.is_genesis(cursor) {
            let Some(ancestor) = self.get_header(cursor) else { break };
            if order_of(&self.engine, self, &ancestor)? < node_ctx {
                break;
            }
            manifest.push(cursor);
            cursor = ancestor.parent_hash(node_ctx);
        }
        manifest.reverse();
        Ok(manifest)
    }

    fn verify_body_roots(&self, block: &Block, dom_manifest_hash: Hash) -> SliceResult<()> {
        let ctx = self.params.node_ctx().index();
        let header = block.header();
        let body = block.body();

        if !body.transactions.is_empty() {
            let want = ordered_commitment(body.transactions.iter().map(|tx| tx.hash()));
            if header.tx_hash[ctx] != want {
                return Err(RuleError::InvalidBodyRoot("transactions", header.tx_hash[ctx], want).into());
            }
        }
        if !body.ext_transactions.is_empty() {
            let want = ordered_commitment(body.ext_transactions.iter().map(|tx| tx.hash()));
            if header.etx_hash[ctx] != want {
                return Err(RuleError::InvalidBodyRoot("ext-transactions", header.etx_hash[ctx], want).into());
            }
        }
        if !body.uncles.is_empty() {
            let want = ordered_commitment(body.uncles.iter().map(|uncle| uncle.hash()));
            if header.uncle_hash[ctx] != want {
                return Err(RuleError::InvalidBodyRoot("uncles", header.uncle_hash[ctx], want).into());
            }
        }
        if !body.sub_manifest.is_empty() {
            let want = manifest_commitment(&body.sub_manifest);
            if header.manifest_hash[ctx] != want {
                return Err(RuleError::InvalidBodyRoot("sub-manifest", header.manifest_hash[ctx], want).into());
            }
        }
        if dom_manifest_hash != Hash::default() && dom_manifest_hash != header.manifest_hash[ctx] {
            return Err(RuleError::InvalidBodyRoot("dom-manifest", header.manifest_hash[ctx], dom_manifest_hash).into());
        }
        Ok(())
    }
}

impl ChainHeaderReader for HeaderChain {
    fn get_header(&self, hash: Hash) -> Option<Arc<Header>> {
        self.headers.get_header(hash).ok()
    }

    fn get_block(&self, hash: Hash) -> Option<Arc<Block>> {
        let header = self.headers.get_header(hash).ok()?;
        let body = self.bodies.get(hash).ok()?;
        Some(Arc::new(Block::new_with_header((*header).clone()).with_body((*body).clone())))
    }

    fn get_td(&self, hash: Hash) -> Option<BigUint> {
        self.td_store.get(hash)
    }

    fn is_genesis(&self, hash: Hash) -> bool {
        self.params.is_genesis(hash)
    }
}
