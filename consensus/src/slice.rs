use crate::constants::{
    FUTURE_HEADER_RETRY_PERIOD_SECS, MAX_FUTURE_HEADERS, MAX_PENDING_ETX_BLOCKS, MAX_TIME_FUTURE_HEADERS,
    PENDING_HEADER_CACHE_LIMIT, PENDING_HEADER_GC_PERIOD_SECS,
};
use crate::errors::{RuleError, SliceError, SliceResult};
use crate::header_chain::HeaderChain;
use crate::header_verifier::order_of;
use crate::model::stores::pending_body::DbPendingBodyStore;
use crate::model::stores::pending_etxs::DbPendingEtxsStore;
use crate::model::stores::ph_cache::DbSliceStateStore;
use crate::model::ChainHeaderReader;
use crate::params::Params;
use crate::pow::PowEngine;
use crate::processes::difficulty::{calc_difficulty, delta_log_entropy, total_log_entropy, uncled_delta_log_entropy};
use crate::processes::expansion::{expected_efficiency_score, expected_expansion_number, expected_threshold_count};
use crate::processes::limits::{calc_gas_limit, calc_state_limit};
use crate::rpc::{DomClient, SubClient};
use braid_consensus_core::block::{Block, BlockManifest, Body};
use braid_consensus_core::events::{ChainEvent, Feed};
use braid_consensus_core::header::Header;
use braid_consensus_core::pending_header::{PendingHeader, Termini};
use braid_consensus_core::tx::{PendingEtxs, Transaction, TxFilters};
use braid_consensus_core::{Context, Location, CONTEXT_DEPTH};
use braid_database::prelude::{DirectDbWriter, DB};
use braid_hashes::Hash;
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use log::{debug, info, warn};
use lru::LruCache;
use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::{Mutex, RwLock};
use rocksdb::WriteBatch;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const PENDING_BODY_CACHE_SIZE: u64 = 512;
const PENDING_ETX_STORE_CACHE_SIZE: u64 = 512;

/// The pending-header cache and its head hash, guarded together: every append
/// holds this lock exclusively from pending-header generation through relay.
struct PhState {
    cache: HashMap<Hash, PendingHeader>,
    head_hash: Hash,
}

/// The hierarchical appender. Owns the local header chain, the caches around
/// block admission, the pending-header construction shared with the miner,
/// and the RPC handles to the dominant and subordinate chains.
pub struct Slice {
    params: Arc<Params>,
    engine: Arc<PowEngine>,
    hc: Arc<HeaderChain>,
    db: Arc<DB>,

    dom_client: Option<Arc<dyn DomClient>>,
    sub_clients: Vec<Option<Arc<dyn SubClient>>>,

    future_headers: Mutex<LruCache<Hash, Header>>,
    pending_etxs: Mutex<LruCache<Hash, Arc<PendingEtxs>>>,
    pending_etxs_store: DbPendingEtxsStore,
    pending_body_store: DbPendingBodyStore,

    ph: RwLock<PhState>,
    state_store: Arc<Mutex<DbSliceStateStore>>,
    pending_header_feed: Feed<Header>,

    quit: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Slice {
    pub fn new(
        db: Arc<DB>,
        params: Arc<Params>,
        engine: Arc<PowEngine>,
        dom_client: Option<Arc<dyn DomClient>>,
        sub_clients: Vec<Option<Arc<dyn SubClient>>>,
    ) -> SliceResult<Arc<Self>> {
        let state_store = Arc::new(Mutex::new(DbSliceStateStore::new(Arc::clone(&db))));
        let hc = Arc::new(HeaderChain::new(Arc::clone(&db), Arc::clone(&params), Arc::clone(&engine), Arc::clone(&state_store))?);

        let slice = Arc::new(Self {
            params,
            engine,
            hc,
            pending_etxs_store: DbPendingEtxsStore::new(Arc::clone(&db), PENDING_ETX_STORE_CACHE_SIZE),
            pending_body_store: DbPendingBodyStore::new(Arc::clone(&db), PENDING_BODY_CACHE_SIZE),
            db,
            dom_client,
            sub_clients,
            future_headers: Mutex::new(LruCache::new(NonZeroUsize::new(MAX_FUTURE_HEADERS).unwrap())),
            pending_etxs: Mutex::new(LruCache::new(NonZeroUsize::new(MAX_PENDING_ETX_BLOCKS).unwrap())),
            ph: RwLock::new(PhState { cache: HashMap::new(), head_hash: Hash::default() }),
            state_store,
            pending_header_feed: Feed::new(),
            quit: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        });

        slice.init()?;
        slice.spawn_workers();
        Ok(slice)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn engine(&self) -> &Arc<PowEngine> {
        &self.engine
    }

    pub fn header_chain(&self) -> &Arc<HeaderChain> {
        &self.hc
    }

    /// Takes a proposed header, constructs a local block and attempts to
    /// hierarchically append it to the block graph. When called from a
    /// dominant context a `dom_terminus` must be provided and `dom_origin`
    /// set; local callers pass defaults. Returns the per-context slices of
    /// newly pending ETXs, or `None` when the header was already known.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        self: &Arc<Self>,
        header: &Header,
        dom_pending_header: Option<&Header>,
        dom_terminus: Hash,
        td: BigUint,
        dom_origin: bool,
        reorg: bool,
        manifest_hash: Hash,
        new_inbound_etxs: Vec<Transaction>,
    ) -> SliceResult<Option<PendingEtxs>> {
        match self.append_inner(header, dom_pending_header, dom_terminus, td, dom_origin, reorg, manifest_hash, new_inbound_etxs) {
            Err(SliceError::SubNotSynced) => {
                // A lagging sub is transient: keep the header around and let
                // the periodic retry land it once the sub catches up.
                let _ = self.add_future_header(header);
                Err(SliceError::SubNotSynced)
            }
            other => other,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn append_inner(
        self: &Arc<Self>,
        header: &Header,
        dom_pending_header: Option<&Header>,
        dom_terminus: Hash,
        mut td: BigUint,
        dom_origin: bool,
        mut reorg: bool,
        manifest_hash: Hash,
        mut new_inbound_etxs: Vec<Transaction>,
    ) -> SliceResult<Option<PendingEtxs>> {
        let node_ctx = self.params.node_ctx();
        let location = header.location;

        // Don't append a block which already exists in the database.
        if self.hc.has_header(header.hash()) {
            self.future_headers.lock().pop(&header.hash());
            warn!("block has already been appended: {}", header.hash());
            return Ok(None);
        }

        let is_coincident = self.engine.is_dom_coincident(header, node_ctx)?;
        let block = self.construct_local_block(header)?;
        info!(
            "starting slice append: hash {}, number {:?}, location {}, parent {}",
            block.hash(),
            header.number,
            location,
            header.parent_hash(node_ctx)
        );

        let mut batch = WriteBatch::default();

        // Run the Previous Coincident Reference Check (PCRC)
        let (sub_terminus, new_termini) = self.pcrc(&mut batch, header, dom_terminus, is_coincident)?;

        // A coincident block arrives with the dom's set of newly confirmed
        // ETXs; otherwise the list is rebuilt from the subordinate manifest.
        if !is_coincident {
            new_inbound_etxs = self.collect_newly_confirmed_etxs(&block, block.location())?;
        }

        self.hc.append(&mut batch, &block, manifest_hash, &new_inbound_etxs.filter_to_location(self.params.location))?;

        if !dom_origin {
            td = self.calc_td(header)?;
            reorg = self.hlcr(&td);
        }

        // The compute and write of the ph cache is split from here on, so the
        // lock is held for the remainder of the append.
        let mut ph_guard = self.ph.write();

        let local_pending_header = self.generate_pending_header(&block)?;
        let pending_header_with_termini = self.compute_pending_header(
            &ph_guard,
            PendingHeader::new(local_pending_header, new_termini),
            dom_pending_header,
            dom_origin,
        );

        // Synchronously ask our sub to append the block
        let mut new_pending_etxs: PendingEtxs = if node_ctx != Context::Zone {
            let sub_index = location.sub_index(node_ctx);
            match self.sub_clients.get(sub_index).and_then(|client| client.as_ref()) {
                Some(sub) => sub.append(
                    header,
                    &pending_header_with_termini.header,
                    sub_terminus,
                    &td,
                    reorg,
                    block.manifest_hash(node_ctx),
                    &new_inbound_etxs,
                    self.rpc_timeout(),
                )?,
                None => return Err(SliceError::SubNotSynced),
            }
        } else {
            Default::default()
        };

        // Fill our slot: the full rollup at a coincident block, otherwise
        // just the ETXs emitted in this block.
        new_pending_etxs[node_ctx.index()] =
            if is_coincident { self.collect_etx_rollup(&block)? } else { block.ext_transactions().to_vec() };

        self.hc.td_store().set_batch(&mut batch, block.hash(), &td)?;

        // The append has succeeded; write the batch.
        self.db.write(batch).map_err(braid_database::StoreError::from)?;

        self.set_header_chain_head(&block, reorg)?;

        let prior = ph_guard.cache.get(&pending_header_with_termini.termini.terminus()).cloned();
        ph_guard.cache.insert(pending_header_with_termini.termini.terminus(), pending_header_with_termini.clone());
        let update_miner = self.pick_ph_cache_head(&mut ph_guard, reorg, &pending_header_with_termini, prior);

        self.relay_ph(&mut ph_guard, &pending_header_with_termini, update_miner, reorg, dom_origin, location);
        drop(ph_guard);

        self.future_headers.lock().pop(&block.hash());
        if dom_origin {
            let this = Arc::clone(self);
            std::thread::spawn(move || this.proc_future_headers());
        }

        info!(
            "appended new block: number {:?}, hash {}, uncles {}, txs {}, etxs {}",
            header.number,
            block.hash(),
            block.uncles().len(),
            block.transactions().len(),
            block.ext_transactions().len()
        );
        Ok(Some(new_pending_etxs))
    }

    /// The previous coincident reference check: derives the new termini for
    /// this block and rejects graph-cyclic references across levels.
    fn pcrc(&self, batch: &mut WriteBatch, header: &Header, dom_terminus: Hash, is_coincident: bool) -> SliceResult<(Hash, Termini)> {
        let node_ctx = self.params.node_ctx();
        let location = header.location;
        debug!("PCRC: parent {}, number {:?}, location {}", header.parent_hash(node_ctx), header.number, location);

        let termini = self
            .hc
            .get_termini_by_hash(header.parent_hash(node_ctx))
            .ok_or(SliceError::MissingTermini(header.parent_hash(node_ctx)))?;
        let mut new_termini = termini;

        // Genesis escape for the dom terminus
        let mut dom_terminus = dom_terminus;
        if header.parent_hash(Context::Prime) == self.params.genesis_hash() {
            dom_terminus = self.params.genesis_hash();
        }

        // Set the sub termini
        if node_ctx != Context::Zone {
            new_termini.set_sub_terminus(location.sub_index(node_ctx), header.hash());
        }

        // Set the terminus
        if node_ctx == Context::Prime || is_coincident {
            new_termini.set_terminus(header.hash());
        } else {
            new_termini.set_terminus(termini.terminus());
        }

        // Check for a graph cyclic reference. The comparison is against the
        // parent's stored terminus, never the slot assigned above.
        if is_coincident && termini.terminus() != dom_terminus {
            warn!(
                "cyclic block: number {:?}, hash {}, dom terminus {}, parent terminus {}",
                header.number,
                header.hash(),
                dom_terminus,
                termini.terminus()
            );
            return Err(SliceError::CyclicReference);
        }

        self.hc.termini_store().set_batch(batch, header.hash(), new_termini)?;

        if node_ctx == Context::Zone {
            return Ok((Hash::default(), new_termini));
        }
        Ok((termini.sub_terminus(location.sub_index(node_ctx)), new_termini))
    }

    /// Hierarchical longest chain rule: adopt the new block iff its total
    /// difficulty exceeds the current head's.
    fn hlcr(&self, extern_td: &BigUint) -> bool {
        let current_td = self.hc.get_td_by_hash(self.hc.current_header().hash()).unwrap_or_default();
        debug!("HLCR: current td {}, extern td {}", current_td, extern_td);
        *extern_td > current_td
    }

    /// Total difficulty of a locally originated block. A coincident block's
    /// td is the dom's to compute.
    fn calc_td(&self, header: &Header) -> SliceResult<BigUint> {
        let node_ctx = self.params.node_ctx();
        if self.engine.is_dom_coincident(header, node_ctx)? {
            return Err(SliceError::CoincidentTdBySub);
        }
        let prior_td = self
            .hc
            .get_td_by_hash(header.parent_hash(node_ctx))
            .ok_or(SliceError::MissingAncestor(header.parent_hash(node_ctx)))?;
        Ok(prior_td + header.difficulty(node_ctx))
    }

    fn set_header_chain_head(&self, block: &Block, reorg: bool) -> SliceResult<()> {
        if reorg {
            self.hc.set_current_header(Arc::new(block.header().clone()))?;
            self.hc.send_chain_event(ChainEvent::Head(Arc::new(block.clone())));
        } else {
            self.hc.send_chain_event(ChainEvent::Side(Arc::new(block.clone())));
        }
        Ok(())
    }

    /// Gathers the full list of ETXs referencable through a given manifest.
    fn collect_etxs_for_manifest(&self, manifest: &BlockManifest) -> SliceResult<Vec<Transaction>> {
        let mut etxs = Vec::new();
        for hash in manifest {
            let pending = match self.pending_etxs.lock().get(hash).cloned() {
                Some(cached) => cached,
                None => self.pending_etxs_store.get(*hash).ok_or(SliceError::MissingPendingEtxs(*hash))?,
            };
            for ctx in 0..CONTEXT_DEPTH {
                etxs.extend(pending[ctx].iter().cloned());
            }
        }
        Ok(etxs)
    }

    /// The full ETX rollup referencable from `block`: everything made
    /// available since the previous coincident ancestor, oldest first.
    fn collect_etx_rollup(&self, block: &Block) -> SliceResult<Vec<Transaction>> {
        let node_ctx = self.params.node_ctx();
        let mut segments: Vec<Vec<Transaction>> = Vec::new();
        let mut cursor = Arc::new(block.clone());
        loop {
            let mut segment = self.collect_etxs_for_manifest(cursor.sub_manifest())?;
            segment.extend(cursor.ext_transactions().iter().cloned());
            segments.push(segment);

            let parent_hash = cursor.parent_hash(node_ctx);
            if self.params.is_genesis(parent_hash) {
                break;
            }
            let parent = self.hc.get_block(parent_hash).ok_or(SliceError::MissingAncestor(parent_hash))?;
            if order_of(&self.engine, self.hc.as_ref(), parent.header())? < node_ctx {
                break;
            }
            cursor = parent;
        }
        segments.reverse();
        Ok(segments.into_iter().flatten().collect())
    }

    /// Collects all ETXs newly confirmed for `location` by `block` and its
    /// ancestry since the last coincidence with that location.
    pub fn collect_newly_confirmed_etxs(&self, block: &Block, location: Location) -> SliceResult<Vec<Transaction>> {
        let node_ctx = self.params.node_ctx();

        // ETXs referenced through this block's manifest are now spendable,
        // along with the ETXs emitted in the block itself.
        let mut referencable = self.collect_etxs_for_manifest(block.sub_manifest())?;
        referencable.extend(block.ext_transactions().iter().cloned());

        // Keep only those destined to the given slice, and of those only the
        // ones for which we are the crossing-context node. Anything else is
        // either already delivered by a higher level or not referencable here.
        let inbound = referencable.filter_to_slice(&location);
        let newly_confirmed = inbound.filter_confirmation_ctx(node_ctx);

        if block.number(node_ctx) == 0 {
            if block.hash() != self.params.genesis_hash() {
                return Err(SliceError::BadGenesis(block.hash()));
            }
            return Ok(newly_confirmed);
        }

        let ancestor_hash = block.parent_hash(node_ctx);
        let ancestor = self.hc.get_block(ancestor_hash).ok_or(SliceError::MissingAncestor(ancestor_hash))?;

        // A block produced by the destination closes the search window.
        if ancestor.location() == location {
            return Ok(newly_confirmed);
        }

        let mut collected = self.collect_newly_confirmed_etxs(&ancestor, location)?;
        collected.extend(newly_confirmed);
        Ok(collected)
    }

    /// Constructs the block for a header from locally held body parts.
    pub fn construct_local_block(&self, header: &Header) -> SliceResult<Block> {
        let node_ctx = self.params.node_ctx();
        if header.has_empty_body(node_ctx) {
            return Ok(Block::new_with_header(header.clone()));
        }
        let root = header.evm_root[node_ctx.index()];
        let body = self.pending_body_store.get(root).ok_or(SliceError::MissingPendingBody(root))?;
        Ok(Block::new_with_header(header.clone()).with_body((*body).clone()))
    }

    /// Stores body parts for a header the miner is about to produce.
    pub fn write_pending_body(&self, root: Hash, body: Body) -> SliceResult<()> {
        self.pending_body_store.set(root, Arc::new(body))?;
        Ok(())
    }

    /// Generates the next pending header on top of `block` (the miner hook).
    pub fn generate_pending_header(&self, block: &Block) -> SliceResult<Header> {
        let node_ctx = self.params.node_ctx();
        let ctx = node_ctx.index();
        let parent = block.header();
        let parent_order = order_of(&self.engine, self.hc.as_ref(), parent)?;
        let parent_uncles = block.uncles();

        let mut header = parent.clone();
        header.parent_hash[ctx] = block.hash();
        header.number[ctx] = parent.number(node_ctx) + 1;
        header.location = self.params.location;
        header.time = braid_core::time::unix_now_secs().max(parent.time + 1);
        header.extra = Vec::new();
        header.nonce = 0;
        header.mix_hash = Hash::default();

        // Empty body commitments at our context; the miner fills them in.
        header.tx_hash[ctx] = Hash::default();
        header.etx_hash[ctx] = Hash::default();
        header.uncle_hash[ctx] = Hash::default();
        header.manifest_hash[ctx] = Hash::default();
        header.receipt_hash[ctx] = Hash::default();
        header.evm_root[ctx] = Hash::default();
        header.gas_used[ctx] = 0;

        for ctx_idx in 0..=ctx {
            let entropy_ctx = Context::from_index(ctx_idx).unwrap();
            header.parent_entropy[ctx_idx] = total_log_entropy(parent, entropy_ctx);
            if ctx_idx > Context::Prime.index() {
                if parent_order.index() < ctx_idx {
                    header.parent_delta_entropy[ctx_idx] = BigUint::zero();
                    header.parent_uncled_delta_entropy[ctx_idx] = BigUint::zero();
                } else {
                    header.parent_delta_entropy[ctx_idx] = delta_log_entropy(parent, entropy_ctx);
                    header.parent_uncled_delta_entropy[ctx_idx] = uncled_delta_log_entropy(parent, parent_uncles, entropy_ctx);
                }
            }
        }

        match node_ctx {
            Context::Zone => {
                header.difficulty[ctx] = calc_difficulty(&self.params, self.hc.as_ref(), parent);
                header.gas_limit[ctx] = calc_gas_limit(parent.gas_limit[ctx], self.params.gas_ceil);
                header.state_limit = calc_state_limit(parent.state_limit, self.params.state_ceil);
                header.state_used = 0;
                header.primary_coinbase = self.params.primary_coinbase;
                header.secondary_coinbase = self.params.secondary_coinbase;
                if parent_order == Context::Prime || self.params.is_genesis(parent.hash()) {
                    header.prime_terminus_hash = parent.hash();
                    header.prime_terminus_number = parent.number(Context::Prime);
                } else {
                    header.prime_terminus_hash = parent.prime_terminus_hash;
                    header.prime_terminus_number = parent.prime_terminus_number;
                }
            }
            Context::Prime => {
                if self.params.is_genesis(parent.hash()) {
                    header.efficiency_score = 0;
                    header.threshold_count = 0;
                    header.expansion_number = parent.expansion_number;
                } else {
                    header.efficiency_score = expected_efficiency_score(parent.efficiency_score, block.sub_manifest().len());
                    header.threshold_count = expected_threshold_count(parent.threshold_count, header.efficiency_score);
                    header.expansion_number = expected_expansion_number(parent.threshold_count, parent.expansion_number);
                }
            }
            Context::Region => {}
        }

        header.finalize();
        Ok(header)
    }

    /// Combines a local pending header with the cached or dominant one on the
    /// same terminus.
    fn compute_pending_header(
        &self,
        ph_state: &PhState,
        local: PendingHeader,
        dom_pending_header: Option<&Header>,
        dom_origin: bool,
    ) -> PendingHeader {
        let node_ctx = self.params.node_ctx();
        if let Some(cached) = ph_state.cache.get(&local.termini.terminus()) {
            let combined = combine_pending_header(&local.header, &cached.header, node_ctx);
            return PendingHeader::new(combined, local.termini);
        }
        match (dom_origin, dom_pending_header) {
            (true, Some(dom_header)) => {
                let combined = combine_pending_header(&local.header, dom_header, node_ctx);
                PendingHeader::new(combined, local.termini)
            }
            _ => local,
        }
    }

    /// Determines whether the given pending header becomes the mining head.
    fn pick_ph_cache_head(
        &self,
        ph_state: &mut PhState,
        reorg: bool,
        extern_ph: &PendingHeader,
        prior_entry: Option<PendingHeader>,
    ) -> bool {
        if reorg {
            ph_state.head_hash = extern_ph.termini.terminus();
            return true;
        }

        let node_ctx = self.params.node_ctx();
        if let Some(prior) = prior_entry {
            if extern_ph.header.number(node_ctx) > prior.header.number(node_ctx) {
                return self.update_current_pending_header(ph_state, extern_ph);
            }
        }
        false
    }

    /// Adopts `extern_ph` as the pending head if its parent outweighs the
    /// incumbent head's parent.
    fn update_current_pending_header(&self, ph_state: &mut PhState, extern_ph: &PendingHeader) -> bool {
        let node_ctx = self.params.node_ctx();
        let extern_td = self.hc.get_td_by_hash(extern_ph.header.parent_hash(node_ctx)).unwrap_or_default();
        let current_td = ph_state
            .cache
            .get(&ph_state.head_hash)
            .and_then(|current| self.hc.get_td_by_hash(current.header.parent_hash(node_ctx)))
            .unwrap_or_default();
        debug!("update current pending header: current td {}, extern td {}", current_td, extern_td);
        if current_td < extern_td {
            ph_state.head_hash = extern_ph.termini.terminus();
            return true;
        }
        false
    }

    /// Relays a freshly composed pending header: zones feed the miner, upper
    /// levels fan out to their subordinates.
    fn relay_ph(
        &self,
        ph_state: &mut PhState,
        pending_header: &PendingHeader,
        update_miner: bool,
        reorg: bool,
        dom_origin: bool,
        location: Location,
    ) {
        let node_ctx = self.params.node_ctx();
        if node_ctx == Context::Zone {
            if update_miner {
                let head_hash = ph_state.head_hash;
                if let Some(best) = ph_state.cache.get_mut(&head_hash) {
                    best.header.location = self.params.location;
                    best.header.finalize();
                    self.pending_header_feed.send(best.header.clone());
                }
            }
        } else if !dom_origin {
            for sub in self.sub_clients.iter().flatten() {
                sub.sub_relay_pending_header(pending_header, reorg, location, self.rpc_timeout());
            }
        }
    }

    /// Handles a pending header relayed down from the dominant chain: merges
    /// the dom-context fields into the cached pending headers and forwards.
    pub fn sub_relay_pending_header(&self, mut pending_header: PendingHeader, reorg: bool, location: Location) {
        let node_ctx = self.params.node_ctx();
        let mut ph_guard = self.ph.write();

        // Commit to our manifest so the dom header can reference it.
        if node_ctx > Context::Prime {
            match self.hc.collect_block_manifest(&pending_header.header) {
                Ok(manifest) => {
                    pending_header.header.manifest_hash[node_ctx.index() - 1] =
                        braid_consensus_core::block::manifest_commitment(&manifest);
                    pending_header.header.finalize();
                }
                Err(err) => {
                    warn!("failed to get manifest for pending header {}: {}", pending_header.header.hash(), err);
                }
            }
        }

        if node_ctx == Context::Region {
            let region_index = self.params.location.region.unwrap_or(0) as usize;
            // The sub chain updated in the synchronous path is skipped here.
            if location.region != self.params.location.region
                && self
                    .update_ph_cache_from_dom(&mut ph_guard, &pending_header, region_index, &[Context::Prime], reorg)
                    .is_none()
            {
                return;
            }
            if let Some(cached) = ph_guard.cache.get(&pending_header.termini.sub_terminus(region_index)).cloned() {
                for sub in self.sub_clients.iter().flatten() {
                    sub.sub_relay_pending_header(&cached, reorg, location, self.rpc_timeout());
                }
            }
        } else if location != self.params.location {
            // Zone: a relay for our own location was already fed to the miner
            // by the synchronous path.
            let zone_index = self.params.location.zone.unwrap_or(0) as usize;
            if self
                .update_ph_cache_from_dom(&mut ph_guard, &pending_header, zone_index, &[Context::Prime, Context::Region], reorg)
                .is_some()
            {
                let head_hash = ph_guard.head_hash;
                if let Some(best) = ph_guard.cache.get(&head_hash) {
                    self.pending_header_feed.send(best.header.clone());
                }
            }
        }
    }

    fn update_ph_cache_from_dom(
        &self,
        ph_state: &mut PhState,
        pending_header: &PendingHeader,
        termini_index: usize,
        contexts: &[Context],
        reorg: bool,
    ) -> Option<()> {
        let hash = pending_header.termini.sub_terminus(termini_index);
        match ph_state.cache.get(&hash).cloned() {
            Some(mut local) => {
                for ctx in contexts {
                    local.header = combine_pending_header(&pending_header.header, &local.header, *ctx);
                }
                local.header.location = self.params.location;
                local.header.finalize();
                ph_state.cache.insert(hash, local);
                if reorg {
                    ph_state.head_hash = hash;
                }
                Some(())
            }
            None => {
                warn!("no pending header found in cache for terminus {}", hash);
                None
            }
        }
    }

    /// The header the miner should currently be sealing.
    pub fn get_pending_header(&self) -> Option<Header> {
        let ph_guard = self.ph.read();
        ph_guard.cache.get(&ph_guard.head_hash).map(|pending| pending.header.clone())
    }

    pub fn subscribe_pending_headers(&self) -> Receiver<Header> {
        self.pending_header_feed.subscribe()
    }

    pub fn subscribe_chain_events(&self) -> Receiver<ChainEvent> {
        self.hc.chain_feed().subscribe()
    }

    /// Accepts a sub's pending ETXs so a future coincident block can
    /// reference them.
    pub fn add_pending_etxs(&self, header: &Header, etxs: PendingEtxs) -> SliceResult<()> {
        info!("received pending ETXs for block {}", header.hash());
        let etxs = Arc::new(etxs);
        if !self.pending_etxs_store.has(header.hash())? {
            self.pending_etxs_store.set(header.hash(), Arc::clone(&etxs))?;
        }
        self.pending_etxs.lock().put(header.hash(), etxs);
        Ok(())
    }

    /// Shares a set of pending ETXs with the dom, so it can reference them
    /// once a coincident block is found.
    pub fn send_pending_etxs_to_dom(&self, header: &Header, etxs: &PendingEtxs) -> SliceResult<()> {
        match &self.dom_client {
            Some(dom) => Ok(dom.send_pending_etxs_to_dom(header, etxs, self.rpc_timeout())?),
            None => Ok(()),
        }
    }

    pub fn get_sub_manifest(&self, block_hash: Hash) -> SliceResult<BlockManifest> {
        let header = self.hc.get_header(block_hash).ok_or(SliceError::MissingAncestor(block_hash))?;
        self.hc.collect_block_manifest(&header)
    }

    /// Retains a header whose ancestry is not appendable yet. Headers too far
    /// in the future are rejected outright.
    pub fn add_future_header(&self, header: &Header) -> SliceResult<()> {
        let max = braid_core::time::unix_now_secs() + MAX_TIME_FUTURE_HEADERS;
        if header.time > max {
            return Err(RuleError::FutureBlock(header.time, max).into());
        }
        self.future_headers.lock().put(header.hash(), header.clone());
        Ok(())
    }

    /// Retries retained headers in block-number order. Successful appends and
    /// permanently failing headers are evicted; only lagging-sub failures
    /// keep their entry.
    fn proc_future_headers(self: &Arc<Self>) {
        let node_ctx = self.params.node_ctx();
        let mut headers: Vec<Header> = self.future_headers.lock().iter().map(|(_, header)| header.clone()).collect();
        headers.sort_by_key(|header| header.number(node_ctx));
        for header in headers {
            let manifest_hash = header.manifest_hash[node_ctx.index()];
            match self.append(&header, None, Hash::default(), BigUint::zero(), false, false, manifest_hash, Vec::new()) {
                Ok(_) => {}
                Err(SliceError::SubNotSynced) => {}
                Err(err) => {
                    debug!("dropping future header {}: {}", header.hash(), err);
                    self.future_headers.lock().pop(&header.hash());
                }
            }
        }
    }

    /// Drops pending-header cache entries that have fallen behind the head.
    fn gc_pending_headers(&self) {
        let node_ctx = self.params.node_ctx();
        let current_number = self.hc.current_header().number(node_ctx);
        let mut ph_guard = self.ph.write();
        ph_guard
            .cache
            .retain(|_, pending| pending.header.number(node_ctx) + PENDING_HEADER_CACHE_LIMIT >= current_number);
    }

    /// Bootstraps slice state: genesis termini on first start, the persisted
    /// pending-header state afterwards.
    fn init(self: &Arc<Self>) -> SliceResult<()> {
        let genesis_hash = self.params.genesis_hash();
        if self.hc.is_empty() && self.state_store.lock().read_ph_head().is_none() {
            self.hc.termini_store().set(genesis_hash, Termini::from_single(genesis_hash))?;

            let genesis_block = self.hc.get_block(genesis_hash).ok_or(SliceError::MissingAncestor(genesis_hash))?;
            let pending = PendingHeader::new(self.generate_pending_header(&genesis_block)?, Termini::from_single(genesis_hash));
            let mut ph_guard = self.ph.write();
            ph_guard.head_hash = genesis_hash;
            ph_guard.cache.insert(genesis_hash, pending);
        } else {
            self.load_last_state()?;
        }
        Ok(())
    }

    /// Loads the ph cache and the pending-header head hash from the db.
    fn load_last_state(&self) -> SliceResult<()> {
        let state = self.state_store.lock();
        let mut ph_guard = self.ph.write();
        ph_guard.cache = state.read_ph_cache().unwrap_or_default();
        ph_guard.head_hash = state.read_ph_head().unwrap_or_else(|| self.params.genesis_hash());
        Ok(())
    }

    /// Persists the pending-header state and stops the background workers.
    pub fn stop(&self) {
        {
            let ph_guard = self.ph.read();
            let mut state = self.state_store.lock();
            if let Err(err) = state.write_ph_head(DirectDbWriter::new(&self.db), ph_guard.head_hash) {
                warn!("failed to persist pending header head: {}", err);
            }
            if let Err(err) = state.write_ph_cache(DirectDbWriter::new(&self.db), &ph_guard.cache) {
                warn!("failed to persist pending header cache: {}", err);
            }
        }

        // Disconnecting the quit channel wakes every worker.
        self.quit.lock().take();
        for worker in self.workers.lock().drain(..) {
            let _ = worker.join();
        }
    }

    fn spawn_workers(self: &Arc<Self>) {
        let (quit_tx, quit_rx) = bounded::<()>(0);
        *self.quit.lock() = Some(quit_tx);

        let this = Arc::clone(self);
        let rx = quit_rx.clone();
        self.workers.lock().push(std::thread::spawn(move || this.future_headers_loop(rx)));

        let this = Arc::clone(self);
        self.workers.lock().push(std::thread::spawn(move || this.ph_gc_loop(quit_rx)));
    }

    fn future_headers_loop(self: Arc<Self>, quit: Receiver<()>) {
        let ticker = tick(Duration::from_secs(FUTURE_HEADER_RETRY_PERIOD_SECS));
        loop {
            select! {
                recv(ticker) -> _ => self.proc_future_headers(),
                recv(quit) -> _ => return,
            }
        }
    }

    fn ph_gc_loop(self: Arc<Self>, quit: Receiver<()>) {
        let ticker = tick(Duration::from_secs(PENDING_HEADER_GC_PERIOD_SECS));
        loop {
            select! {
                recv(ticker) -> _ => self.gc_pending_headers(),
                recv(quit) -> _ => return,
            }
        }
    }

    fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.params.rpc_timeout_millis)
    }
}

/// Overwrites the per-context fields of `into` at `ctx` with the values from
/// `from`, leaving every other slot untouched.
fn combine_pending_header(from: &Header, into: &Header, ctx: Context) -> Header {
    let mut combined = into.clone();
    let i = ctx.index();
    combined.parent_hash[i] = from.parent_hash[i];
    combined.uncle_hash[i] = from.uncle_hash[i];
    combined.number[i] = from.number[i];
    combined.extra = from.extra.clone();
    combined.base_fee[i] = from.base_fee[i];
    combined.gas_limit[i] = from.gas_limit[i];
    combined.gas_used[i] = from.gas_used[i];
    combined.tx_hash[i] = from.tx_hash[i];
    combined.etx_hash[i] = from.etx_hash[i];
    combined.etx_rollup_hash[i] = from.etx_rollup_hash[i];
    combined.manifest_hash[i] = from.manifest_hash[i];
    combined.receipt_hash[i] = from.receipt_hash[i];
    combined.evm_root[i] = from.evm_root[i];
    combined.difficulty[i] = from.difficulty[i].clone();
    combined.parent_entropy[i] = from.parent_entropy[i].clone();
    combined.parent_delta_entropy[i] = from.parent_delta_entropy[i].clone();
    combined.parent_uncled_delta_entropy[i] = from.parent_uncled_delta_entropy[i].clone();
    if ctx == Context::Prime {
        combined.efficiency_score = from.efficiency_score;
        combined.threshold_count = from.threshold_count;
        combined.expansion_number = from.expansion_number;
    }
    combined.finalize();
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::target_from_difficulty;
    use crate::rpc::ClientError;
    use braid_consensus_core::block::ordered_commitment;
    use braid_consensus_core::tx::{ExternalTx, TxData};
    use braid_consensus_core::{Address, Ledger};
    use braid_database::utils::create_temp_db;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Zone work difficulty: a seal lands within a handful of nonces.
    const EASY: u32 = 8;
    /// A dominant target reachable with a short nonce search.
    const MINEABLE_DOM: u32 = 64;

    /// A difficulty no random 256-bit hash ever clears (p = 2^-200).
    fn unreachable_difficulty() -> BigUint {
        BigUint::from(1u8) << 200u32
    }

    fn test_params(location: Location) -> Arc<Params> {
        let primary = Address::from_raw_in([0x11; 20], Location::zone(0, 0), Ledger::Account);
        let secondary = Address::from_raw_in([0x22; 20], Location::zone(0, 0), Ledger::Utxo);
        Arc::new(Params::new(7, location, EASY.into(), 4u32.into(), 10, primary, secondary))
    }

    struct MockSub {
        appends: AtomicUsize,
        relays: AtomicUsize,
        fail_appends: AtomicBool,
    }

    impl MockSub {
        fn new() -> Arc<Self> {
            Arc::new(Self { appends: AtomicUsize::new(0), relays: AtomicUsize::new(0), fail_appends: AtomicBool::new(false) })
        }
    }

    impl SubClient for MockSub {
        fn append(
            &self,
            _header: &Header,
            _dom_pending_header: &Header,
            _dom_terminus: Hash,
            _td: &BigUint,
            _reorg: bool,
            _manifest_hash: Hash,
            _new_inbound_etxs: &[Transaction],
            _timeout: Duration,
        ) -> Result<PendingEtxs, ClientError> {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(ClientError::SubNotSynced);
            }
            self.appends.fetch_add(1, Ordering::SeqCst);
            Ok(Default::default())
        }

        fn sub_relay_pending_header(&self, _pending_header: &PendingHeader, _reorg: bool, _origin: Location, _timeout: Duration) {
            self.relays.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn new_zone_slice() -> (tempfile::TempDir, Arc<Slice>) {
        braid_core::log::init_logger("warn");
        let (guard, db) = create_temp_db();
        let slice = Slice::new(db, test_params(Location::zone(0, 0)), Arc::new(PowEngine::new()), None, vec![None, None, None]).unwrap();
        (guard, slice)
    }

    fn new_region_slice() -> (tempfile::TempDir, Arc<Slice>, Arc<MockSub>) {
        braid_core::log::init_logger("warn");
        let (guard, db) = create_temp_db();
        let sub = MockSub::new();
        let subs: Vec<Option<Arc<dyn SubClient>>> = vec![Some(sub.clone() as Arc<dyn SubClient>), None, None];
        let slice = Slice::new(db, test_params(Location::region(0)), Arc::new(PowEngine::new()), None, subs).unwrap();
        (guard, slice, sub)
    }

    fn seal(engine: &PowEngine, header: &mut Header, target_ctx: Context) {
        header.finalize();
        let target = target_from_difficulty(&header.difficulty[target_ctx.index()]);
        for nonce in 0..u64::MAX {
            header.nonce = nonce;
            let (mix, pow) = engine.compute_pow_light(header);
            if BigUint::from_bytes_be(&pow.as_bytes()) <= target {
                header.mix_hash = mix;
                return;
            }
        }
        unreachable!("a nonce clearing the test target always exists");
    }

    /// Builds a sealed child of `parent` whose order lands at `target_ctx`:
    /// dominant difficulty slots above the target are unreachable, the target
    /// slot (when dominant) is mineable.
    fn sealed_child(slice: &Arc<Slice>, parent: &Block, target_ctx: Context, time_bump: u64) -> Header {
        let mut header = slice.generate_pending_header(parent).unwrap();
        header.time += time_bump;
        header.difficulty[Context::Prime.index()] = unreachable_difficulty();
        header.difficulty[Context::Region.index()] = unreachable_difficulty();
        match target_ctx {
            Context::Prime => {
                header.difficulty[Context::Prime.index()] = MINEABLE_DOM.into();
                header.difficulty[Context::Region.index()] = MINEABLE_DOM.into();
            }
            Context::Region => {
                header.difficulty[Context::Region.index()] = MINEABLE_DOM.into();
            }
            Context::Zone => {}
        }
        seal(slice.engine(), &mut header, target_ctx);
        header
    }

    fn genesis_block(slice: &Arc<Slice>) -> Arc<Block> {
        slice.header_chain().get_block(slice.params().genesis_hash()).unwrap()
    }

    fn local_append(slice: &Arc<Slice>, header: &Header) -> SliceResult<Option<PendingEtxs>> {
        slice.append(header, None, Hash::default(), BigUint::zero(), false, false, Hash::default(), Vec::new())
    }

    fn inbound_etx(to: Location, nonce: u64) -> Transaction {
        Transaction::with_time(
            TxData::External(ExternalTx {
                chain_id: 7,
                nonce,
                gas: 21_000,
                to: Address::from_raw_in([0xaa; 20], to, Ledger::Account),
                value: 9,
                data: vec![],
                access_list: vec![],
                sender: Address::from_raw_in([0xbb; 20], Location::zone(1, 0), Ledger::Account),
                emit_context: Context::Zone,
            }),
            0,
        )
    }

    #[test]
    fn append_accepts_and_is_idempotent() {
        let (_guard, slice) = new_zone_slice();
        let genesis = genesis_block(&slice);
        let child = sealed_child(&slice, &genesis, Context::Zone, 0);

        let pending = local_append(&slice, &child).unwrap().expect("first append returns pending etxs");
        assert!(pending.iter().all(|slot| slot.is_empty()));
        assert!(slice.header_chain().has_header(child.hash()));
        assert_eq!(slice.header_chain().current_header().hash(), child.hash());
        assert_eq!(slice.header_chain().get_td_by_hash(child.hash()).unwrap(), BigUint::from(EASY));

        // Appending a known block is a no-op returning nothing
        assert!(local_append(&slice, &child).unwrap().is_none());
    }

    #[test]
    fn hlcr_reorgs_only_on_heavier_chains() {
        let (_guard, slice) = new_zone_slice();
        let events = slice.subscribe_chain_events();
        let miner_feed = slice.subscribe_pending_headers();
        let genesis = genesis_block(&slice);

        let a1 = sealed_child(&slice, &genesis, Context::Zone, 0);
        local_append(&slice, &a1).unwrap();
        assert!(matches!(events.try_recv().unwrap(), ChainEvent::Head(_)));
        assert_eq!(miner_feed.try_recv().unwrap().parent_hash(Context::Zone), a1.hash());

        // A sibling with equal total difficulty stays on the side chain
        let b1 = sealed_child(&slice, &genesis, Context::Zone, 1);
        assert_ne!(a1.hash(), b1.hash());
        local_append(&slice, &b1).unwrap();
        assert!(matches!(events.try_recv().unwrap(), ChainEvent::Side(_)));
        assert_eq!(slice.header_chain().current_header().hash(), a1.hash());
        assert!(miner_feed.try_recv().is_err(), "no miner update without a head change");

        // Extending the side chain outweighs the head and reorgs
        let b1_block = slice.header_chain().get_block(b1.hash()).unwrap();
        let b2 = sealed_child(&slice, &b1_block, Context::Zone, 0);
        local_append(&slice, &b2).unwrap();
        assert!(matches!(events.try_recv().unwrap(), ChainEvent::Head(_)));
        assert_eq!(slice.header_chain().current_header().hash(), b2.hash());
        let refreshed = miner_feed.try_recv().unwrap();
        assert_eq!(refreshed.parent_hash(Context::Zone), b2.hash());
        assert_eq!(slice.get_pending_header().unwrap().hash(), refreshed.hash());
    }

    #[test]
    fn pcrc_rejects_cyclic_references() {
        let (_guard, slice, sub) = new_region_slice();
        let genesis = genesis_block(&slice);

        let b1 = sealed_child(&slice, &genesis, Context::Region, 0);
        local_append(&slice, &b1).unwrap();
        assert_eq!(sub.appends.load(Ordering::SeqCst), 1);
        assert!(sub.relays.load(Ordering::SeqCst) >= 1, "non-dom appends fan the pending header out");

        // A prime-coincident child whose dom terminus does not match the
        // parent's stored terminus is a cyclic reference; nothing may land.
        let b1_block = slice.header_chain().get_block(b1.hash()).unwrap();
        let cyclic = sealed_child(&slice, &b1_block, Context::Prime, 0);
        let result = slice.append(
            &cyclic,
            None,
            Hash::from_u64(0xdead),
            BigUint::from(100u32),
            true,
            true,
            Hash::default(),
            Vec::new(),
        );
        assert!(matches!(result, Err(SliceError::CyclicReference)));
        assert!(!slice.header_chain().has_header(cyclic.hash()));
        assert!(slice.header_chain().get_termini_by_hash(cyclic.hash()).is_none());

        // With the matching dom terminus the same header appends, and its
        // termini record marks it as its own terminus.
        let accepted = slice.append(
            &cyclic,
            None,
            slice.params().genesis_hash(),
            BigUint::from(100u32),
            true,
            true,
            Hash::default(),
            Vec::new(),
        );
        assert!(accepted.unwrap().is_some());
        let termini = slice.header_chain().get_termini_by_hash(cyclic.hash()).unwrap();
        assert_eq!(termini.terminus(), cyclic.hash());
        assert_eq!(termini.sub_terminus(0), cyclic.hash());
    }

    #[test]
    fn lagging_sub_retains_header_for_retry() {
        let (_guard, slice, sub) = new_region_slice();
        let genesis = genesis_block(&slice);
        let b1 = sealed_child(&slice, &genesis, Context::Region, 0);

        sub.fail_appends.store(true, Ordering::SeqCst);
        assert!(matches!(local_append(&slice, &b1), Err(SliceError::SubNotSynced)));
        assert!(!slice.header_chain().has_header(b1.hash()), "a failed append leaves no state");
        assert!(slice.future_headers.lock().contains(&b1.hash()));

        // Once the sub catches up the periodic retry lands the header
        sub.fail_appends.store(false, Ordering::SeqCst);
        slice.proc_future_headers();
        assert!(slice.header_chain().has_header(b1.hash()));
        assert!(!slice.future_headers.lock().contains(&b1.hash()));
    }

    #[test]
    fn far_future_headers_are_rejected_outright() {
        let (_guard, slice) = new_zone_slice();
        let genesis = genesis_block(&slice);
        let mut header = sealed_child(&slice, &genesis, Context::Zone, 0);
        header.time = braid_core::time::unix_now_secs() + MAX_TIME_FUTURE_HEADERS + 1;
        assert!(matches!(slice.add_future_header(&header), Err(SliceError::Rule(RuleError::FutureBlock(_, _)))));

        header.time = braid_core::time::unix_now_secs() + MAX_TIME_FUTURE_HEADERS - 1;
        slice.add_future_header(&header).unwrap();
        assert!(slice.future_headers.lock().contains(&header.hash()));
    }

    #[test]
    fn missing_pending_body_fails_construction() {
        let (_guard, slice) = new_zone_slice();
        let genesis = genesis_block(&slice);
        let mut header = sealed_child(&slice, &genesis, Context::Zone, 0);
        header.tx_hash[Context::Zone.index()] = Hash::from_u64(5);
        seal(slice.engine(), &mut header, Context::Zone);

        assert!(matches!(local_append(&slice, &header), Err(SliceError::MissingPendingBody(_))));
    }

    #[test]
    fn coincident_append_delivers_inbound_etxs() {
        let (_guard, slice) = new_zone_slice();
        let genesis = genesis_block(&slice);
        let coincident = sealed_child(&slice, &genesis, Context::Region, 0);

        let local_etx = inbound_etx(Location::zone(0, 0), 0);
        let foreign_etx = inbound_etx(Location::zone(0, 1), 1);
        let pending = slice
            .append(
                &coincident,
                None,
                slice.params().genesis_hash(),
                BigUint::from(50u32),
                true,
                true,
                Hash::default(),
                vec![local_etx.clone(), foreign_etx.clone()],
            )
            .unwrap()
            .unwrap();

        let etx_set = slice.header_chain().etx_set().read();
        assert!(etx_set.contains(&local_etx.hash()), "ETX destined here is available");
        assert!(!etx_set.contains(&foreign_etx.hash()), "foreign-destination ETX is dropped");
        assert_eq!(etx_set.get(&local_etx.hash()).unwrap().height, 1);
        assert!(pending[Context::Zone.index()].is_empty(), "the rollup of an empty-manifest chain is empty");
    }

    #[test]
    fn manifest_etxs_resolve_from_cache_and_store() {
        let (_guard, slice) = new_zone_slice();
        let block_hash = Hash::from_u64(42);
        let etx = inbound_etx(Location::zone(0, 0), 3);
        let header = Header::default();

        assert!(matches!(
            slice.collect_etxs_for_manifest(&vec![block_hash]),
            Err(SliceError::MissingPendingEtxs(_))
        ));

        let mut slots: PendingEtxs = Default::default();
        slots[Context::Region.index()] = vec![etx.clone()];
        slice.add_pending_etxs(&header, slots).unwrap();

        let collected = slice.collect_etxs_for_manifest(&vec![header.hash()]).unwrap();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].hash(), etx.hash());
    }

    #[test]
    fn uncles_and_work_shares_are_admitted() {
        let (_guard, slice) = new_zone_slice();
        let genesis = genesis_block(&slice);

        let a1 = sealed_child(&slice, &genesis, Context::Zone, 0);
        local_append(&slice, &a1).unwrap();
        let a1_block = slice.header_chain().get_block(a1.hash()).unwrap();
        let a2 = sealed_child(&slice, &a1_block, Context::Zone, 0);
        local_append(&slice, &a2).unwrap();

        // A fully sealed sibling of a2 becomes an includable uncle
        let uncle = sealed_child(&slice, &a1_block, Context::Zone, 1);

        // A share that misses the block target but clears the share target:
        // with the test difficulties the share target is 8x easier.
        let mut share = slice.generate_pending_header(&a1_block).unwrap();
        share.time += 2;
        share.difficulty[Context::Prime.index()] = unreachable_difficulty();
        share.difficulty[Context::Region.index()] = unreachable_difficulty();
        share.finalize();
        let zone_target = target_from_difficulty(&share.difficulty[Context::Zone.index()]);
        for nonce in 0..u64::MAX {
            share.nonce = nonce;
            let (mix, pow) = slice.engine().compute_pow_light(&share);
            let work = BigUint::from_bytes_be(&pow.as_bytes());
            if work > zone_target && work <= crate::pow::work_share_target(&share.difficulty[Context::Zone.index()]) {
                share.mix_hash = mix;
                break;
            }
        }
        assert!(slice.engine().verify_seal(&share).is_err(), "the share must not be a full seal");
        slice.engine().check_work_share(&share).unwrap();

        let a2_block = slice.header_chain().get_block(a2.hash()).unwrap();
        let mut a3 = slice.generate_pending_header(&a2_block).unwrap();
        a3.difficulty[Context::Prime.index()] = unreachable_difficulty();
        a3.difficulty[Context::Region.index()] = unreachable_difficulty();
        let body = Body { uncles: vec![uncle.clone(), share.clone()], ..Default::default() };
        let body_root = Hash::from_u64(0xb0d1);
        a3.uncle_hash[Context::Zone.index()] = ordered_commitment(body.uncles.iter().map(|u| u.hash()));
        a3.evm_root[Context::Zone.index()] = body_root;
        slice.write_pending_body(body_root, body).unwrap();
        seal(slice.engine(), &mut a3, Context::Zone);

        local_append(&slice, &a3).unwrap();
        assert_eq!(slice.header_chain().get_block(a3.hash()).unwrap().uncles().len(), 2);

        // The same uncle cannot be rewarded twice
        let a3_block = slice.header_chain().get_block(a3.hash()).unwrap();
        let mut a4 = slice.generate_pending_header(&a3_block).unwrap();
        a4.difficulty[Context::Prime.index()] = unreachable_difficulty();
        a4.difficulty[Context::Region.index()] = unreachable_difficulty();
        let dup_body = Body { uncles: vec![uncle.clone()], ..Default::default() };
        let dup_root = Hash::from_u64(0xb0d2);
        a4.uncle_hash[Context::Zone.index()] = ordered_commitment(dup_body.uncles.iter().map(|u| u.hash()));
        a4.evm_root[Context::Zone.index()] = dup_root;
        slice.write_pending_body(dup_root, dup_body).unwrap();
        seal(slice.engine(), &mut a4, Context::Zone);

        assert!(matches!(local_append(&slice, &a4), Err(SliceError::Rule(RuleError::DuplicateUncle(_)))));
    }

    #[test]
    fn state_survives_restart() {
        let (guard, db) = create_temp_db();
        let params = test_params(Location::zone(0, 0));
        let child_hash;
        {
            let slice = Slice::new(Arc::clone(&db), Arc::clone(&params), Arc::new(PowEngine::new()), None, vec![None, None, None])
                .unwrap();
            let genesis = genesis_block(&slice);
            let child = sealed_child(&slice, &genesis, Context::Zone, 0);
            local_append(&slice, &child).unwrap();
            child_hash = child.hash();
            slice.stop();
        }
        drop(db);

        let db = Arc::new(braid_database::DB::open_default(guard.path().to_str().unwrap()).unwrap());
        let reopened = Slice::new(db, params, Arc::new(PowEngine::new()), None, vec![None, None, None]).unwrap();
        assert_eq!(reopened.header_chain().current_header().hash(), child_hash);
        let pending = reopened.get_pending_header().expect("pending header cache was persisted");
        assert_eq!(pending.parent_hash(Context::Zone), child_hash);
    }
}
