use crate::errors::{SliceError, SliceResult};
use crate::model::stores::lockups::{DbLockupsStore, LockupKey};
use crate::model::stores::multisets::DbMultisetsStore;
use crate::params::Params;
use crate::processes::rewards::{accumulate_rewards, block_reward, StateLedger};
use braid_consensus_core::block::{ordered_commitment, Block, BlockManifest, Body};
use braid_consensus_core::header::Header;
use braid_consensus_core::tx::Transaction;
use braid_consensus_core::vesting::{allocate_genesis_accounts, GenesisAccount};
use braid_consensus_core::{Address, Context, Ledger};
use braid_database::DB;
use braid_hashes::{Hash, Multiset};
use log::info;
use std::sync::Arc;

const MULTISETS_CACHE_SIZE: u64 = 512;
const LOCKUPS_CACHE_SIZE: u64 = 1024;

/// Applies the post-verification effects of a block: rewards and their
/// lockup tranches, monthly vesting unlocks, and the UTXO multiset update.
pub struct Finalizer {
    params: Arc<Params>,
    multisets: DbMultisetsStore,
    lockups: DbLockupsStore,
    genesis_accounts: Vec<GenesisAccount>,
}

impl Finalizer {
    pub fn new(db: Arc<DB>, params: Arc<Params>) -> SliceResult<Self> {
        let genesis_accounts = match &params.gen_allocs_path {
            Some(path) => {
                let accounts = allocate_genesis_accounts(path, params.blocks_per_month)?;
                info!("allocating {} genesis accounts", accounts.len());
                accounts
            }
            None => Vec::new(),
        };
        Ok(Self {
            params: Arc::clone(&params),
            multisets: DbMultisetsStore::new(Arc::clone(&db), MULTISETS_CACHE_SIZE),
            lockups: DbLockupsStore::new(db, LOCKUPS_CACHE_SIZE),
            genesis_accounts,
        })
    }

    pub fn genesis_accounts(&self) -> &[GenesisAccount] {
        &self.genesis_accounts
    }

    /// Accumulates rewards, vesting unlocks and the UTXO multiset for a block
    /// of the given order. With `set_roots` the resulting commitments are
    /// written back into the header (assembly path).
    pub fn finalize<L: StateLedger>(
        &self,
        header: &mut Header,
        uncles: &[Header],
        order: Context,
        ledger: &mut L,
        utxos_create: &[Hash],
        utxos_delete: &[Hash],
        set_roots: bool,
    ) -> SliceResult<Multiset> {
        let node_ctx = self.params.node_ctx();
        let height = header.number(node_ctx);
        let parent_hash = header.parent_hash(node_ctx);

        let mut multiset = if node_ctx == Context::Zone && self.params.is_genesis(parent_hash) {
            // The lockup vault account exists from the first block so it is
            // never considered empty.
            ledger.set_nonce(lockup_vault_address(&self.params), 1);
            Multiset::new()
        } else {
            self.multisets.get(parent_hash).ok_or(SliceError::MissingAncestor(parent_hash))?
        };

        for hash in utxos_create {
            multiset.add(&hash.as_bytes());
        }
        for hash in utxos_delete {
            multiset.remove(&hash.as_bytes());
        }

        accumulate_rewards(ledger, header, uncles, order, &self.params);
        self.accrue_lockup(header, order, height)?;
        self.apply_monthly_unlocks(ledger, height)?;

        if set_roots {
            header.utxo_root = multiset.commitment();
            header.evm_root[node_ctx.index()] = ledger.intermediate_root();
            header.finalize();
        }
        Ok(multiset)
    }

    /// Builds a block from its parts: derives the body commitments, runs
    /// [`Finalizer::finalize`] with root setting, and assembles the result.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize_and_assemble<L: StateLedger>(
        &self,
        mut header: Header,
        transactions: Vec<Transaction>,
        ext_transactions: Vec<Transaction>,
        uncles: Vec<Header>,
        sub_manifest: BlockManifest,
        order: Context,
        ledger: &mut L,
        utxos_create: &[Hash],
        utxos_delete: &[Hash],
    ) -> SliceResult<Block> {
        let ctx = self.params.node_ctx().index();
        header.tx_hash[ctx] =
            if transactions.is_empty() { Hash::default() } else { ordered_commitment(transactions.iter().map(|tx| tx.hash())) };
        header.etx_hash[ctx] = if ext_transactions.is_empty() {
            Hash::default()
        } else {
            ordered_commitment(ext_transactions.iter().map(|tx| tx.hash()))
        };
        header.uncle_hash[ctx] =
            if uncles.is_empty() { Hash::default() } else { ordered_commitment(uncles.iter().map(|uncle| uncle.hash())) };
        header.manifest_hash[ctx] =
            if sub_manifest.is_empty() { Hash::default() } else { ordered_commitment(sub_manifest.iter().copied()) };

        self.finalize(&mut header, &uncles, order, ledger, utxos_create, utxos_delete, true)?;

        let body = Body { transactions, ext_transactions, uncles, sub_manifest };
        Ok(Block::new_with_header(header).with_body(body))
    }

    /// Persists the multiset for a sealed block hash.
    pub fn commit_multiset(&self, block_hash: Hash, multiset: Multiset) -> SliceResult<()> {
        self.multisets.set(block_hash, multiset)?;
        Ok(())
    }

    fn accrue_lockup(&self, header: &Header, order: Context, height: u64) -> SliceResult<()> {
        let epoch = height / self.params.lockup_epoch_blocks;
        let unlock_height = (epoch + 2) * self.params.lockup_epoch_blocks;
        let lockup_byte = header.extra.first().copied().unwrap_or(0);
        let key = LockupKey::new(header.primary_coinbase, header.primary_coinbase, lockup_byte, epoch);
        self.lockups.accrue(key, block_reward(order, &self.params), unlock_height, None)?;
        Ok(())
    }

    fn apply_monthly_unlocks<L: StateLedger>(&self, ledger: &mut L, height: u64) -> SliceResult<()> {
        for account in &self.genesis_accounts {
            let amount = account.unlockable_at(height);
            if amount > 0 {
                account.check_scope(&self.params.location)?;
                ledger.add_balance(account.address, amount);
            }
        }
        Ok(())
    }
}

/// The zone-scoped account rewards lock under until their tranche matures.
fn lockup_vault_address(params: &Params) -> Address {
    Address::from_raw_in([0xee; 20], params.location, Ledger::Account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processes::rewards::tests::MapLedger;
    use braid_consensus_core::Location;
    use braid_database::utils::create_temp_db;
    use std::io::Write;

    fn zone_params(gen_allocs: Option<&str>) -> (Arc<Params>, Option<tempfile::NamedTempFile>) {
        let mut params = Params::new(
            1,
            Location::zone(0, 0),
            1000u32.into(),
            16u32.into(),
            10,
            Address::from_raw_in([3; 20], Location::zone(0, 0), Ledger::Account),
            Address::from_raw_in([4; 20], Location::zone(0, 0), Ledger::Utxo),
        );
        params.blocks_per_month = 100;
        let file = gen_allocs.map(|contents| {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(contents.as_bytes()).unwrap();
            params.gen_allocs_path = Some(file.path().to_string_lossy().to_string());
            file
        });
        (Arc::new(params), file)
    }

    fn genesis_child(params: &Params) -> Header {
        let mut header = Header::default();
        header.parent_hash[Context::Zone.index()] = params.genesis_hash();
        header.number[Context::Zone.index()] = 1;
        header.primary_coinbase = params.primary_coinbase;
        header.finalize();
        header
    }

    #[test]
    fn finalize_rewards_and_sets_roots() {
        let (params, _guard) = zone_params(None);
        let (_db_guard, db) = create_temp_db();
        let finalizer = Finalizer::new(db, Arc::clone(&params)).unwrap();

        let mut ledger = MapLedger::default();
        let created = [Hash::from_u64(1), Hash::from_u64(2)];
        let block = finalizer
            .finalize_and_assemble(genesis_child(&params), vec![], vec![], vec![], vec![], Context::Zone, &mut ledger, &created, &[])
            .unwrap();

        assert_eq!(ledger.balances[&params.primary_coinbase], params.zone_block_reward);
        assert_eq!(ledger.nonces[&lockup_vault_address(&params)], 1);

        let mut expected = Multiset::new();
        expected.add(&created[0].as_bytes());
        expected.add(&created[1].as_bytes());
        assert_eq!(block.header().utxo_root, expected.commitment());
        assert_eq!(block.header().inner_hash, block.header().compute_inner_hash());
    }

    #[test]
    fn finalize_requires_parent_multiset_past_genesis() {
        let (params, _guard) = zone_params(None);
        let (_db_guard, db) = create_temp_db();
        let finalizer = Finalizer::new(db, Arc::clone(&params)).unwrap();

        let mut header = genesis_child(&params);
        header.parent_hash[Context::Zone.index()] = Hash::from_u64(77);
        header.number[Context::Zone.index()] = 2;
        header.finalize();

        let mut ledger = MapLedger::default();
        let result = finalizer.finalize(&mut header, &[], Context::Zone, &mut ledger, &[], &[], false);
        assert!(matches!(result, Err(SliceError::MissingAncestor(_))));
    }

    #[test]
    fn monthly_unlocks_credit_allocated_accounts() {
        let allocs = r#"[{"Vest Schedule": 2, "Address": "0x0000000000000000000000000000000000000009", "Amount": 360000}]"#;
        let (params, _file) = zone_params(Some(allocs));
        let (_db_guard, db) = create_temp_db();
        let finalizer = Finalizer::new(db, Arc::clone(&params)).unwrap();
        let beneficiary: Address = "0x0000000000000000000000000000000000000009".parse().unwrap();

        // schedule 2 has no TGE; block 1 credits nothing
        let mut ledger = MapLedger::default();
        finalizer.apply_monthly_unlocks(&mut ledger, 1).unwrap();
        assert!(!ledger.balances.contains_key(&beneficiary));

        // first monthly boundary: the key at 12*bpm-1 becomes observable
        finalizer.apply_monthly_unlocks(&mut ledger, 12 * params.blocks_per_month).unwrap();
        assert_eq!(ledger.balances[&beneficiary], 10_000);
    }

    #[test]
    fn lockup_tranches_fold_per_epoch() {
        let (params, _guard) = zone_params(None);
        let (_db_guard, db) = create_temp_db();
        let finalizer = Finalizer::new(Arc::clone(&db), Arc::clone(&params)).unwrap();

        let header = genesis_child(&params);
        finalizer.accrue_lockup(&header, Context::Zone, 1).unwrap();
        finalizer.accrue_lockup(&header, Context::Zone, 2).unwrap();

        let key = LockupKey::new(params.primary_coinbase, params.primary_coinbase, 0, 0);
        let tranche = finalizer.lockups.get(key).unwrap();
        assert_eq!(tranche.balance, 2 * params.zone_block_reward);
        assert_eq!(tranche.elements, 2);
        assert_eq!(tranche.tranche_unlock_height, 2 * params.lockup_epoch_blocks);
    }
}
