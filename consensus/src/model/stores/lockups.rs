use braid_consensus_core::location::{Address, ADDRESS_SIZE};
use braid_database::prelude::{CachedDbAccess, DirectDbWriter, StoreResult, DB};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const LOCKUPS_STORE_PREFIX: &[u8] = b"coinbase-lockups";

const LOCKUP_KEY_SIZE: usize = 2 * ADDRESS_SIZE + 1 + 8;

/// Key of one coinbase lockup tranche: (owner, beneficiary, lockup byte,
/// epoch id). All rewards accrued under the same key mature atomically.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockupKey([u8; LOCKUP_KEY_SIZE]);

impl LockupKey {
    pub fn new(owner: Address, beneficiary: Address, lockup_byte: u8, epoch: u64) -> Self {
        let mut key = [0u8; LOCKUP_KEY_SIZE];
        key[..ADDRESS_SIZE].copy_from_slice(&owner.bytes());
        key[ADDRESS_SIZE..2 * ADDRESS_SIZE].copy_from_slice(&beneficiary.bytes());
        key[2 * ADDRESS_SIZE] = lockup_byte;
        key[2 * ADDRESS_SIZE + 1..].copy_from_slice(&epoch.to_be_bytes());
        Self(key)
    }
}

impl AsRef<[u8]> for LockupKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A tranche of accrued rewards maturing at a single unlock height.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockupTranche {
    pub balance: u128,
    pub tranche_unlock_height: u64,
    /// Number of rewards folded into this tranche.
    pub elements: u64,
    pub delegate: Option<Address>,
}

#[derive(Clone)]
pub struct DbLockupsStore {
    db: Arc<DB>,
    access: CachedDbAccess<LockupKey, LockupTranche>,
}

impl DbLockupsStore {
    pub fn new(db: Arc<DB>, cache_size: u64) -> Self {
        Self { db: Arc::clone(&db), access: CachedDbAccess::new(db, cache_size, LOCKUPS_STORE_PREFIX) }
    }

    pub fn get(&self, key: LockupKey) -> Option<LockupTranche> {
        self.access.read(key).ok().map(|tranche| (*tranche).clone())
    }

    /// Folds a reward into the tranche under `key`, creating it with the
    /// given unlock height when absent.
    pub fn accrue(&self, key: LockupKey, amount: u128, unlock_height: u64, delegate: Option<Address>) -> StoreResult<()> {
        let mut tranche = self.get(key).unwrap_or(LockupTranche {
            balance: 0,
            tranche_unlock_height: unlock_height,
            elements: 0,
            delegate,
        });
        tranche.balance += amount;
        tranche.elements += 1;
        self.access.write(DirectDbWriter::new(&self.db), key, &Arc::new(tranche))
    }
}
