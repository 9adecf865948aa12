use crate::location::Location;
use crate::tx::Transaction;
use braid_hashes::Hash;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of blocks an inbound ETX stays referencable after arrival. With
/// 10s blocks, ETXs expire after ~24hrs.
pub const ETX_EXPIRATION_AGE: u64 = 8640;

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct EtxSetEntry {
    /// Block height at which the ETX first became available here.
    pub height: u64,
    pub etx: Transaction,
}

/// The set of inbound cross-shard transactions available to be mined into a
/// block at this location, keyed by ETX hash. If no entry exists for a given
/// hash, that ETX is not available.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct EtxSet {
    entries: HashMap<Hash, EtxSetEntry>,
}

impl EtxSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds any new inbound ETXs destined for `node_location` and removes
    /// expired entries. Re-inserting a known hash keeps the earlier entry, so
    /// replayed updates are idempotent.
    pub fn update(&mut self, new_inbound_etxs: &[Transaction], current_height: u64, node_location: Location) {
        for etx in new_inbound_etxs {
            if etx.to().location() == node_location {
                self.entries.entry(etx.hash()).or_insert_with(|| EtxSetEntry { height: current_height, etx: etx.clone() });
            } else {
                warn!("skipping ETX belonging to other destination: hash {}, to {}", etx.hash(), etx.to().location());
            }
        }

        self.entries.retain(|_, entry| current_height <= entry.height + ETX_EXPIRATION_AGE);
    }

    pub fn get(&self, hash: &Hash) -> Option<&EtxSetEntry> {
        self.entries.get(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash, &EtxSetEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::tests::etx;

    const HERE: Location = Location::zone(0, 1);

    #[test]
    fn foreign_destinations_are_dropped() {
        let mut set = EtxSet::new();
        let local = etx(Location::zone(1, 1), HERE, 0);
        let foreign = etx(Location::zone(1, 1), Location::zone(0, 0), 1);
        set.update(&[local.clone(), foreign.clone()], 10, HERE);
        assert!(set.contains(&local.hash()));
        assert!(!set.contains(&foreign.hash()));
    }

    #[test]
    fn update_is_idempotent_and_keeps_first_arrival() {
        let mut set = EtxSet::new();
        let tx = etx(Location::zone(1, 1), HERE, 0);
        set.update(&[tx.clone()], 10, HERE);
        set.update(&[tx.clone()], 20, HERE);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&tx.hash()).unwrap().height, 10);
    }

    #[test]
    fn expiry_boundary_is_exact() {
        let mut set = EtxSet::new();
        let tx = etx(Location::zone(1, 1), HERE, 0);
        set.update(&[tx.clone()], 100, HERE);

        set.update(&[], 100 + ETX_EXPIRATION_AGE, HERE);
        assert!(set.contains(&tx.hash()), "still present at arrival + expiration age");

        set.update(&[], 100 + ETX_EXPIRATION_AGE + 1, HERE);
        assert!(!set.contains(&tx.hash()), "gone at the first height past expiry");
    }
}
