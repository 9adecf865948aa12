use crate::location::AddressBytes;
use crate::signer::Signer;
use crate::tx::Transaction;
use braid_hashes::Hash;
use log::warn;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

/// The head transaction of one sender, ordered by miner fee descending and
/// first-seen time ascending; the hash breaks remaining ties so ordering is
/// total and deterministic.
struct QueueHead {
    sender: AddressBytes,
    miner_fee: u128,
    time: u64,
    hash: Hash,
    tx: Transaction,
}

impl PartialEq for QueueHead {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueHead {}

impl PartialOrd for QueueHead {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueHead {
    fn cmp(&self, other: &Self) -> Ordering {
        self.miner_fee
            .cmp(&other.miner_fee)
            .then_with(|| other.time.cmp(&self.time))
            .then_with(|| self.hash.cmp(&other.hash).reverse())
    }
}

/// A set of transactions that can return the best transaction to pack next,
/// honoring per-sender nonce order and breaking ties on fee then arrival
/// time. Single consumer; the input map must not be touched after
/// construction.
pub struct TransactionsByPriceAndNonce {
    txs: HashMap<AddressBytes, VecDeque<Transaction>>,
    heads: BinaryHeap<QueueHead>,
}

impl TransactionsByPriceAndNonce {
    /// Builds the queue from per-sender nonce-sorted transaction lists.
    /// Senders whose first transaction does not recover to the map key are
    /// dropped entirely.
    pub fn new(signer: &Signer, txs: HashMap<AddressBytes, Vec<Transaction>>) -> Self {
        let mut lists: HashMap<AddressBytes, VecDeque<Transaction>> = HashMap::with_capacity(txs.len());
        let mut heads = BinaryHeap::with_capacity(txs.len());
        for (sender, account_txs) in txs {
            let mut account_txs: VecDeque<Transaction> = account_txs.into();
            let Some(first) = account_txs.pop_front() else { continue };
            match first.sender(signer) {
                Ok(recovered) if recovered.bytes() == sender => {}
                _ => {
                    warn!("dropping sender 0x{} with mismatched head signature", hex::encode(sender));
                    continue;
                }
            }
            heads.push(QueueHead { sender, miner_fee: first.gas_price(), time: first.time(), hash: first.hash(), tx: first });
            lists.insert(sender, account_txs);
        }
        Self { txs: lists, heads }
    }

    /// The current best transaction, if any.
    pub fn peek(&self) -> Option<&Transaction> {
        self.heads.peek().map(|head| &head.tx)
    }

    /// Advances the given sender (expected to be the current best head) to
    /// its next transaction, dropping the sender once its list is exhausted.
    pub fn shift(&mut self, sender: AddressBytes) {
        let Some(head) = self.heads.pop() else { return };
        debug_assert_eq!(head.sender, sender, "only the peeked head's sender can be shifted");
        if let Some(next) = self.txs.get_mut(&head.sender).and_then(|list| list.pop_front()) {
            self.heads.push(QueueHead {
                sender: head.sender,
                miner_fee: next.gas_price(),
                time: next.time(),
                hash: next.hash(),
                tx: next,
            });
        } else {
            self.txs.remove(&head.sender);
        }
    }

    /// Removes the best transaction *without* replacement, discarding every
    /// remaining transaction of the same sender. Used when the chosen
    /// transaction cannot execute, so all its successors are unexecutable too.
    pub fn pop(&mut self) {
        if let Some(head) = self.heads.pop() {
            self.txs.remove(&head.sender);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Address;
    use crate::tx::{InternalTx, TxData};
    use secp256k1::SecretKey;

    fn signed_tx(signer: &Signer, key: &SecretKey, nonce: u64, gas_price: u128, time: u64) -> Transaction {
        let tx = Transaction::with_time(
            TxData::Internal(InternalTx {
                chain_id: signer.chain_id(),
                nonce,
                gas_price,
                gas: 21_000,
                to: Address::default(),
                value: 1,
                data: vec![],
                access_list: vec![],
                signature: None,
            }),
            time,
        );
        signer.sign(&tx, key)
    }

    fn queue_for(entries: Vec<(SecretKey, Vec<(u64, u128, u64)>)>) -> (Signer, TransactionsByPriceAndNonce) {
        let signer = Signer::new(1);
        let mut map = HashMap::new();
        for (key, specs) in entries {
            let sender = signer.address_for(&key).bytes();
            let txs = specs.into_iter().map(|(nonce, fee, time)| signed_tx(&signer, &key, nonce, fee, time)).collect();
            map.insert(sender, txs);
        }
        let queue = TransactionsByPriceAndNonce::new(&signer, map);
        (signer, queue)
    }

    #[test]
    fn orders_by_fee_then_time() {
        let cheap = SecretKey::from_slice(&[1u8; 32]).unwrap();
        let rich = SecretKey::from_slice(&[2u8; 32]).unwrap();
        let early = SecretKey::from_slice(&[3u8; 32]).unwrap();
        let (_, mut queue) = queue_for(vec![
            (cheap, vec![(0, 5, 10)]),
            (rich, vec![(0, 50, 30)]),
            (early, vec![(0, 50, 20)]),
        ]);

        assert_eq!(queue.peek().unwrap().gas_price(), 50);
        assert_eq!(queue.peek().unwrap().time(), 20);
        queue.pop();
        assert_eq!(queue.peek().unwrap().gas_price(), 50);
        assert_eq!(queue.peek().unwrap().time(), 30);
        queue.pop();
        assert_eq!(queue.peek().unwrap().gas_price(), 5);
        queue.pop();
        assert!(queue.is_empty());
    }

    #[test]
    fn shift_advances_in_nonce_order() {
        let key = SecretKey::from_slice(&[4u8; 32]).unwrap();
        let signer = Signer::new(1);
        let sender = signer.address_for(&key).bytes();
        let (_, mut queue) = queue_for(vec![(key, vec![(0, 10, 0), (1, 99, 1), (2, 1, 2)])]);

        assert_eq!(queue.peek().unwrap().nonce(), 0);
        queue.shift(sender);
        assert_eq!(queue.peek().unwrap().nonce(), 1);
        queue.shift(sender);
        assert_eq!(queue.peek().unwrap().nonce(), 2);
        queue.shift(sender);
        assert!(queue.peek().is_none());
    }

    #[test]
    fn pop_discards_whole_sender() {
        let victim = SecretKey::from_slice(&[5u8; 32]).unwrap();
        let other = SecretKey::from_slice(&[6u8; 32]).unwrap();
        let (_, mut queue) = queue_for(vec![(victim, vec![(0, 100, 0), (1, 100, 1)]), (other, vec![(0, 1, 0)])]);

        assert_eq!(queue.peek().unwrap().gas_price(), 100);
        queue.pop();
        // the victim's nonce-1 tx must not surface
        assert_eq!(queue.peek().unwrap().gas_price(), 1);
    }

    #[test]
    fn mismatched_sender_key_is_dropped() {
        let signer = Signer::new(1);
        let key = SecretKey::from_slice(&[7u8; 32]).unwrap();
        let tx = signed_tx(&signer, &key, 0, 10, 0);
        let mut map = HashMap::new();
        map.insert([0u8; 20], vec![tx]); // wrong key for this signature
        let queue = TransactionsByPriceAndNonce::new(&signer, map);
        assert!(queue.is_empty());
    }
}
