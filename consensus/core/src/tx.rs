use crate::hashing::HasherExtensions;
use crate::location::{Address, Context, Location};
use crate::signer::{Signer, SignerError};
use braid_hashes::{Hash, Hasher, HasherBase, TransactionHash};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Transaction type tags, also the leading byte of the canonical encoding.
pub const INTERNAL_TX_TYPE: u8 = 0;
pub const EXTERNAL_TX_TYPE: u8 = 1;
pub const INTERNAL_TO_EXTERNAL_TX_TYPE: u8 = 2;

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct AccessTuple {
    pub address: Address,
    pub storage_keys: Vec<Hash>,
}

pub type AccessList = Vec<AccessTuple>;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Signature {
    pub odd_y_parity: bool,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

/// A transaction executing inside its origin zone.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct InternalTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub access_list: AccessList,
    pub signature: Option<Signature>,
}

/// A cross-shard transaction as delivered to its destination. ETXs carry no
/// signature; the sender and the context they were emitted at are recorded
/// explicitly by the emitting chain.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ExternalTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub access_list: AccessList,
    pub sender: Address,
    pub emit_context: Context,
}

/// An internal transaction that additionally emits an ETX on execution.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct InternalToExternalTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub access_list: AccessList,
    pub etx_gas_limit: u64,
    pub etx_gas_price: u128,
    pub etx_data: Vec<u8>,
    pub etx_access_list: AccessList,
    pub signature: Option<Signature>,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum TxData {
    Internal(InternalTx),
    External(ExternalTx),
    InternalToExternal(InternalToExternalTx),
}

impl TxData {
    pub fn tx_type(&self) -> u8 {
        match self {
            TxData::Internal(_) => INTERNAL_TX_TYPE,
            TxData::External(_) => EXTERNAL_TX_TYPE,
            TxData::InternalToExternal(_) => INTERNAL_TO_EXTERNAL_TX_TYPE,
        }
    }
}

/// A transaction of any variant, with write-once memoization of its hash,
/// encoded size, recovered sender and confirmation context. The memoized
/// fields are not serialized; they repopulate on first use after decode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    data: TxData,
    /// Time first seen locally, in milliseconds. Zero after decode.
    #[serde(skip)]
    time: u64,
    #[serde(skip)]
    hash: OnceLock<Hash>,
    #[serde(skip)]
    size: OnceLock<u64>,
    #[serde(skip)]
    from: OnceLock<Address>,
    #[serde(skip)]
    confirm_ctx: OnceLock<Context>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Transaction {}

impl Transaction {
    pub fn new(data: TxData) -> Self {
        Self::with_time(data, braid_core::time::unix_now())
    }

    pub fn with_time(data: TxData, time: u64) -> Self {
        Self { data, time, hash: OnceLock::new(), size: OnceLock::new(), from: OnceLock::new(), confirm_ctx: OnceLock::new() }
    }

    pub fn data(&self) -> &TxData {
        &self.data
    }

    pub fn tx_type(&self) -> u8 {
        self.data.tx_type()
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn chain_id(&self) -> u64 {
        match &self.data {
            TxData::Internal(tx) => tx.chain_id,
            TxData::External(tx) => tx.chain_id,
            TxData::InternalToExternal(tx) => tx.chain_id,
        }
    }

    pub fn nonce(&self) -> u64 {
        match &self.data {
            TxData::Internal(tx) => tx.nonce,
            TxData::External(tx) => tx.nonce,
            TxData::InternalToExternal(tx) => tx.nonce,
        }
    }

    pub fn to(&self) -> Address {
        match &self.data {
            TxData::Internal(tx) => tx.to,
            TxData::External(tx) => tx.to,
            TxData::InternalToExternal(tx) => tx.to,
        }
    }

    pub fn value(&self) -> u128 {
        match &self.data {
            TxData::Internal(tx) => tx.value,
            TxData::External(tx) => tx.value,
            TxData::InternalToExternal(tx) => tx.value,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match &self.data {
            TxData::Internal(tx) => &tx.data,
            TxData::External(tx) => &tx.data,
            TxData::InternalToExternal(tx) => &tx.data,
        }
    }

    pub fn access_list(&self) -> &AccessList {
        match &self.data {
            TxData::Internal(tx) => &tx.access_list,
            TxData::External(tx) => &tx.access_list,
            TxData::InternalToExternal(tx) => &tx.access_list,
        }
    }

    /// The gas price the miner is paid at. External transactions pay their
    /// fee at the origin, so they carry none here.
    pub fn gas_price(&self) -> u128 {
        match &self.data {
            TxData::Internal(tx) => tx.gas_price,
            TxData::External(_) => 0,
            TxData::InternalToExternal(tx) => tx.gas_price,
        }
    }

    pub fn etx_payload(&self) -> Option<&[u8]> {
        match &self.data {
            TxData::InternalToExternal(tx) => Some(&tx.etx_data),
            _ => None,
        }
    }

    pub fn etx_access_list(&self) -> Option<&AccessList> {
        match &self.data {
            TxData::InternalToExternal(tx) => Some(&tx.etx_access_list),
            _ => None,
        }
    }

    pub fn raw_signature(&self) -> Option<&Signature> {
        match &self.data {
            TxData::Internal(tx) => tx.signature.as_ref(),
            TxData::External(_) => None,
            TxData::InternalToExternal(tx) => tx.signature.as_ref(),
        }
    }

    /// Returns a copy carrying the given signature. External transactions are
    /// unsigned and returned unchanged.
    pub fn with_signature(&self, signature: Signature) -> Transaction {
        let mut data = self.data.clone();
        match &mut data {
            TxData::Internal(tx) => tx.signature = Some(signature),
            TxData::External(_) => {}
            TxData::InternalToExternal(tx) => tx.signature = Some(signature),
        }
        Transaction::with_time(data, self.time)
    }

    /// The hash signatures commit to: all consensus fields except the
    /// signature itself.
    pub fn signature_hash(&self) -> Hash {
        self.write_fields(false)
    }

    /// The transaction identity.
    pub fn hash(&self) -> Hash {
        *self.hash.get_or_init(|| self.write_fields(true))
    }

    /// Canonical encoded size in bytes.
    pub fn size(&self) -> u64 {
        *self.size.get_or_init(|| bincode::serialized_size(&self.data).expect("tx data is serializable"))
    }

    /// The signing address: stored for External, recovered otherwise.
    pub fn sender(&self, signer: &Signer) -> Result<Address, SignerError> {
        if let TxData::External(tx) = &self.data {
            return Ok(tx.sender);
        }
        if let Some(address) = self.from.get() {
            return Ok(*address);
        }
        let address = signer.recover(self)?;
        Ok(*self.from.get_or_init(|| address))
    }

    /// The chain location this transaction originated from.
    pub fn from_chain(&self) -> Result<Location, SignerError> {
        Ok(self.sender(&Signer::new(self.chain_id()))?.location())
    }

    /// The context at which this transaction becomes confirmed and
    /// referencable by its destination chain: the common dominant context of
    /// its destination and origin.
    pub fn confirmation_context(&self) -> Result<Context, SignerError> {
        if let Some(ctx) = self.confirm_ctx.get() {
            return Ok(*ctx);
        }
        let ctx = self.to().location().common_dom(&self.from_chain()?);
        Ok(*self.confirm_ctx.get_or_init(|| ctx))
    }

    fn write_fields(&self, include_signature: bool) -> Hash {
        let mut hasher = TransactionHash::new();
        hasher.write_u8(self.tx_type()).write_u64(self.chain_id()).write_u64(self.nonce());
        hasher.update(self.to()).write_u128(self.value()).write_var_bytes(self.payload());
        hasher.write_u128(self.gas_price());
        hasher.write_len(self.access_list().len());
        for tuple in self.access_list() {
            hasher.update(tuple.address).write_var_array(&tuple.storage_keys);
        }
        match &self.data {
            TxData::Internal(tx) => {
                hasher.write_u64(tx.gas);
            }
            TxData::External(tx) => {
                hasher.write_u64(tx.gas).update(tx.sender).write_u8(tx.emit_context.index() as u8);
            }
            TxData::InternalToExternal(tx) => {
                hasher.write_u64(tx.gas).write_u64(tx.etx_gas_limit).write_u128(tx.etx_gas_price).write_var_bytes(&tx.etx_data);
                hasher.write_len(tx.etx_access_list.len());
                for tuple in &tx.etx_access_list {
                    hasher.update(tuple.address).write_var_array(&tuple.storage_keys);
                }
            }
        }
        if include_signature {
            match self.raw_signature() {
                Some(sig) => {
                    hasher.write_bool(true).write_bool(sig.odd_y_parity).update(sig.r).update(sig.s);
                }
                None => {
                    hasher.write_bool(false);
                }
            }
        }
        hasher.finalize()
    }
}

/// Per-context pending-ETX slices bubbled up after an append: the ETXs a
/// block made referencable, split by the context that emitted them.
pub type PendingEtxs = [Vec<Transaction>; crate::location::CONTEXT_DEPTH];

/// Destination-based filters over transaction slices.
pub trait TxFilters {
    /// The subset whose `to` address belongs exactly to the given location.
    fn filter_to_location(&self, location: Location) -> Vec<Transaction>;

    /// The subset whose `to` address lies within the given slice.
    fn filter_to_slice(&self, slice: &Location) -> Vec<Transaction>;

    /// The subset confirmable at the given context.
    fn filter_confirmation_ctx(&self, ctx: Context) -> Vec<Transaction>;
}

impl TxFilters for [Transaction] {
    fn filter_to_location(&self, location: Location) -> Vec<Transaction> {
        self.iter().filter(|tx| tx.to().location() == location).cloned().collect()
    }

    fn filter_to_slice(&self, slice: &Location) -> Vec<Transaction> {
        self.iter().filter(|tx| tx.to().location().in_same_slice_as(slice)).cloned().collect()
    }

    fn filter_confirmation_ctx(&self, ctx: Context) -> Vec<Transaction> {
        self.iter()
            .filter(|tx| match tx.confirmation_context() {
                Ok(tx_ctx) => tx_ctx == ctx,
                Err(err) => {
                    warn!("dropping tx {} with unrecoverable origin: {}", tx.hash(), err);
                    false
                }
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::location::Ledger;

    pub(crate) fn etx(sender_loc: Location, to_loc: Location, nonce: u64) -> Transaction {
        Transaction::with_time(
            TxData::External(ExternalTx {
                chain_id: 1,
                nonce,
                gas: 21_000,
                to: Address::from_raw_in([0xaa; 20], to_loc, Ledger::Account),
                value: 5,
                data: vec![],
                access_list: vec![],
                sender: Address::from_raw_in([0xbb; 20], sender_loc, Ledger::Account),
                emit_context: Context::Zone,
            }),
            0,
        )
    }

    #[test]
    fn hash_is_memoized_and_stable() {
        let tx = etx(Location::zone(0, 0), Location::zone(0, 1), 0);
        let first = tx.hash();
        assert_eq!(tx.hash(), first);
        let decoded: Transaction = bincode::deserialize(&bincode::serialize(&tx).unwrap()).unwrap();
        assert_eq!(decoded.hash(), first);
    }

    #[test]
    fn confirmation_context_is_common_dom() {
        let same_region = etx(Location::zone(0, 0), Location::zone(0, 1), 0);
        assert_eq!(same_region.confirmation_context().unwrap(), Context::Region);
        let cross_region = etx(Location::zone(0, 0), Location::zone(1, 1), 0);
        assert_eq!(cross_region.confirmation_context().unwrap(), Context::Prime);
        let local = etx(Location::zone(0, 0), Location::zone(0, 0), 0);
        assert_eq!(local.confirmation_context().unwrap(), Context::Zone);
    }

    #[test]
    fn filters_partition_by_destination() {
        let txs =
            vec![etx(Location::zone(0, 0), Location::zone(0, 1), 0), etx(Location::zone(0, 0), Location::zone(1, 0), 1)];
        assert_eq!(txs.filter_to_location(Location::zone(0, 1)).len(), 1);
        assert_eq!(txs.filter_to_slice(&Location::region(1)).len(), 1);
        assert_eq!(txs.filter_confirmation_ctx(Context::Prime).len(), 1);
        assert_eq!(txs.filter_confirmation_ctx(Context::Region).len(), 1);
    }

    #[test]
    fn signature_changes_identity_but_not_signature_hash() {
        let base = Transaction::with_time(
            TxData::Internal(InternalTx {
                chain_id: 1,
                nonce: 0,
                gas_price: 1,
                gas: 21_000,
                to: Address::default(),
                value: 1,
                data: vec![],
                access_list: vec![],
                signature: None,
            }),
            0,
        );
        let signed = base.with_signature(Signature { odd_y_parity: false, r: [1; 32], s: [2; 32] });
        assert_eq!(base.signature_hash(), signed.signature_hash());
        assert_ne!(base.hash(), signed.hash());
    }
}
