use braid_consensus_core::{Address, Location};
use braid_database::StoreError;
use braid_hashes::Hash;
use num_bigint::BigUint;
use thiserror::Error;

/// Violations of the header consensus rules. A header failing any of these is
/// rejected with no retention.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("extra-data too long: {0} > {1}")]
    ExtraDataTooLong(usize, usize),

    #[error("invalid inner header commitment: have {have}, want {want}")]
    InvalidInnerHash { have: Hash, want: Hash },

    #[error("block timestamp {0} is too far into the future, maximum allowed is {1}")]
    FutureBlock(u64, u64),

    #[error("block timestamp {0} is older than parent timestamp {1}")]
    OlderBlockTime(u64, u64),

    #[error("invalid difficulty: have {have}, want {want}")]
    InvalidDifficulty { have: BigUint, want: BigUint },

    #[error("block difficulty is not positive")]
    NonPositiveDifficulty,

    #[error("order of the block is greater than the node context")]
    OrderExceedsContext,

    #[error("block location {0} is not in the same slice as the node location")]
    LocationOutOfSlice(Location),

    #[error("invalid parent entropy at context {0}: have {1}, want {2}")]
    InvalidParentEntropy(usize, BigUint, BigUint),

    #[error("invalid parent delta entropy at context {0}: have {1}, want {2}")]
    InvalidParentDeltaEntropy(usize, BigUint, BigUint),

    #[error("invalid parent uncled delta entropy at context {0}: have {1}, want {2}")]
    InvalidParentUncledDeltaEntropy(usize, BigUint, BigUint),

    #[error("invalid efficiency score: have {0}, want {1}")]
    InvalidEfficiencyScore(u16, u16),

    #[error("invalid threshold count: have {0}, want {1}")]
    InvalidThresholdCount(u16, u16),

    #[error("invalid expansion number: have {0}, want {1}")]
    InvalidExpansionNumber(u8, u8),

    #[error("gas limit {0} exceeds the representable maximum")]
    GasLimitTooHigh(u64),

    #[error("invalid gasUsed: have {used}, gasLimit {limit}")]
    GasUsedExceedsLimit { used: u64, limit: u64 },

    #[error("invalid gasLimit: have {0}, want {1}")]
    InvalidGasLimit(u64, u64),

    #[error("invalid stateUsed: have {used}, stateLimit {limit}")]
    StateUsedExceedsLimit { used: u64, limit: u64 },

    #[error("invalid stateLimit: have {0}, want {1}")]
    InvalidStateLimit(u64, u64),

    #[error("out-of-scope {0} coinbase {1} in the header")]
    OutOfScopeCoinbase(&'static str, Address),

    #[error("coinbases must split across ledgers: primary {0}, secondary {1}")]
    CoinbaseLedgerMismatch(Address, Address),

    #[error("invalid body commitment for {0}: have {1}, want {2}")]
    InvalidBodyRoot(&'static str, Hash, Hash),

    #[error("invalid prime terminus: have {have}, want {want}")]
    InvalidPrimeTerminus { have: Hash, want: Hash },

    #[error("invalid block number: have {have}, want {want}")]
    InvalidNumber { have: u64, want: u64 },

    #[error("unknown ancestor {0}")]
    UnknownAncestor(Hash),

    #[error("too many uncles: {0} > {1}")]
    TooManyUncles(usize, usize),

    #[error("duplicate uncle {0}")]
    DuplicateUncle(Hash),

    #[error("uncle {0} is an ancestor")]
    UncleIsAncestor(Hash),

    #[error("uncle {0} has no known ancestry within the inclusion depth")]
    DanglingUncle(Hash),

    #[error("work share {0} does not clear the share target")]
    InvalidWorkShare(Hash),

    #[error("invalid proof-of-work")]
    InvalidPoW,

    #[error("invalid mix hash")]
    InvalidMixHash,
}

pub type RuleResult<T> = std::result::Result<T, RuleError>;

/// The append taxonomy. Only `SubNotSynced` leads to retention (the header
/// waits in the future-headers cache); everything else rejects the block and
/// leaves no state behind.
#[derive(Error, Debug)]
pub enum SliceError {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("termini do not match, block rejected due to cyclic reference")]
    CyclicReference,

    #[error("termini record for parent {0} is missing")]
    MissingTermini(Hash),

    #[error("could not find the pending body parts matching header root {0}")]
    MissingPendingBody(Hash),

    #[error("sub not synced to dom")]
    SubNotSynced,

    #[error("unable to find ancestor {0}")]
    MissingAncestor(Hash),

    #[error("terminated search on bad genesis, block0 hash {0}")]
    BadGenesis(Hash),

    #[error("td on a dom block cannot be calculated by a sub")]
    CoincidentTdBySub,

    #[error("unable to find pending etxs for hash {0} in manifest")]
    MissingPendingEtxs(Hash),

    #[error("genesis allocation failure: {0}")]
    Alloc(#[from] braid_consensus_core::vesting::AllocError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("subordinate client failure: {0}")]
    Client(crate::rpc::ClientError),
}

impl From<crate::rpc::ClientError> for SliceError {
    fn from(err: crate::rpc::ClientError) -> Self {
        match err {
            crate::rpc::ClientError::SubNotSynced | crate::rpc::ClientError::Timeout => SliceError::SubNotSynced,
            other => SliceError::Client(other),
        }
    }
}

pub type SliceResult<T> = std::result::Result<T, SliceError>;
