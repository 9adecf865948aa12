//! Protocol constants shared across the consensus crate. Chain-tunable
//! values live in [`crate::params::Params`] instead.

/// Maximum number of headers retained while waiting for an ancestor or a
/// lagging subordinate.
pub const MAX_FUTURE_HEADERS: usize = 256;

/// Maximum number of per-block pending-ETX records kept in memory.
pub const MAX_PENDING_ETX_BLOCKS: usize = 256;

/// Headers timestamped further than this many seconds ahead of local time
/// are rejected outright rather than retained.
pub const MAX_TIME_FUTURE_HEADERS: u64 = 30;

/// Pending-header cache entries older than this many blocks behind the
/// current head are garbage collected.
pub const PENDING_HEADER_CACHE_LIMIT: u64 = 500;

/// Period of the pending-header cache GC task.
pub const PENDING_HEADER_GC_PERIOD_SECS: u64 = 5 * 60;

/// Period of the future-header retry task.
pub const FUTURE_HEADER_RETRY_PERIOD_SECS: u64 = 3;

/// Maximum size of a header's extra-data field.
pub const MAX_EXTRA_DATA_SIZE: usize = 32;

/// Max seconds from current time allowed for blocks before they are
/// considered future blocks.
pub const ALLOWED_FUTURE_BLOCK_TIME_SECS: u64 = 15;

/// Maximum number of uncles (work shares) includable in one block.
pub const MAX_WORK_SHARE_COUNT: usize = 16;

/// Depth window within which an uncle's parent must be an ancestor.
pub const WORK_SHARES_INCLUSION_DEPTH: usize = 7;

/// A work share clears a target this many bits easier than the block target.
pub const WORK_SHARES_THRESHOLD_DIFF: u32 = 3;

/// Efficiency score (basis points) above which the tree expansion counter
/// advances.
pub const TREE_EXPANSION_THRESHOLD: u16 = 9000;

/// Number of consecutive over-threshold prime blocks required to trigger an
/// expansion.
pub const TREE_EXPANSION_TRIGGER_WINDOW: u16 = 144;

/// Number of prime blocks the expansion is announced for before it activates.
pub const TREE_EXPANSION_WAIT_COUNT: u16 = 1024;

/// Sub-manifest length at which a prime block scores peak efficiency.
pub const EXPANSION_MANIFEST_TARGET: usize = 4;

/// Gas limits move toward the ceiling by at most parent/1024 per block.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

pub const MIN_GAS_LIMIT: u64 = 5_000_000;

/// State limits move with the same bound divisor as gas limits.
pub const STATE_LIMIT_BOUND_DIVISOR: u64 = 1024;

pub const MIN_STATE_LIMIT: u64 = 100_000;

/// Hard cap on any gas limit field.
pub const MAX_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;

/// Blocks per proof-of-work epoch; the light-hash seed rotates per epoch.
pub const POW_EPOCH_LENGTH: u64 = 30_000;

/// Classical uncle reward denominators.
pub const UNCLE_REWARD_DEPTH: u64 = 8;
pub const INCLUSION_REWARD_DIVISOR: u128 = 32;
