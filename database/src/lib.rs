mod access;
mod cache;
mod errors;
mod item;
mod key;
mod writer;

pub mod utils;

pub use access::CachedDbAccess;
pub use cache::Cache;
pub use errors::{StoreError, StoreResult};
pub use item::CachedDbItem;
pub use key::DbKey;
pub use writer::{BatchDbWriter, DbWriter, DirectDbWriter};

use rocksdb::{DBWithThreadMode, MultiThreaded};

pub type DB = DBWithThreadMode<MultiThreaded>;

pub mod prelude {
    pub use super::{BatchDbWriter, Cache, CachedDbAccess, CachedDbItem, DbKey, DbWriter, DirectDbWriter, StoreError, StoreResult, DB};
}
