use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("key {0} not found in store")]
    KeyNotFound(String),

    #[error("key {0} already exists in store")]
    KeyAlreadyExists(String),

    #[error("rocksdb error: {0}")]
    DbError(#[from] rocksdb::Error),

    #[error("bincode error: {0}")]
    DeserializationError(#[from] bincode::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
