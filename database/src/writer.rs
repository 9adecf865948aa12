use crate::{DbKey, StoreError, DB};
use rocksdb::WriteBatch;

/// Abstraction over direct writes and batched (atomic) writes.
pub trait DbWriter {
    fn put(&mut self, key: DbKey, value: Vec<u8>) -> Result<(), StoreError>;
    fn delete(&mut self, key: DbKey) -> Result<(), StoreError>;
}

pub struct DirectDbWriter<'a> {
    db: &'a DB,
}

impl<'a> DirectDbWriter<'a> {
    pub fn new(db: &'a DB) -> Self {
        Self { db }
    }
}

impl DbWriter for DirectDbWriter<'_> {
    fn put(&mut self, key: DbKey, value: Vec<u8>) -> Result<(), StoreError> {
        self.db.put(key, value)?;
        Ok(())
    }

    fn delete(&mut self, key: DbKey) -> Result<(), StoreError> {
        self.db.delete(key)?;
        Ok(())
    }
}

pub struct BatchDbWriter<'a> {
    batch: &'a mut WriteBatch,
}

impl<'a> BatchDbWriter<'a> {
    pub fn new(batch: &'a mut WriteBatch) -> Self {
        Self { batch }
    }
}

impl DbWriter for BatchDbWriter<'_> {
    fn put(&mut self, key: DbKey, value: Vec<u8>) -> Result<(), StoreError> {
        self.batch.put(key, value);
        Ok(())
    }

    fn delete(&mut self, key: DbKey) -> Result<(), StoreError> {
        self.batch.delete(key);
        Ok(())
    }
}

impl<T: DbWriter> DbWriter for &mut T {
    fn put(&mut self, key: DbKey, value: Vec<u8>) -> Result<(), StoreError> {
        (*self).put(key, value)
    }

    fn delete(&mut self, key: DbKey) -> Result<(), StoreError> {
        (*self).delete(key)
    }
}
