use parking_lot::RwLock;
use rand::Rng;
use std::{collections::HashMap, sync::Arc};

/// A bounded concurrent map evicting a random entry once full. Readers clone
/// values out, so `TData` is expected to be cheap to clone (typically `Arc`).
#[derive(Clone)]
pub struct Cache<TKey: Clone + std::hash::Hash + Eq + Send + Sync, TData: Clone + Send + Sync> {
    map: Arc<RwLock<HashMap<TKey, TData>>>,
    size: usize,
}

impl<TKey: Clone + std::hash::Hash + Eq + Send + Sync, TData: Clone + Send + Sync> Cache<TKey, TData> {
    pub fn new(size: u64) -> Self {
        Self { map: Arc::new(RwLock::new(HashMap::with_capacity(size as usize))), size: size as usize }
    }

    pub fn get(&self, key: &TKey) -> Option<TData> {
        self.map.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &TKey) -> bool {
        self.map.read().contains_key(key)
    }

    pub fn insert(&self, key: TKey, data: TData) {
        if self.size == 0 {
            return;
        }
        let mut write_guard = self.map.write();
        if write_guard.len() == self.size && !write_guard.contains_key(&key) {
            let random_key = write_guard.keys().nth(rand::thread_rng().gen_range(0..self.size)).unwrap().clone();
            write_guard.remove(&random_key);
        }
        write_guard.insert(key, data);
    }

    pub fn remove(&self, key: &TKey) -> Option<TData> {
        self.map.write().remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_keeps_cache_bounded() {
        let cache: Cache<u64, u64> = Cache::new(4);
        for i in 0..64 {
            cache.insert(i, i * 10);
        }
        let hits = (0..64).filter(|i| cache.get(i).is_some()).count();
        assert_eq!(hits, 4);
    }

    #[test]
    fn zero_sized_cache_stores_nothing() {
        let cache: Cache<u64, u64> = Cache::new(0);
        cache.insert(1, 1);
        assert!(cache.get(&1).is_none());
    }
}
