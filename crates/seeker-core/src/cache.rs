//! Optional cache of corpus signatures, keyed by the content of the stored image.
//!
//! The key is a SHA-256 digest of the stored image string, so an updated
//! record image gets a new key and stale signatures are never served.

use crate::types::FaceSignature;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;

pub type CacheKey = [u8; 32];

pub fn cache_key(stored_image: &str) -> CacheKey {
    Sha256::digest(stored_image.as_bytes()).into()
}

/// Store of previously computed signatures. Implementations must be shareable across scan workers.
pub trait SignatureCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Vec<FaceSignature>>;
    fn put(&self, key: CacheKey, signatures: Vec<FaceSignature>);
}

/// In-process cache with an entry cap; when full, new entries are not admitted.
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, Vec<FaceSignature>>>,
    capacity: usize,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SignatureCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<FaceSignature>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn put(&self, key: CacheKey, signatures: Vec<FaceSignature>) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            tracing::debug!(capacity = self.capacity, "signature cache full; not admitting entry");
            return;
        }
        entries.insert(key, signatures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_depends_on_content() {
        assert_eq!(cache_key("abc"), cache_key("abc"));
        assert_ne!(cache_key("abc"), cache_key("abd"));
    }

    #[test]
    fn test_put_then_get() {
        let cache = MemoryCache::new(4);
        let key = cache_key("img");
        assert!(cache.get(&key).is_none());

        cache.put(key, vec![FaceSignature::new(vec![1.0])]);
        assert_eq!(cache.get(&key).unwrap()[0].values, vec![1.0]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_empty_signature_list_is_cached() {
        let cache = MemoryCache::new(4);
        let key = cache_key("no face here");
        cache.put(key, Vec::new());
        assert_eq!(cache.get(&key), Some(Vec::new()));
    }

    #[test]
    fn test_capacity_respected() {
        let cache = MemoryCache::new(1);
        cache.put(cache_key("a"), Vec::new());
        cache.put(cache_key("b"), Vec::new());
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&cache_key("b")).is_none());
    }
}
