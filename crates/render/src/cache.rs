use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;

/// Identity-keyed cache of GPU counterparts.
///
/// The key is an identity (a registry id), never the content. The upload
/// closure runs at most once per key while its entry lives; eviction only
/// happens through [`ResourceCache::remove`] or [`ResourceCache::drain`].
/// Not re-entrant: resolves are expected from a single draw thread.
#[derive(Debug)]
pub struct ResourceCache<K, V> {
    entries: HashMap<K, V>,
    uploads: u64,
}

impl<K, V> Default for ResourceCache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            uploads: 0,
        }
    }
}

impl<K: Copy + Eq + Hash, V> ResourceCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key`, running `upload` first if there is none.
    pub fn resolve_with(&mut self, key: K, upload: impl FnOnce() -> V) -> &mut V {
        let uploads = &mut self.uploads;
        self.entries.entry(key).or_insert_with(|| {
            *uploads += 1;
            upload()
        })
    }

    /// Like [`ResourceCache::resolve_with`], but a failed upload stores nothing,
    /// so the next resolve tries again.
    pub fn try_resolve_with<E>(
        &mut self,
        key: K,
        upload: impl FnOnce() -> Result<V, E>,
    ) -> Result<&mut V, E> {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                self.uploads += 1;
                Ok(entry.insert(upload()?))
            }
        }
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    /// Evicts `key`, handing the entry back so its GPU objects can be freed.
    pub fn remove(&mut self, key: K) -> Option<V> {
        self.entries.remove(&key)
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
        self.entries.drain()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Upload attempts over the cache's lifetime, failed ones included.
    pub fn upload_count(&self) -> u64 {
        self.uploads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_runs_once_per_key() {
        let mut cache: ResourceCache<u32, String> = ResourceCache::new();
        let mut calls = 0;
        for _ in 0..5 {
            let value = cache.resolve_with(7, || {
                calls += 1;
                "gpu".to_string()
            });
            assert_eq!(value, "gpu");
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.upload_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_keys_get_distinct_entries() {
        let mut cache: ResourceCache<u32, u32> = ResourceCache::new();
        cache.resolve_with(1, || 10);
        cache.resolve_with(2, || 20);
        assert_eq!(cache.get(1), Some(&10));
        assert_eq!(cache.get(2), Some(&20));
    }

    #[test]
    fn failed_upload_is_retried() {
        let mut cache: ResourceCache<u32, u32> = ResourceCache::new();
        let first: Result<&mut u32, &str> = cache.try_resolve_with(1, || Err("boom"));
        assert!(first.is_err());
        assert!(!cache.contains(1));

        let second = cache.try_resolve_with::<&str>(1, || Ok(3)).map(|v| *v);
        assert_eq!(second, Ok(3));
        assert_eq!(cache.upload_count(), 2);
    }

    #[test]
    fn remove_allows_reupload() {
        let mut cache: ResourceCache<u32, u32> = ResourceCache::new();
        cache.resolve_with(1, || 1);
        assert_eq!(cache.remove(1), Some(1));
        assert!(cache.is_empty());
        cache.resolve_with(1, || 2);
        assert_eq!(cache.get(1), Some(&2));
        assert_eq!(cache.upload_count(), 2);
    }

    #[test]
    fn drain_empties() {
        let mut cache: ResourceCache<u32, u32> = ResourceCache::new();
        cache.resolve_with(1, || 1);
        cache.resolve_with(2, || 2);
        let mut drained: Vec<_> = cache.drain().collect();
        drained.sort();
        assert_eq!(drained, vec![(1, 1), (2, 2)]);
        assert!(cache.is_empty());
    }
}
