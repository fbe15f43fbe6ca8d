use crate::model::{Entity, Id};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }
}

/// Per-repository cache of entity listings and counts with TTL.
///
/// Nothing is evicted on its own accord except by age; every mutation of a repository's entities
/// must call [`EntityListCache::invalidate_repository`].
#[derive(Debug, Clone)]
pub struct EntityListCache {
    lists: Arc<RwLock<HashMap<Id, CacheEntry<Vec<Entity>>>>>,
    counts: Arc<RwLock<HashMap<Id, CacheEntry<usize>>>>,
    ttl: Duration,
}

impl EntityListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            lists: Arc::new(RwLock::new(HashMap::new())),
            counts: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn get_list(&self, repository_id: &Id) -> Option<Vec<Entity>> {
        let mut lists = self.lists.write().await;
        match lists.get(repository_id) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => Some(entry.value.clone()),
            Some(_) => {
                lists.remove(repository_id);
                None
            }
            None => None,
        }
    }

    pub async fn put_list(&self, repository_id: &Id, entities: Vec<Entity>) {
        let mut lists = self.lists.write().await;
        lists.insert(repository_id.clone(), CacheEntry::new(entities));
    }

    pub async fn get_count(&self, repository_id: &Id) -> Option<usize> {
        let mut counts = self.counts.write().await;
        match counts.get(repository_id) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => Some(entry.value),
            Some(_) => {
                counts.remove(repository_id);
                None
            }
            None => None,
        }
    }

    pub async fn put_count(&self, repository_id: &Id, count: usize) {
        let mut counts = self.counts.write().await;
        counts.insert(repository_id.clone(), CacheEntry::new(count));
    }

    /// Drop the listing and the count of one repository.
    pub async fn invalidate_repository(&self, repository_id: &Id) {
        self.lists.write().await.remove(repository_id);
        self.counts.write().await.remove(repository_id);
    }

    /// Clear all expired entries from cache
    pub async fn clear_expired(&self) {
        let ttl = self.ttl;
        self.lists
            .write()
            .await
            .retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
        self.counts
            .write()
            .await
            .retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
    }

    pub async fn clear(&self) {
        self.lists.write().await.clear();
        self.counts.write().await.clear();
    }
}

impl Default for EntityListCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let cache = EntityListCache::default();
        let repo = "repo-1".to_string();

        assert!(cache.get_count(&repo).await.is_none());
        cache.put_count(&repo, 3).await;
        cache.put_list(&repo, Vec::new()).await;

        assert_eq!(cache.get_count(&repo).await, Some(3));
        assert_eq!(cache.get_list(&repo).await, Some(Vec::new()));

        cache.invalidate_repository(&repo).await;
        assert!(cache.get_count(&repo).await.is_none());
        assert!(cache.get_list(&repo).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidation_is_scoped_to_repository() {
        let cache = EntityListCache::default();
        let a = "repo-a".to_string();
        let b = "repo-b".to_string();
        cache.put_count(&a, 1).await;
        cache.put_count(&b, 2).await;

        cache.invalidate_repository(&a).await;

        assert!(cache.get_count(&a).await.is_none());
        assert_eq!(cache.get_count(&b).await, Some(2));
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() {
        let cache = EntityListCache::new(Duration::ZERO);
        let repo = "repo-1".to_string();
        cache.put_count(&repo, 5).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(cache.get_count(&repo).await.is_none());
        cache.put_list(&repo, Vec::new()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.clear_expired().await;
        assert!(cache.lists.read().await.is_empty());
    }
}
