//! LRU-with-TTL memory cache backed by a concurrent map.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::Result;

use super::{NAMESPACE_PREFIX, TemplateCache};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Bounded by `max_entries`; evicts the least-recently-inserted entry on
/// overflow (insertion-order LRU, not access-order — matches the spec's
/// "eviction on overflow" without requiring access tracking on every read).
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    order: Mutex<VecDeque<String>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_entries,
        }
    }

    fn evict_if_needed(&self) {
        if self.max_entries == 0 {
            return;
        }
        let mut order = self.order.lock();
        while self.entries.len() > self.max_entries {
            if let Some(oldest) = order.pop_front() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

#[async_trait]
impl TemplateCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                drop(self.entries.remove(key));
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        self.order.lock().push_back(key.to_string());
        self.evict_if_needed();
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.retain(|k, _| !k.starts_with(NAMESPACE_PREFIX));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = MemoryCache::new(10);
        cache.set("template:a:h", "hi".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("template:a:h").await, Some("hi".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let cache = MemoryCache::new(10);
        cache
            .set("template:a:h", "hi".to_string(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("template:a:h").await, None);
    }

    #[tokio::test]
    async fn evicts_oldest_entry_past_capacity() {
        let cache = MemoryCache::new(2);
        cache.set("template:a", "1".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.set("template:b", "2".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.set("template:c", "3".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("template:a").await, None);
        assert_eq!(cache.get("template:c").await, Some("3".to_string()));
    }

    #[tokio::test]
    async fn clear_only_removes_namespaced_keys() {
        let cache = MemoryCache::new(10);
        cache.set("template:a", "1".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.get("template:a").await, None);
    }
}
