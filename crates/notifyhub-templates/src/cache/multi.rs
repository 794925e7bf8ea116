//! Chains any number of cache layers (memory, Redis, ...) with
//! write-through and read-through toggles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

use super::TemplateCache;

pub struct MultiLayerCache {
    layers: Vec<Arc<dyn TemplateCache>>,
    write_through: bool,
    read_through: bool,
}

impl MultiLayerCache {
    /// `layers` ordered fastest-first (e.g. memory, then Redis).
    pub fn new(layers: Vec<Arc<dyn TemplateCache>>) -> Self {
        Self {
            layers,
            write_through: true,
            read_through: true,
        }
    }

    pub fn with_write_through(mut self, enabled: bool) -> Self {
        self.write_through = enabled;
        self
    }

    pub fn with_read_through(mut self, enabled: bool) -> Self {
        self.read_through = enabled;
        self
    }
}

#[async_trait]
impl TemplateCache for MultiLayerCache {
    async fn get(&self, key: &str) -> Option<String> {
        for (depth, layer) in self.layers.iter().enumerate() {
            if let Some(value) = layer.get(key).await {
                if self.read_through {
                    for upper in self.layers.iter().take(depth) {
                        let _ = upper.set(key, value.clone(), Duration::from_secs(300)).await;
                    }
                }
                return Some(value);
            }
        }
        None
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        if self.write_through {
            for layer in &self.layers {
                layer.set(key, value.clone(), ttl).await?;
            }
        } else if let Some(first) = self.layers.first() {
            first.set(key, value, ttl).await?;
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        for layer in &self.layers {
            layer.remove(key).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        for layer in &self.layers {
            layer.clear().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCache;

    #[tokio::test]
    async fn read_through_populates_upper_layer_on_lower_hit() {
        let l1 = Arc::new(MemoryCache::new(10));
        let l2 = Arc::new(MemoryCache::new(10));
        l2.set("template:a:h", "value".to_string(), Duration::from_secs(60)).await.unwrap();

        let multi = MultiLayerCache::new(vec![l1.clone(), l2.clone()]);
        assert_eq!(multi.get("template:a:h").await, Some("value".to_string()));
        assert_eq!(l1.get("template:a:h").await, Some("value".to_string()));
    }

    #[tokio::test]
    async fn write_through_writes_all_layers() {
        let l1 = Arc::new(MemoryCache::new(10));
        let l2 = Arc::new(MemoryCache::new(10));
        let multi = MultiLayerCache::new(vec![l1.clone(), l2.clone()]);

        multi.set("template:a:h", "value".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(l1.get("template:a:h").await, Some("value".to_string()));
        assert_eq!(l2.get("template:a:h").await, Some("value".to_string()));
    }

    #[tokio::test]
    async fn disabling_write_through_only_writes_first_layer() {
        let l1 = Arc::new(MemoryCache::new(10));
        let l2 = Arc::new(MemoryCache::new(10));
        let multi = MultiLayerCache::new(vec![l1.clone(), l2.clone()]).with_write_through(false);

        multi.set("template:a:h", "value".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(l1.get("template:a:h").await, Some("value".to_string()));
        assert_eq!(l2.get("template:a:h").await, None);
    }
}
