use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use fleetprobe_core::traits::RuntimeKey;
use fleetprobe_core::{ProbeError, ProbeResult};

use super::item::Item;

/// 有容量上限的运行时缓存，锁内不做任何 I/O
pub struct CacheDb {
    items: RwLock<HashMap<RuntimeKey, Item>>,
    capacity: usize,
}

impl CacheDb {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// 插入或更新，返回是否发生了变化
    pub async fn apply(&self, item: Item) -> ProbeResult<bool> {
        let mut items = self.items.write().await;
        match items.get(&item.key) {
            Some(existing) if *existing == item => Ok(false),
            Some(_) => {
                debug!("更新运行时记录 {}", item.key);
                items.insert(item.key.clone(), item);
                Ok(true)
            }
            None if items.len() >= self.capacity => Err(ProbeError::OutOfCapacity {
                capacity: self.capacity,
            }),
            None => {
                debug!("新增运行时记录 {}", item.key);
                items.insert(item.key.clone(), item);
                Ok(true)
            }
        }
    }

    /// 只有存储的记录与传入的记录一致时才删除，避免删掉处理期间被更新过的记录
    pub async fn delete(&self, item: &Item) -> bool {
        let mut items = self.items.write().await;
        if items.get(&item.key) == Some(item) {
            items.remove(&item.key);
            true
        } else {
            false
        }
    }

    pub async fn get(&self, key: &RuntimeKey) -> Option<Item> {
        self.items.read().await.get(key).cloned()
    }

    /// 当前时刻的快照
    pub async fn list(&self) -> Vec<Item> {
        self.items.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
