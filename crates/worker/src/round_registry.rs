use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

/// 本进程内一轮的执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalRoundStatus {
    Ongoing,
    Succeeded,
    Fail,
}

/// 轮次去重表，只保证单个 agent 进程内每轮最多执行一次，重启后丢失
#[derive(Debug, Clone, Default)]
pub struct RoundRegistry {
    entries: Arc<RwLock<HashMap<String, LocalRoundStatus>>>,
}

impl RoundRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<LocalRoundStatus> {
        self.entries.read().await.get(key).copied()
    }

    /// 不存在时登记为 `Ongoing` 并返回 true
    pub async fn try_begin(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_string(), LocalRoundStatus::Ongoing);
        true
    }

    pub async fn set(&self, key: &str, status: LocalRoundStatus) {
        self.entries.write().await.insert(key.to_string(), status);
    }

    pub async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 延迟删除条目
    pub fn remove_after(&self, key: &str, delay: Duration) {
        let registry = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.remove(&key).await;
            debug!("轮次 {} 的去重记录已过期", key);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_begin_only_once() {
        let registry = RoundRegistry::new();
        assert!(registry.try_begin("NetDns.a.round1").await);
        assert!(!registry.try_begin("NetDns.a.round1").await);
        assert!(registry.try_begin("NetDns.a.round2").await);
        assert_eq!(registry.get("NetDns.a.round1").await, Some(LocalRoundStatus::Ongoing));
    }

    #[tokio::test]
    async fn test_concurrent_begin_has_single_winner() {
        let registry = RoundRegistry::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.try_begin("NetReach.x.round3").await })
            })
            .collect();
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_remove_after_expires_entry() {
        let registry = RoundRegistry::new();
        registry.set("k", LocalRoundStatus::Succeeded).await;
        registry.remove_after("k", Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_empty().await);
    }
}
