use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 资源追踪器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub item_channel_buffer: usize,
    pub max_database_cap: usize,
    pub executor_workers: usize,
    pub signal_timeout_ms: u64,
    pub trace_gap_seconds: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            item_channel_buffer: 50,
            max_database_cap: 5000,
            executor_workers: 3,
            signal_timeout_ms: 3000,
            trace_gap_seconds: 10,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.item_channel_buffer == 0 {
            return Err(anyhow::anyhow!("信号通道容量必须大于0"));
        }
        if self.max_database_cap == 0 {
            return Err(anyhow::anyhow!("缓存容量必须大于0"));
        }
        if self.executor_workers == 0 {
            return Err(anyhow::anyhow!("执行器数量必须大于0"));
        }
        if self.signal_timeout_ms == 0 {
            return Err(anyhow::anyhow!("信号超时必须大于0"));
        }
        if self.trace_gap_seconds == 0 {
            return Err(anyhow::anyhow!("扫描间隔必须大于0"));
        }
        Ok(())
    }

    pub fn signal_timeout(&self) -> Duration {
        Duration::from_millis(self.signal_timeout_ms)
    }

    pub fn trace_gap(&self) -> Duration {
        Duration::from_secs(self.trace_gap_seconds)
    }
}
