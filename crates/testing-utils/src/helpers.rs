//! 测试辅助函数

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::time::sleep;

pub struct TestEnv;

impl TestEnv {
    /// 轮询条件直到满足或超时
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// 与分钟边界对齐的固定时间，方便断言 cron 计算结果
    pub fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}
