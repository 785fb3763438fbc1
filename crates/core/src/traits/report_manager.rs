/// 报告同步信号
///
/// 只发出异步信号，调用方不关心结果。
pub trait ReportManager: Send + Sync {
    /// `key` 形如 `{kind}.{task}.round{N}`
    fn trigger_sync_report(&self, key: &str);
}
