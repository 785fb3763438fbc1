//! 报告同步信号
//!
//! `trigger_sync_report` 只投递一个轮次名称，真正的收集在后台消费者里完成，
//! 调用方永远不会被阻塞。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleetprobe_core::constants::SUMMARY_NODE_NAME;
use fleetprobe_core::models::{AgentReport, SummaryReport};
use fleetprobe_core::traits::{FileManager, ReportManager};
use fleetprobe_core::{ProbeError, ProbeResult, TaskKind};

#[derive(Clone)]
pub struct ChannelReportManager {
    tx: mpsc::Sender<String>,
}

impl ChannelReportManager {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl ReportManager for ChannelReportManager {
    fn trigger_sync_report(&self, key: &str) {
        if let Err(e) = self.tx.try_send(key.to_string()) {
            warn!("报告同步信号 {} 被丢弃: {}", key, e);
        }
    }
}

/// 解析 `{kind}.{task}.round{N}`，任务名允许包含 `.`
pub fn parse_round_key(key: &str) -> ProbeResult<(TaskKind, String, i64)> {
    let invalid = || ProbeError::Validation(format!("无效的轮次名称: {key}"));
    let (kind, rest) = key.split_once('.').ok_or_else(invalid)?;
    let (task, round) = rest.rsplit_once('.').ok_or_else(invalid)?;
    let round = round
        .strip_prefix("round")
        .and_then(|n| n.parse::<i64>().ok())
        .ok_or_else(invalid)?;
    if task.is_empty() {
        return Err(invalid());
    }
    Ok((kind.parse()?, task.to_string(), round))
}

/// 一轮的报告汇总
#[derive(Debug, Default)]
pub struct RoundRollup {
    pub agent_reports: Vec<AgentReport>,
    pub summary: Option<SummaryReport>,
}

impl RoundRollup {
    pub fn succeeded(&self) -> usize {
        self.agent_reports.iter().filter(|r| r.succeed).count()
    }
}

/// 消费同步信号，从文件存储中收集对应轮次的报告
pub struct ReportCollector {
    rx: mpsc::Receiver<String>,
    file_manager: Arc<dyn FileManager>,
}

impl ReportCollector {
    pub fn new(rx: mpsc::Receiver<String>, file_manager: Arc<dyn FileManager>) -> Self {
        Self { rx, file_manager }
    }

    pub async fn run(mut self, token: CancellationToken) {
        loop {
            let key = tokio::select! {
                _ = token.cancelled() => break,
                key = self.rx.recv() => match key {
                    Some(key) => key,
                    None => break,
                },
            };
            match self.collect(&key).await {
                Ok(rollup) => info!(
                    round = %key,
                    agents = rollup.agent_reports.len(),
                    succeeded = rollup.succeeded(),
                    status = ?rollup.summary.as_ref().map(|s| s.status),
                    "轮次报告已收集"
                ),
                Err(e) => warn!("收集轮次 {} 的报告失败: {}", key, e),
            }
        }
        debug!("报告收集器已退出");
    }

    pub async fn collect(&self, key: &str) -> ProbeResult<RoundRollup> {
        let (kind, task, round) = parse_round_key(key)?;
        let mut rollup = RoundRollup::default();
        for file in self.file_manager.list_task_files(kind, &task).await? {
            if file.round_number != round {
                continue;
            }
            let data = self.file_manager.read_task_file(&file).await?;
            if file.node_name == SUMMARY_NODE_NAME {
                match serde_json::from_slice::<SummaryReport>(&data) {
                    Ok(summary) => rollup.summary = Some(summary),
                    Err(e) => warn!("汇总报告 {} 无法解析: {}", file.file_name, e),
                }
            } else {
                match serde_json::from_slice::<AgentReport>(&data) {
                    Ok(report) => rollup.agent_reports.push(report),
                    Err(e) => warn!("节点报告 {} 无法解析: {}", file.file_name, e),
                }
            }
        }
        Ok(rollup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_key() {
        let (kind, task, round) = parse_round_key("NetReach.edge.v2.round12").unwrap();
        assert_eq!(kind, TaskKind::NetReach);
        assert_eq!(task, "edge.v2");
        assert_eq!(round, 12);

        assert!(parse_round_key("NetReach.edge").is_err());
        assert!(parse_round_key("NetReach.edge.roundX").is_err());
        assert!(parse_round_key("Unknown.edge.round1").is_err());
    }

    #[tokio::test]
    async fn test_trigger_drops_when_saturated() {
        let (manager, mut rx) = ChannelReportManager::new(1);
        manager.trigger_sync_report("NetDns.a.round1");
        manager.trigger_sync_report("NetDns.a.round2");

        assert_eq!(rx.recv().await.as_deref(), Some("NetDns.a.round1"));
        assert!(rx.try_recv().is_err());
    }
}
