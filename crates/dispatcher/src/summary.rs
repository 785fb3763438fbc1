use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::debug;

use fleetprobe_core::constants::{SUMMARY_NODE_NAME, SUMMARY_REPORT_RETENTION_HOURS};
use fleetprobe_core::models::{round_key, StatusHistoryRecord, SummaryReport};
use fleetprobe_core::traits::{FileManager, ReportManager};
use fleetprobe_core::{ProbeResult, TaskKind};

/// 每轮结束后写出汇总报告并通知报告同步
pub struct SummaryReporter {
    file_manager: Arc<dyn FileManager>,
    report_manager: Arc<dyn ReportManager>,
}

impl SummaryReporter {
    pub fn new(file_manager: Arc<dyn FileManager>, report_manager: Arc<dyn ReportManager>) -> Self {
        Self {
            file_manager,
            report_manager,
        }
    }

    pub async fn emit(
        &self,
        kind: TaskKind,
        task_name: &str,
        record: &StatusHistoryRecord,
    ) -> ProbeResult<()> {
        let report = SummaryReport::from_record(kind, task_name, record);
        let data = serde_json::to_vec(&report)?;
        let expiry = Utc::now() + Duration::hours(SUMMARY_REPORT_RETENTION_HOURS);
        self.file_manager
            .write_task_file(
                kind,
                task_name,
                record.round_number,
                SUMMARY_NODE_NAME,
                expiry,
                &data,
            )
            .await?;

        let key = round_key(kind, task_name, record.round_number);
        self.report_manager.trigger_sync_report(&key);
        debug!("已生成汇总报告 {}", key);
        Ok(())
    }
}
