use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::TaskKind;
use crate::ProbeResult;

/// 解析后的报告文件名 `{kind}_{task}_round{N}_{node}_{RFC3339-expiry}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFile {
    pub file_name: String,
    pub kind: TaskKind,
    pub task_name: String,
    pub round_number: i64,
    pub node_name: String,
    pub expiry: DateTime<Utc>,
}

impl TaskFile {
    pub fn new(
        kind: TaskKind,
        task_name: &str,
        round_number: i64,
        node_name: &str,
        expiry: DateTime<Utc>,
    ) -> Self {
        let file_name = format!(
            "{kind}_{task_name}_round{round_number}_{node_name}_{}",
            expiry.to_rfc3339()
        );
        Self {
            file_name,
            kind,
            task_name: task_name.to_string(),
            round_number,
            node_name: node_name.to_string(),
            expiry,
        }
    }

    /// 不符合命名约定的文件返回 `None`
    pub fn parse(file_name: &str) -> Option<Self> {
        let mut parts = file_name.splitn(5, '_');
        let kind = parts.next()?.parse::<TaskKind>().ok()?;
        let task_name = parts.next()?;
        let round_number = parts.next()?.strip_prefix("round")?.parse::<i64>().ok()?;
        let node_name = parts.next()?;
        let expiry = DateTime::parse_from_rfc3339(parts.next()?)
            .ok()?
            .with_timezone(&Utc);
        if task_name.is_empty() || node_name.is_empty() {
            return None;
        }
        Some(Self {
            file_name: file_name.to_string(),
            kind,
            task_name: task_name.to_string(),
            round_number,
            node_name: node_name.to_string(),
            expiry,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// 报告文件存储
#[async_trait]
pub trait FileManager: Send + Sync {
    async fn write_task_file(
        &self,
        kind: TaskKind,
        task_name: &str,
        round_number: i64,
        node_name: &str,
        expiry: DateTime<Utc>,
        data: &[u8],
    ) -> ProbeResult<()>;

    async fn list_task_files(&self, kind: TaskKind, task_name: &str) -> ProbeResult<Vec<TaskFile>>;

    async fn read_task_file(&self, file: &TaskFile) -> ProbeResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_convention() {
        let expiry = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
        let file = TaskFile::new(TaskKind::NetDns, "dns-check", 4, "node-1", expiry);
        assert_eq!(
            file.file_name,
            "NetDns_dns-check_round4_node-1_2026-03-01T08:30:00+00:00"
        );

        let parsed = TaskFile::parse(&file.file_name).unwrap();
        assert_eq!(parsed, file);
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        assert!(TaskFile::parse("README.md").is_none());
        assert!(TaskFile::parse("NetDns_dns_roundX_node_2026-03-01T08:30:00Z").is_none());
        assert!(TaskFile::parse("Pod_x_round1_node_2026-03-01T08:30:00Z").is_none());
    }
}
