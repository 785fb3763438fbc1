use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const FAILURE_SOME_AGENTS_FAILED: &str = "some agents failed";
pub const FAILURE_SOME_AGENTS_NOT_REPORTED: &str = "some agents did not report";

/// 单轮状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    NotStarted,
    Ongoing,
    Succeed,
    Fail,
}

impl RoundStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeed | Self::Fail)
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "notstarted",
            Self::Ongoing => "ongoing",
            Self::Succeed => "succeed",
            Self::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// 承载 agent 的工作负载类型
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
    Default,
)]
pub enum RuntimeKind {
    Deployment,
    #[default]
    DaemonSet,
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => f.write_str("Deployment"),
            Self::DaemonSet => f.write_str("DaemonSet"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum RuntimeStatus {
    Creating,
    Created,
    Deleted,
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => f.write_str("Creating"),
            Self::Created => f.write_str("Created"),
            Self::Deleted => f.write_str("Deleted"),
        }
    }
}

/// 任务运行时资源，只有资源追踪器会推进 `runtime_status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskResource {
    pub runtime_type: RuntimeKind,
    pub runtime_name: String,
    pub runtime_status: RuntimeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name_v4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name_v6: Option<String>,
}

/// 一轮探测的历史记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryRecord {
    pub status: RoundStatus,
    pub round_number: i64,
    pub start_time_stamp: DateTime<Utc>,
    pub dead_line_time_stamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time_stamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_actor_number: Option<i64>,
    #[serde(default)]
    pub succeed_agent_node_list: Vec<String>,
    #[serde(default)]
    pub failed_agent_node_list: Vec<String>,
    #[serde(default)]
    pub not_report_agent_node_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl StatusHistoryRecord {
    pub fn not_started(round_number: i64, start: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            status: RoundStatus::NotStarted,
            round_number,
            start_time_stamp: start,
            dead_line_time_stamp: start
                .checked_add_signed(timeout)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            end_time_stamp: None,
            duration: None,
            expected_actor_number: None,
            succeed_agent_node_list: Vec::new(),
            failed_agent_node_list: Vec::new(),
            not_report_agent_node_list: Vec::new(),
            failure_reason: None,
        }
    }

    /// start <= now < deadline
    pub fn in_window(&self, now: DateTime<Utc>) -> bool {
        self.start_time_stamp <= now && now < self.dead_line_time_stamp
    }

    /// 已上报节点（成功 ∪ 失败）
    pub fn reported_nodes(&self) -> BTreeSet<String> {
        self.succeed_agent_node_list
            .iter()
            .chain(self.failed_agent_node_list.iter())
            .cloned()
            .collect()
    }

    pub fn has_reported(&self, node: &str) -> bool {
        self.succeed_agent_node_list.iter().any(|n| n == node)
            || self.failed_agent_node_list.iter().any(|n| n == node)
    }

    /// 结束本轮：失败列表与未上报列表都为空才算成功
    pub fn finalize(&mut self, unknown: Vec<String>, now: DateTime<Utc>) {
        let reported = self.reported_nodes().len() as i64;
        self.status = if self.failed_agent_node_list.is_empty() && unknown.is_empty() {
            RoundStatus::Succeed
        } else {
            RoundStatus::Fail
        };
        self.failure_reason = match self.status {
            RoundStatus::Fail if !self.failed_agent_node_list.is_empty() => {
                Some(FAILURE_SOME_AGENTS_FAILED.to_string())
            }
            RoundStatus::Fail => Some(FAILURE_SOME_AGENTS_NOT_REPORTED.to_string()),
            _ => None,
        };
        self.expected_actor_number = Some(reported + unknown.len() as i64);
        self.not_report_agent_node_list = unknown;
        self.end_time_stamp = Some(now);
        self.duration = Some(format_duration(now - self.start_time_stamp));
    }
}

/// 持久化在 CRD 上的任务状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_round: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_round: Option<i64>,
    #[serde(default)]
    pub finish: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_round_status: Option<RoundStatus>,
    /// 最新的记录在最前
    #[serde(default)]
    pub history: Vec<StatusHistoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<TaskResource>,
}

impl TaskStatus {
    pub fn latest(&self) -> Option<&StatusHistoryRecord> {
        self.history.first()
    }

    pub fn latest_mut(&mut self) -> Option<&mut StatusHistoryRecord> {
        self.history.first_mut()
    }

    /// 新记录插入最前，并截断到 `max_history`
    pub fn push_record(&mut self, record: StatusHistoryRecord, max_history: usize) {
        self.history.insert(0, record);
        self.history.truncate(max_history.max(1));
    }

    /// 所有轮次都已完成
    pub fn all_rounds_done(&self) -> bool {
        match (self.expected_round, self.done_round) {
            (Some(expected), Some(done)) => expected != crate::UNLIMITED_ROUNDS && done >= expected,
            _ => false,
        }
    }
}

/// 轮次的唯一名称 `{kind}.{task}.round{N}`
pub fn round_key(kind: impl fmt::Display, task: &str, round: i64) -> String {
    format!("{kind}.{task}.round{round}")
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.num_milliseconds().max(0);
    format!("{}.{:03}s", millis / 1000, millis % 1000)
}
