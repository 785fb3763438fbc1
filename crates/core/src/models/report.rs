use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{RoundStatus, StatusHistoryRecord};
use crate::traits::TaskKind;

/// 一轮执行期间的进程资源使用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    pub max_memory_mb: f64,
    pub mean_memory_mb: f64,
    pub max_cpu_percent: f64,
    pub mean_cpu_percent: f64,
    pub samples: usize,
}

/// agent 在本节点上执行一轮后的报告
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReport {
    pub task_kind: TaskKind,
    pub task_name: String,
    pub round_number: i64,
    pub node_name: String,
    pub pod_name: String,
    pub start_time_stamp: DateTime<Utc>,
    pub end_time_stamp: DateTime<Utc>,
    pub round_duration: String,
    pub succeed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub detail: serde_json::Value,
    #[serde(default)]
    pub resource_usage: ResourceUsage,
}

/// controller 在每轮结束后生成的汇总报告
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub task_kind: TaskKind,
    pub task_name: String,
    pub round_number: i64,
    pub status: RoundStatus,
    pub start_time_stamp: DateTime<Utc>,
    pub end_time_stamp: Option<DateTime<Utc>>,
    pub duration: Option<String>,
    pub expected_actor_number: Option<i64>,
    pub succeed_agent_node_list: Vec<String>,
    pub failed_agent_node_list: Vec<String>,
    pub not_report_agent_node_list: Vec<String>,
    pub failure_reason: Option<String>,
}

impl SummaryReport {
    pub fn from_record(kind: TaskKind, task_name: &str, record: &StatusHistoryRecord) -> Self {
        Self {
            task_kind: kind,
            task_name: task_name.to_string(),
            round_number: record.round_number,
            status: record.status,
            start_time_stamp: record.start_time_stamp,
            end_time_stamp: record.end_time_stamp,
            duration: record.duration.clone(),
            expected_actor_number: record.expected_actor_number,
            succeed_agent_node_list: record.succeed_agent_node_list.clone(),
            failed_agent_node_list: record.failed_agent_node_list.clone(),
            not_report_agent_node_list: record.not_report_agent_node_list.clone(),
            failure_reason: record.failure_reason.clone(),
        }
    }
}
