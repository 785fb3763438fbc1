//! 日志初始化与结构化事件

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::models::{RoundStatus, StatusHistoryRecord};
use crate::traits::{RuntimeKey, TaskKind};

/// 初始化日志系统，`RUST_LOG` 优先于传入的级别
pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 命名的业务事件，字段名在各组件之间保持一致
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn round_scheduled(kind: TaskKind, task: &str, record: &StatusHistoryRecord) {
        info!(
            event = "round_scheduled",
            task.kind = %kind,
            task.name = task,
            round = record.round_number,
            start = %record.start_time_stamp,
            deadline = %record.dead_line_time_stamp,
            "轮次已排期"
        );
    }

    pub fn round_finalized(kind: TaskKind, task: &str, record: &StatusHistoryRecord) {
        if record.status == RoundStatus::Succeed {
            info!(
                event = "round_finalized",
                task.kind = %kind,
                task.name = task,
                round = record.round_number,
                status = %record.status,
                "轮次结束"
            );
        } else {
            warn!(
                event = "round_finalized",
                task.kind = %kind,
                task.name = task,
                round = record.round_number,
                status = %record.status,
                failed = ?record.failed_agent_node_list,
                not_reported = ?record.not_report_agent_node_list,
                reason = record.failure_reason.as_deref().unwrap_or_default(),
                "轮次结束"
            );
        }
    }

    pub fn runtime_ready(key: &RuntimeKey, task: &str) {
        info!(event = "runtime_ready", runtime = %key, task.name = task, "运行时已就绪");
    }

    pub fn runtime_deleted(key: &RuntimeKey, task: &str) {
        info!(event = "runtime_deleted", runtime = %key, task.name = task, "运行时已删除");
    }

    pub fn agent_round_reported(round_key: &str, node: &str, succeed: bool) {
        info!(
            event = "agent_round_reported",
            round = round_key,
            node = node,
            succeed = succeed,
            "节点已上报轮次结果"
        );
    }
}
