//! 单轮探测执行
//!
//! [`RoundExecutor::launch`] 在后台执行插件并立即返回 [`RoundTaskHandle`]。
//! 句柄只有一个等待者：插件结果与截止时间竞争，截止时间先到则本轮记为超时失败，
//! 后台任务仍会执行到结束并写出报告。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use fleetprobe_core::constants::REPORT_EXPIRY_GRACE_MINUTES;
use fleetprobe_core::crd::TaskObject;
use fleetprobe_core::models::{format_duration, AgentReport};
use fleetprobe_core::traits::{FileManager, PluginOutcome};
use fleetprobe_core::{ProbeError, ProbeResult};
use fleetprobe_infrastructure::{MetricsCollector, ResourceSampler};

use crate::plugins::PluginRegistry;

pub const FAILURE_ROUND_TIMEOUT: &str = "round timed out";

/// 一轮执行所需的输入
#[derive(Debug, Clone)]
pub struct RoundContext {
    pub task: TaskObject,
    pub round_number: i64,
    pub node_name: String,
    pub pod_name: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub succeed: bool,
    pub failure_reason: Option<String>,
}

impl RoundOutcome {
    pub fn success() -> Self {
        Self {
            succeed: true,
            failure_reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            succeed: false,
            failure_reason: Some(reason.into()),
        }
    }

    /// 插件错误 > 超时 > 未满足成功条件 > 成功
    pub fn classify(result: &ProbeResult<PluginOutcome>, timed_out: bool) -> Self {
        match result {
            Err(e) => Self::failure(e.to_string()),
            Ok(_) if timed_out => Self::failure(FAILURE_ROUND_TIMEOUT),
            Ok(PluginOutcome {
                failure_reason: Some(reason),
                ..
            }) => Self::failure(reason.clone()),
            Ok(_) => Self::success(),
        }
    }
}

pub struct RoundTaskHandle {
    cancel: CancellationToken,
    result: oneshot::Receiver<RoundOutcome>,
}

impl RoundTaskHandle {
    pub async fn wait(self) -> RoundOutcome {
        tokio::select! {
            outcome = self.result => {
                outcome.unwrap_or_else(|_| RoundOutcome::failure("round task aborted"))
            }
            _ = self.cancel.cancelled() => RoundOutcome::failure(FAILURE_ROUND_TIMEOUT),
        }
    }
}

#[derive(Clone)]
pub struct RoundExecutor {
    plugins: Arc<PluginRegistry>,
    file_manager: Arc<dyn FileManager>,
    sampler: ResourceSampler,
}

impl RoundExecutor {
    pub fn new(
        plugins: Arc<PluginRegistry>,
        file_manager: Arc<dyn FileManager>,
        sampler: ResourceSampler,
    ) -> Self {
        Self {
            plugins,
            file_manager,
            sampler,
        }
    }

    pub fn launch(&self, ctx: RoundContext) -> RoundTaskHandle {
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let deadline = cancel.clone();
        let timeout = ctx.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            deadline.cancel();
        });

        let executor = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let start = Utc::now();
            let sampler = executor.sampler.start();

            let kind = ctx.task.kind();
            let result = match executor.plugins.get(kind) {
                Some(plugin) => plugin.execute(&ctx.task, token.clone()).await,
                None => Err(ProbeError::PluginExecution(format!("没有 {kind} 类型的插件"))),
            };
            let timed_out = token.is_cancelled();
            timer.abort();
            let usage = sampler.stop().await;

            let outcome = RoundOutcome::classify(&result, timed_out);
            let end = Utc::now();
            MetricsCollector::record_agent_round(
                kind,
                outcome.succeed,
                (end - start).num_milliseconds().max(0) as f64 / 1000.0,
            );

            let report = AgentReport {
                task_kind: kind,
                task_name: ctx.task.name(),
                round_number: ctx.round_number,
                node_name: ctx.node_name.clone(),
                pod_name: ctx.pod_name.clone(),
                start_time_stamp: start,
                end_time_stamp: end,
                round_duration: format_duration(end - start),
                succeed: outcome.succeed,
                failure_reason: outcome.failure_reason.clone(),
                detail: result.map(|o| o.detail).unwrap_or_default(),
                resource_usage: usage,
            };
            if let Err(e) = executor.write_report(&report, &ctx).await {
                warn!("第 {} 轮报告写入失败: {}", ctx.round_number, e);
            }

            // 等待者可能已因超时离开
            if tx.send(outcome).is_err() {
                debug!("第 {} 轮结果无人等待", ctx.round_number);
            }
        });

        RoundTaskHandle { cancel, result: rx }
    }

    async fn write_report(&self, report: &AgentReport, ctx: &RoundContext) -> ProbeResult<()> {
        let data = serde_json::to_vec(report)?;
        let keep = chrono::Duration::from_std(ctx.timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(0))
            + chrono::Duration::minutes(REPORT_EXPIRY_GRACE_MINUTES);
        self.file_manager
            .write_task_file(
                report.task_kind,
                &report.task_name,
                report.round_number,
                &report.node_name,
                report.end_time_stamp + keep,
                &data,
            )
            .await
    }
}
