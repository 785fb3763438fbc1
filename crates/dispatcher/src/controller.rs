//! 任务 reconcile
//!
//! 一次 reconcile 的顺序：
//! 1. 运行时尚未创建时先创建，资源信息与轮次状态一起写回
//! 2. 由 [`RoundScheduler`] 计算新的轮次状态，带 resourceVersion 写回
//! 3. 写回成功后才输出日志、指标和汇总报告，冲突重放不会重复输出
//! 4. 按任务状态向资源追踪器声明运行时应处的状态

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info, warn};

use fleetprobe_core::config::ControllerConfig;
use fleetprobe_core::models::{RuntimeStatus, TaskStatus};
use fleetprobe_core::traits::{KubeClient, RuntimeCreator};
use fleetprobe_core::{ProbeError, ProbeResult, ProbeTask, StructuredLogger};
use fleetprobe_infrastructure::{Item, MetricsCollector, ResourceTracker};

use crate::scheduler::{RoundAction, RoundScheduler};
use crate::summary::SummaryReporter;

/// 等待 watch 缓存追上刚写入的状态
const IMMEDIATE_REQUEUE: Duration = Duration::from_millis(200);

pub struct TaskReconciler {
    kube_client: Arc<dyn KubeClient>,
    runtime_creator: Arc<dyn RuntimeCreator>,
    tracker: Arc<ResourceTracker>,
    summary: SummaryReporter,
    scheduler: RoundScheduler,
    config: ControllerConfig,
}

impl TaskReconciler {
    pub fn new(
        kube_client: Arc<dyn KubeClient>,
        runtime_creator: Arc<dyn RuntimeCreator>,
        tracker: Arc<ResourceTracker>,
        summary: SummaryReporter,
        config: ControllerConfig,
    ) -> Self {
        let scheduler = RoundScheduler::new(
            kube_client.clone(),
            Duration::from_secs(config.task_poll_interval_seconds),
            config.crd_max_history,
        );
        Self {
            kube_client,
            runtime_creator,
            tracker,
            summary,
            scheduler,
            config,
        }
    }

    pub async fn reconcile_task<K: ProbeTask>(
        &self,
        task: &K,
        now: DateTime<Utc>,
    ) -> ProbeResult<RoundAction> {
        let name = task.name_any();

        if let Err(e) = task.plan().validate() {
            warn!("任务 {}/{} 的调度计划无效，跳过: {}", K::KIND, name, e);
            return Ok(RoundAction::Idle);
        }

        let mut task = task.clone();
        let mut runtime_created = false;
        let current = task.task_status().cloned().unwrap_or_default();
        if current.resource.is_none() && !current.finish {
            let resource = self
                .runtime_creator
                .create_task_runtime_if_not_exist(K::KIND, &name, &task.agent_spec())
                .await?;
            let mut status = current;
            status.resource = Some(resource);
            task.set_task_status(status);
            runtime_created = true;
        }

        let decision = self.scheduler.process(&task, now).await?;

        let persisted = match decision.status {
            Some(status) => Some(status),
            None if runtime_created => task.task_status().cloned(),
            None => None,
        };
        if let Some(status) = &persisted {
            self.kube_client
                .update_task_status(
                    K::KIND,
                    &name,
                    task.resource_version().as_deref(),
                    status,
                )
                .await?;
        }

        if let Some(record) = &decision.finalized {
            StructuredLogger::round_finalized(K::KIND, &name, record);
            MetricsCollector::record_round_finalized(K::KIND, record.status);
            if let Err(e) = self.summary.emit(K::KIND, &name, record).await {
                warn!(
                    "任务 {}/{} 第 {} 轮汇总报告生成失败: {}",
                    K::KIND,
                    name,
                    record.round_number,
                    e
                );
            }
        }
        if let Some(record) = &decision.scheduled {
            StructuredLogger::round_scheduled(K::KIND, &name, record);
        }

        let status = match persisted {
            Some(status) => status,
            None => task.task_status().cloned().unwrap_or_default(),
        };
        let tracked = self.track_runtime(&task, &status, now).await;

        Ok(match (decision.action, tracked) {
            (RoundAction::Idle, true) => RoundAction::RequeueAfter(self.scheduler.poll_interval()),
            (action, _) => action,
        })
    }

    /// 向追踪器声明运行时状态，返回是否仍在等待运行时被删除
    async fn track_runtime<K: ProbeTask>(
        &self,
        task: &K,
        status: &TaskStatus,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(resource) = &status.resource else {
            return false;
        };
        let name = task.name_any();

        let (item, awaiting_deletion) = if status.finish {
            if resource.runtime_status == RuntimeStatus::Deleted {
                return false;
            }
            let grace = task
                .agent_spec()
                .termination_grace(self.config.default_termination_grace_minutes);
            let deletion = status.finish_time.unwrap_or(now) + grace;
            (Item::from_resource(K::KIND, &name, resource, Some(deletion)), true)
        } else if resource.runtime_status == RuntimeStatus::Creating {
            (Item::from_resource(K::KIND, &name, resource, None), false)
        } else {
            return false;
        };

        if let Err(e) = self.tracker.apply(item).await {
            // 下一次 reconcile 会重新声明
            warn!("任务 {}/{} 的运行时未能加入追踪: {}", K::KIND, name, e);
        }
        awaiting_deletion
    }

    fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.config.error_requeue_seconds)
    }
}

fn to_action(action: RoundAction) -> Action {
    match action {
        RoundAction::Requeue => Action::requeue(IMMEDIATE_REQUEUE),
        RoundAction::RequeueAfter(after) => Action::requeue(after.max(IMMEDIATE_REQUEUE)),
        RoundAction::Idle => Action::await_change(),
    }
}

pub async fn reconcile<K: ProbeTask>(
    task: Arc<K>,
    ctx: Arc<TaskReconciler>,
) -> Result<Action, ProbeError> {
    let action = ctx.reconcile_task(task.as_ref(), Utc::now()).await?;
    debug!("任务 {}/{} reconcile 完成: {:?}", K::KIND, task.name_any(), action);
    Ok(to_action(action))
}

pub fn error_policy<K: ProbeTask>(
    task: Arc<K>,
    error: &ProbeError,
    ctx: Arc<TaskReconciler>,
) -> Action {
    if error.is_conflict() {
        debug!("任务 {}/{} 状态冲突，重新计算", K::KIND, task.name_any());
        return Action::requeue(IMMEDIATE_REQUEUE);
    }
    error!(
        ?error,
        task.kind = %K::KIND,
        task.name = %task.name_any(),
        "reconcile 失败"
    );
    Action::requeue(ctx.error_requeue())
}

/// 运行某一种任务的 controller，收到退出信号后返回
pub async fn run_controller<K: ProbeTask>(client: Client, ctx: Arc<TaskReconciler>) {
    let api: Api<K> = Api::all(client);
    info!("启动 {} controller", K::KIND);
    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(|result| {
            match result {
                Ok((obj, _)) => debug!("{} {} 已处理", K::KIND, obj.name),
                Err(e) => warn!("{} controller 错误: {}", K::KIND, e),
            }
            futures::future::ready(())
        })
        .await;
    info!("{} controller 已停止", K::KIND);
}
