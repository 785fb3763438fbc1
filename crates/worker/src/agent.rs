//! agent 侧 reconcile
//!
//! 每个 agent 进程只关心自己负责的任务，对最新一轮：
//! - 本节点尚未执行：登记去重表，后台执行插件，稍后再查看
//! - 执行中：稍后再查看
//! - 已有结果：把本节点追加到对应列表并写回 CRD

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, ResourceExt};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use fleetprobe_core::crd::TaskObject;
use fleetprobe_core::models::{round_key, RoundStatus};
use fleetprobe_core::traits::KubeClient;
use fleetprobe_core::{ProbeError, ProbeResult, ProbeTask, StructuredLogger, TaskKind};

use crate::execution::{RoundContext, RoundExecutor};
use crate::round_registry::{LocalRoundStatus, RoundRegistry};

/// agent reconcile 之后的调度动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAction {
    Requeue,
    RequeueAfter(Duration),
    Idle,
}

/// agent 的身份与轮询参数
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub task_kind: TaskKind,
    pub task_name: String,
    pub node_name: String,
    pub pod_name: String,
    pub poll_interval: Duration,
}

pub struct AgentRoundExecutor {
    kube_client: Arc<dyn KubeClient>,
    executor: RoundExecutor,
    registry: RoundRegistry,
    identity: AgentIdentity,
}

impl AgentRoundExecutor {
    pub fn new(
        kube_client: Arc<dyn KubeClient>,
        executor: RoundExecutor,
        identity: AgentIdentity,
    ) -> Self {
        Self {
            kube_client,
            executor,
            registry: RoundRegistry::new(),
            identity,
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn registry(&self) -> &RoundRegistry {
        &self.registry
    }

    pub async fn reconcile_task<K: ProbeTask>(&self, task: &K) -> ProbeResult<AgentAction> {
        let name = task.name_any();
        if K::KIND != self.identity.task_kind || name != self.identity.task_name {
            return Ok(AgentAction::Idle);
        }

        let Some(latest) = task.task_status().and_then(|s| s.latest()) else {
            return Ok(AgentAction::Idle);
        };
        if latest.status != RoundStatus::Ongoing {
            return Ok(AgentAction::Idle);
        }
        let node = &self.identity.node_name;
        if latest.has_reported(node) {
            return Ok(AgentAction::Idle);
        }

        let round = latest.round_number;
        let key = round_key(K::KIND, &name, round);
        match self.registry.get(&key).await {
            None => {
                if self.registry.try_begin(&key).await {
                    self.start_round(task, round, &key);
                }
                Ok(AgentAction::RequeueAfter(self.identity.poll_interval))
            }
            Some(LocalRoundStatus::Ongoing) => {
                Ok(AgentAction::RequeueAfter(self.identity.poll_interval))
            }
            Some(done) => {
                self.report(task, round, done == LocalRoundStatus::Succeeded).await?;
                StructuredLogger::agent_round_reported(
                    &key,
                    node,
                    done == LocalRoundStatus::Succeeded,
                );
                Ok(AgentAction::Requeue)
            }
        }
    }

    fn start_round<K: ProbeTask>(&self, task: &K, round: i64, key: &str) {
        let timeout = task
            .plan()
            .round_timeout()
            .to_std()
            .unwrap_or(Duration::from_secs(60));
        self.launch(task.clone().into_object(), round, key, timeout);
    }

    /// 后台执行一轮，结果写入去重表，写入后去重记录在截止时间与一个轮询周期之后过期
    pub fn launch(&self, task: TaskObject, round: i64, key: &str, timeout: Duration) {
        let handle = self.executor.launch(RoundContext {
            task,
            round_number: round,
            node_name: self.identity.node_name.clone(),
            pod_name: self.identity.pod_name.clone(),
            timeout,
        });

        let registry = self.registry.clone();
        let round_key = key.to_string();
        let started = Instant::now();
        let poll = self.identity.poll_interval;
        tokio::spawn(async move {
            let outcome = handle.wait().await;
            let status = if outcome.succeed {
                LocalRoundStatus::Succeeded
            } else {
                LocalRoundStatus::Fail
            };
            debug!("轮次 {} 本地执行结束: {:?}", round_key, outcome);
            registry.set(&round_key, status).await;
            // 结果写入之后才开始过期计时，至少保留一个轮询周期供上报
            let keep = timeout.saturating_sub(started.elapsed()) + poll;
            registry.remove_after(&round_key, keep);
        });
        info!("开始执行轮次 {}", key);
    }

    /// 把本节点追加到成功或失败列表，带 resourceVersion 写回
    async fn report<K: ProbeTask>(&self, task: &K, round: i64, succeed: bool) -> ProbeResult<()> {
        let mut status = task.task_status().cloned().unwrap_or_default();
        let node = self.identity.node_name.clone();
        let Some(record) = status.latest_mut().filter(|r| r.round_number == round) else {
            return Ok(());
        };
        if record.has_reported(&node) {
            return Ok(());
        }
        if succeed {
            record.succeed_agent_node_list.push(node);
        } else {
            record.failed_agent_node_list.push(node);
        }
        self.kube_client
            .update_task_status(
                K::KIND,
                &task.name_any(),
                task.resource_version().as_deref(),
                &status,
            )
            .await
    }
}

fn to_action(action: AgentAction) -> Action {
    match action {
        AgentAction::Requeue => Action::requeue(Duration::from_millis(200)),
        AgentAction::RequeueAfter(after) => Action::requeue(after),
        AgentAction::Idle => Action::await_change(),
    }
}

pub async fn reconcile<K: ProbeTask>(
    task: Arc<K>,
    agent: Arc<AgentRoundExecutor>,
) -> Result<Action, ProbeError> {
    agent.reconcile_task(task.as_ref()).await.map(to_action)
}

pub fn error_policy<K: ProbeTask>(
    task: Arc<K>,
    error: &ProbeError,
    agent: Arc<AgentRoundExecutor>,
) -> Action {
    if error.is_conflict() {
        return Action::requeue(Duration::from_millis(200));
    }
    error!(?error, task.name = %task.name_any(), "agent reconcile 失败");
    Action::requeue(agent.identity.poll_interval)
}

/// 只 watch 本 agent 负责的任务对象
pub async fn run_agent<K: ProbeTask>(client: Client, agent: Arc<AgentRoundExecutor>) {
    let api: Api<K> = Api::all(client);
    let config = watcher::Config::default()
        .fields(&format!("metadata.name={}", agent.identity.task_name));
    info!(
        "agent 启动: 任务 {}/{}，节点 {}",
        K::KIND,
        agent.identity.task_name,
        agent.identity.node_name
    );
    Controller::new(api, config)
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, agent)
        .for_each(|result| {
            if let Err(e) = result {
                warn!("agent controller 错误: {}", e);
            }
            futures::future::ready(())
        })
        .await;
    info!("agent 已停止");
}
