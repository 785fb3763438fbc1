use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kube::Client;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use fleetprobe_core::crd::{AppHttpHealthy, NetDns, NetReach};
use fleetprobe_core::traits::KubeClient;
use fleetprobe_core::{AppConfig, TaskKind};
use fleetprobe_dispatcher::{run_controller, SummaryReporter, TaskReconciler};
use fleetprobe_infrastructure::{
    init_metrics, ChannelReportManager, FileCleanupService, KubeApiClient, KubeRuntimeCreator,
    KubeRuntimeResolver, LocalFileManager, ReportCollector, ResourceSampler, ResourceTracker,
};
use fleetprobe_worker::{
    run_agent, AgentIdentity, AgentRoundExecutor, PluginRegistry, RoundExecutor,
};

use crate::health::{self, HealthState};
use crate::shutdown::ShutdownManager;

/// 汇总报告通知队列长度
const REPORT_QUEUE_SIZE: usize = 256;

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 任务 controller：排期轮次、管理运行时、汇总报告
    Controller,
    /// 运行时内的探测 agent
    Agent,
}

impl FromStr for AppMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "controller" => Ok(Self::Controller),
            "agent" => Ok(Self::Agent),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {s}")),
        }
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller => f.write_str("controller"),
            Self::Agent => f.write_str("agent"),
        }
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        if mode == AppMode::Agent {
            config.agent.local_task()?;
        }
        Ok(Self { config, mode })
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    pub async fn run(&self, shutdown: &ShutdownManager) -> Result<()> {
        info!("启动应用程序，模式: {}", self.mode);

        if let Some(addr) = &self.config.observability.metrics_bind_address {
            init_metrics(addr)?;
        }
        let client = Client::try_default()
            .await
            .context("创建 Kubernetes 客户端失败")?;

        match self.mode {
            AppMode::Controller => self.run_controller_mode(client, shutdown).await,
            AppMode::Agent => self.run_agent_mode(client, shutdown).await,
        }
    }

    async fn run_controller_mode(&self, client: Client, shutdown: &ShutdownManager) -> Result<()> {
        let config = &self.config.controller;
        let token = shutdown.token();

        let kube_client: Arc<dyn KubeClient> =
            Arc::new(KubeApiClient::new(client.clone(), &config.agent_namespace));
        let resolver = Arc::new(KubeRuntimeResolver::new(client.clone(), &config.agent_namespace));
        let tracker = Arc::new(ResourceTracker::new(
            self.config.tracker.clone(),
            kube_client.clone(),
            resolver,
        ));
        let mut handles = tracker.start(token.clone());

        let file_manager = Arc::new(
            LocalFileManager::new(&config.report_dir)
                .await
                .with_context(|| format!("初始化报告目录失败: {}", config.report_dir))?,
        );
        let mut cleanup = FileCleanupService::new(
            file_manager.clone(),
            Duration::from_secs(config.report_cleanup_interval_seconds),
        );
        cleanup.start();

        let (report_manager, report_rx) = ChannelReportManager::new(REPORT_QUEUE_SIZE);
        let collector = ReportCollector::new(report_rx, file_manager.clone());
        handles.push(tokio::spawn(collector.run(token.clone())));

        let summary = SummaryReporter::new(file_manager, Arc::new(report_manager));
        let creator = Arc::new(KubeRuntimeCreator::new(client.clone(), config.clone()));
        let reconciler = Arc::new(TaskReconciler::new(
            kube_client,
            creator,
            tracker,
            summary,
            config.clone(),
        ));

        let health_state = HealthState::new();
        let health_handle = self.spawn_health(health_state.clone(), shutdown);

        let controllers = futures::future::join3(
            run_controller::<NetReach>(client.clone(), reconciler.clone()),
            run_controller::<AppHttpHealthy>(client.clone(), reconciler.clone()),
            run_controller::<NetDns>(client, reconciler),
        );
        health_state.set_ready(true);
        info!("controller 已启动，agent 命名空间: {}", config.agent_namespace);

        let mut shutdown_rx = shutdown.subscribe();
        tokio::select! {
            _ = controllers => info!("所有 controller 已退出"),
            _ = shutdown_rx.recv() => info!("controller 收到关闭信号"),
        }

        health_state.set_ready(false);
        shutdown.shutdown();
        cleanup.stop().await;
        handles.push(health_handle);
        join_all(handles).await;
        info!("controller 已停止");
        Ok(())
    }

    async fn run_agent_mode(&self, client: Client, shutdown: &ShutdownManager) -> Result<()> {
        let identity = self.agent_identity()?;
        let agent_config = &self.config.agent;

        let kube_client: Arc<dyn KubeClient> = Arc::new(KubeApiClient::new(
            client.clone(),
            &self.config.controller.agent_namespace,
        ));
        let file_manager = Arc::new(
            LocalFileManager::new(&agent_config.report_dir)
                .await
                .with_context(|| format!("初始化报告目录失败: {}", agent_config.report_dir))?,
        );
        let plugins = Arc::new(PluginRegistry::with_builtin());
        let executor = RoundExecutor::new(plugins, file_manager, ResourceSampler::default());
        let task_kind = identity.task_kind;
        let agent = Arc::new(AgentRoundExecutor::new(kube_client, executor, identity));

        let health_state = HealthState::new();
        let health_handle = self.spawn_health(health_state.clone(), shutdown);
        health_state.set_ready(true);

        let watch = async {
            match task_kind {
                TaskKind::NetReach => run_agent::<NetReach>(client, agent).await,
                TaskKind::AppHttpHealthy => run_agent::<AppHttpHealthy>(client, agent).await,
                TaskKind::NetDns => run_agent::<NetDns>(client, agent).await,
            }
        };
        let mut shutdown_rx = shutdown.subscribe();
        tokio::select! {
            _ = watch => info!("agent watch 已退出"),
            _ = shutdown_rx.recv() => info!("agent 收到关闭信号"),
        }

        health_state.set_ready(false);
        shutdown.shutdown();
        join_all(vec![health_handle]).await;
        Ok(())
    }

    /// 节点名与 pod 名缺省时使用主机名
    fn agent_identity(&self) -> Result<AgentIdentity> {
        let config = &self.config.agent;
        let (task_kind, task_name) = config.local_task()?;
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(AgentIdentity {
            task_kind,
            task_name,
            node_name: config.node_name.clone().unwrap_or_else(|| host.clone()),
            pod_name: config.pod_name.clone().unwrap_or(host),
            poll_interval: Duration::from_secs(config.task_poll_interval_seconds),
        })
    }

    fn spawn_health(&self, state: HealthState, shutdown: &ShutdownManager) -> JoinHandle<()> {
        let address = self.config.observability.health_bind_address.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = health::serve(&address, state, shutdown_rx).await {
                error!("健康检查端点运行失败: {e:#}");
            }
        })
    }
}

async fn join_all(handles: Vec<JoinHandle<()>>) {
    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            warn!("后台任务异常退出: {e}");
        }
    }
}
