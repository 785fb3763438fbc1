use serde::{Deserialize, Serialize};

use crate::traits::TaskKind;

/// controller 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// 轮次进行中时的轮询间隔
    pub task_poll_interval_seconds: u64,
    /// CRD 状态中保留的历史轮次数
    pub crd_max_history: usize,
    pub agent_image: String,
    pub agent_namespace: String,
    pub default_termination_grace_minutes: i64,
    pub enable_ipv4: bool,
    pub enable_ipv6: bool,
    pub report_dir: String,
    pub report_cleanup_interval_seconds: u64,
    /// reconcile 出错后的重试间隔
    pub error_requeue_seconds: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            task_poll_interval_seconds: 5,
            crd_max_history: 10,
            agent_image: "ghcr.io/fleetprobe/fleetprobe:latest".to_string(),
            agent_namespace: "fleetprobe".to_string(),
            default_termination_grace_minutes: 60,
            enable_ipv4: true,
            enable_ipv6: false,
            report_dir: "/var/lib/fleetprobe/reports".to_string(),
            report_cleanup_interval_seconds: 300,
            error_requeue_seconds: 10,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.task_poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("任务轮询间隔必须大于0"));
        }
        if self.crd_max_history == 0 {
            return Err(anyhow::anyhow!("历史记录上限必须大于0"));
        }
        if self.agent_image.is_empty() {
            return Err(anyhow::anyhow!("agent 镜像不能为空"));
        }
        if self.agent_namespace.is_empty() {
            return Err(anyhow::anyhow!("agent 命名空间不能为空"));
        }
        if self.default_termination_grace_minutes < 0 {
            return Err(anyhow::anyhow!("默认保留时间不能为负数"));
        }
        if !self.enable_ipv4 && !self.enable_ipv6 {
            return Err(anyhow::anyhow!("IPv4 与 IPv6 至少启用一个"));
        }
        if self.report_dir.is_empty() {
            return Err(anyhow::anyhow!("报告目录不能为空"));
        }
        if self.report_cleanup_interval_seconds == 0 {
            return Err(anyhow::anyhow!("报告清理间隔必须大于0"));
        }
        Ok(())
    }
}

/// agent 配置，任务类型与名称通常由运行时通过环境变量注入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub task_kind: Option<String>,
    pub task_name: Option<String>,
    pub node_name: Option<String>,
    pub pod_name: Option<String>,
    pub task_poll_interval_seconds: u64,
    pub report_dir: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            task_kind: None,
            task_name: None,
            node_name: None,
            pod_name: None,
            task_poll_interval_seconds: 5,
            report_dir: "/var/lib/fleetprobe/reports".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.task_poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("任务轮询间隔必须大于0"));
        }
        if self.report_dir.is_empty() {
            return Err(anyhow::anyhow!("报告目录不能为空"));
        }
        if let Some(kind) = &self.task_kind {
            kind.parse::<TaskKind>()?;
        }
        Ok(())
    }

    /// agent 模式下必须知道自己负责的任务
    pub fn local_task(&self) -> anyhow::Result<(TaskKind, String)> {
        let kind = self
            .task_kind
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("agent 模式需要配置 task_kind"))?
            .parse::<TaskKind>()?;
        let name = self
            .task_name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| anyhow::anyhow!("agent 模式需要配置 task_name"))?;
        Ok((kind, name))
    }
}
