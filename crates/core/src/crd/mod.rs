//! 探测任务 CRD
//!
//! 三种任务共用 `AgentSpec`、`SchedulePlan` 与 `TaskStatus`，差异只在探测目标。

mod app_http_healthy;
mod net_dns;
mod net_reach;

pub use app_http_healthy::{AppHttpHealthy, AppHttpHealthySpec, HttpTarget};
pub use net_dns::{DnsTarget, NetDns, NetDnsSpec};
pub use net_reach::{NetReach, NetReachSpec, NetReachTarget};

use chrono::Duration;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_DEPLOYMENT_REPLICAS;
use crate::models::{RuntimeKind, SchedulePlan, TaskStatus};
use crate::traits::{ProbeTask, TaskKind};

/// agent 运行时配置
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    #[serde(default)]
    pub kind: RuntimeKind,

    /// 仅 Deployment 生效，默认 2
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_replicas: Option<i32>,

    /// 任务结束后保留运行时的分钟数，未设置时使用 controller 默认值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_minutes: Option<i64>,

    #[serde(default)]
    pub host_network: bool,
}

impl AgentSpec {
    pub fn replicas(&self) -> i32 {
        self.deployment_replicas
            .filter(|r| *r > 0)
            .unwrap_or(DEFAULT_DEPLOYMENT_REPLICAS)
    }

    pub fn termination_grace(&self, default_minutes: i64) -> Duration {
        let minutes = self
            .termination_grace_period_minutes
            .filter(|m| *m >= 0)
            .unwrap_or(default_minutes);
        Duration::try_minutes(minutes).unwrap_or(Duration::MAX)
    }
}

fn default_request_timeout_ms() -> u64 {
    1000
}

fn default_attempts() -> u32 {
    1
}

/// 单次请求参数
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRequest {
    #[serde(default = "default_request_timeout_ms")]
    pub per_request_timeout_ms: u64,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

impl Default for ProbeRequest {
    fn default() -> Self {
        Self {
            per_request_timeout_ms: default_request_timeout_ms(),
            attempts: default_attempts(),
        }
    }
}

fn default_success_rate() -> f64 {
    1.0
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuccessCondition {
    /// 0.0 ~ 1.0
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
}

impl Default for SuccessCondition {
    fn default() -> Self {
        Self {
            success_rate: default_success_rate(),
        }
    }
}

/// 在边界处按类型分派的任务对象
#[derive(Clone, Debug)]
pub enum TaskObject {
    NetReach(NetReach),
    AppHttpHealthy(AppHttpHealthy),
    NetDns(NetDns),
}

impl TaskObject {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::NetReach(_) => TaskKind::NetReach,
            Self::AppHttpHealthy(_) => TaskKind::AppHttpHealthy,
            Self::NetDns(_) => TaskKind::NetDns,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::NetReach(t) => t.name_any(),
            Self::AppHttpHealthy(t) => t.name_any(),
            Self::NetDns(t) => t.name_any(),
        }
    }

    pub fn plan(&self) -> &SchedulePlan {
        match self {
            Self::NetReach(t) => t.plan(),
            Self::AppHttpHealthy(t) => t.plan(),
            Self::NetDns(t) => t.plan(),
        }
    }

    pub fn task_status(&self) -> Option<&TaskStatus> {
        match self {
            Self::NetReach(t) => t.task_status(),
            Self::AppHttpHealthy(t) => t.task_status(),
            Self::NetDns(t) => t.task_status(),
        }
    }
}
