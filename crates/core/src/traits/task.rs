//! 任务能力接口
//!
//! 三种任务类型（NetReach、AppHttpHealthy、NetDns）在调度状态机和资源追踪器里
//! 被统一对待，按类型分派只发生在边界（Kubernetes API 访问、插件选择）。

use std::fmt;
use std::str::FromStr;

use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::RUNTIME_NAME_PREFIX;
use crate::crd::{AgentSpec, TaskObject};
use crate::models::{SchedulePlan, TaskStatus};
use crate::ProbeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKind {
    NetReach,
    AppHttpHealthy,
    NetDns,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [Self::NetReach, Self::AppHttpHealthy, Self::NetDns];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetReach => "NetReach",
            Self::AppHttpHealthy => "AppHttpHealthy",
            Self::NetDns => "NetDns",
        }
    }

    /// 用于资源名称
    pub fn lowercase(&self) -> &'static str {
        match self {
            Self::NetReach => "netreach",
            Self::AppHttpHealthy => "apphttphealthy",
            Self::NetDns => "netdns",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProbeError::Validation(format!("未知的任务类型: {s}")))
    }
}

/// 任务运行时名称，同时作为运行时唯一标签的值
pub fn runtime_name(kind: TaskKind, task_name: &str) -> String {
    format!("{RUNTIME_NAME_PREFIX}-{}-{}", kind.lowercase(), task_name)
}

/// 所有任务 CRD 实现的统一能力接口
pub trait ProbeTask:
    Resource<DynamicType = ()>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: TaskKind;

    fn plan(&self) -> &SchedulePlan;

    fn agent_spec(&self) -> AgentSpec;

    fn task_status(&self) -> Option<&TaskStatus>;

    fn set_task_status(&mut self, status: TaskStatus);

    fn into_object(self) -> TaskObject;

    fn unique_runtime_key(&self) -> String {
        runtime_name(Self::KIND, &self.name_any())
    }
}
