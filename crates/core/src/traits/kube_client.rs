use std::collections::BTreeSet;

use async_trait::async_trait;

use super::TaskKind;
use crate::models::TaskStatus;
use crate::ProbeResult;

/// 读取到的任务状态与其资源版本
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStatusSnapshot {
    pub resource_version: Option<String>,
    pub status: Option<TaskStatus>,
}

/// 调度核心使用的 Kubernetes API 子集
///
/// 状态写入采用乐观并发：`resource_version` 与服务端不一致时返回
/// [`ProbeError::Conflict`](crate::ProbeError::Conflict)，调用方重新入队并基于最新状态重放。
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// 任务不存在时返回 `None`
    async fn get_task_status(
        &self,
        kind: TaskKind,
        name: &str,
    ) -> ProbeResult<Option<TaskStatusSnapshot>>;

    async fn update_task_status(
        &self,
        kind: TaskKind,
        name: &str,
        resource_version: Option<&str>,
        status: &TaskStatus,
    ) -> ProbeResult<()>;

    /// 带有该运行时标签、处于 Running 且未在删除中的 agent pod 所在节点
    async fn list_agent_nodes(&self, runtime_name: &str) -> ProbeResult<BTreeSet<String>>;
}
