use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::TaskKind;
use crate::crd::AgentSpec;
use crate::models::{RuntimeKind, TaskResource};
use crate::ProbeResult;

/// 运行时在追踪器中的唯一键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeKey {
    pub kind: RuntimeKind,
    pub name: String,
}

impl RuntimeKey {
    pub fn new(kind: RuntimeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for RuntimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Deployment 与 DaemonSet 的统一就绪/删除操作
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    async fn is_ready(&self) -> ProbeResult<bool>;

    /// 资源不存在或已在删除中都视为成功
    async fn delete(&self) -> ProbeResult<()>;
}

/// 按键构造适配器
pub trait RuntimeResolver: Send + Sync {
    fn resolve(&self, key: &RuntimeKey) -> Arc<dyn RuntimeAdapter>;
}

/// 任务运行时创建者
#[async_trait]
pub trait RuntimeCreator: Send + Sync {
    /// 已存在的对象会被复用，返回的资源状态总是 `Creating`
    async fn create_task_runtime_if_not_exist(
        &self,
        kind: TaskKind,
        task_name: &str,
        agent_spec: &AgentSpec,
    ) -> ProbeResult<TaskResource>;
}
