use thiserror::Error;

/// 探测调度系统错误类型定义
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Kubernetes API错误: {0}")]
    Kube(#[from] kube::Error),

    #[error("任务未找到: {kind}/{name}")]
    TaskNotFound { kind: String, name: String },

    #[error("无效的调度计划: {schedule} - {message}")]
    InvalidSchedule { schedule: String, message: String },

    #[error("校验失败: {0}")]
    Validation(String),

    #[error("资源缓存已满 (out of capacity): 上限 {capacity}")]
    OutOfCapacity { capacity: usize },

    #[error("运行时 {kind}/{name} 操作失败: {message}")]
    Runtime {
        kind: String,
        name: String,
        message: String,
    },

    #[error("插件执行错误: {0}")]
    PluginExecution(String),

    #[error("状态更新冲突: {0}")]
    Conflict(String),

    #[error("文件操作错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ProbeError {
    pub fn invalid_schedule(schedule: &str, message: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            schedule: schedule.to_string(),
            message: message.into(),
        }
    }

    pub fn runtime(kind: impl ToString, name: &str, message: impl Into<String>) -> Self {
        Self::Runtime {
            kind: kind.to_string(),
            name: name.to_string(),
            message: message.into(),
        }
    }

    /// 乐观并发冲突（resourceVersion 不匹配）
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Kube(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::TaskNotFound { .. } => true,
            Self::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }
}

/// 统一的Result类型
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
