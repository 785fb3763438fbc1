//! 全局常量

/// CRD 分组
pub const API_GROUP: &str = "fleetprobe.io";

/// 运行时唯一标签，值为运行时名称，controller 据此找到本任务的所有 agent pod
pub const RUNTIME_LABEL_KEY: &str = "fleetprobe.io/runtime";
pub const TASK_KIND_LABEL_KEY: &str = "fleetprobe.io/task-kind";
pub const TASK_NAME_LABEL_KEY: &str = "fleetprobe.io/task-name";

pub const MANAGED_BY_LABEL: (&str, &str) = ("app.kubernetes.io/managed-by", "fleetprobe");

/// 运行时名称前缀
pub const RUNTIME_NAME_PREFIX: &str = "fleetprobe";

/// 报告写入后的额外保留时间（分钟），留给异步收集
pub const REPORT_EXPIRY_GRACE_MINUTES: i64 = 5;

/// 汇总报告的保留时间（小时）
pub const SUMMARY_REPORT_RETENTION_HOURS: i64 = 24;

/// 汇总报告使用的节点名
pub const SUMMARY_NODE_NAME: &str = "summary";

/// agent 健康检查端口
pub const AGENT_HEALTH_PORT: u16 = 5710;

/// Deployment 形态下默认副本数
pub const DEFAULT_DEPLOYMENT_REPLICAS: i32 = 2;

/// 字段管理者名称
pub const FIELD_MANAGER: &str = "fleetprobe-controller";
