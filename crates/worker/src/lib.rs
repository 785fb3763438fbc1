//! agent 侧：轮次去重、单轮执行与内置探测插件

pub mod agent;
pub mod execution;
pub mod plugins;
pub mod round_registry;

pub use agent::{
    error_policy, reconcile, run_agent, AgentAction, AgentIdentity, AgentRoundExecutor,
};
pub use execution::{
    RoundContext, RoundExecutor, RoundOutcome, RoundTaskHandle, FAILURE_ROUND_TIMEOUT,
};
pub use plugins::{DnsPlugin, HttpPlugin, PluginRegistry, TcpPlugin};
pub use round_registry::{LocalRoundStatus, RoundRegistry};
