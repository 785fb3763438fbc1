//! 配置管理
//!
//! 默认值 < TOML 文件 < `FLEETPROBE__` 前缀的环境变量。

pub mod models;


pub use models::{
    AgentConfig, AppConfig, ControllerConfig, ObservabilityConfig, TrackerConfig, ENV_PREFIX,
};
