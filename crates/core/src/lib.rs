//! fleetprobe 核心库：领域模型、任务 CRD、协作者接口、配置与日志。

pub mod config;
pub mod constants;
pub mod crd;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use crd::{AgentSpec, TaskObject};
pub use errors::{ProbeError, ProbeResult};
pub use logging::{init_logging, StructuredLogger};
pub use models::UNLIMITED_ROUNDS;
pub use traits::{ProbeTask, TaskKind};
