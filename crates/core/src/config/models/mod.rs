pub mod app_config;
pub mod controller_agent;
pub mod observability;
pub mod tracker;

pub use app_config::{AppConfig, ENV_PREFIX};
pub use controller_agent::{AgentConfig, ControllerConfig};
pub use observability::ObservabilityConfig;
pub use tracker::TrackerConfig;
