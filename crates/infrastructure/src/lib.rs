pub mod file_manager;
pub mod kube_client;
pub mod metrics_collector;
pub mod report_manager;
pub mod resource_monitor;
pub mod runtime;
pub mod tracker;

pub use file_manager::{FileCleanupService, LocalFileManager};
pub use kube_client::KubeApiClient;
pub use metrics_collector::{init_metrics, MetricsCollector};
pub use report_manager::{parse_round_key, ChannelReportManager, ReportCollector, RoundRollup};
pub use resource_monitor::{ResourceSampler, SamplerHandle};
pub use runtime::{KubeRuntimeCreator, KubeRuntimeResolver};
pub use tracker::{CacheDb, Item, ResourceTracker};
