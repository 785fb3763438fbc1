pub mod file_manager;
pub mod kube_client;
pub mod plugin;
pub mod report_manager;
pub mod runtime;
pub mod task;

pub use file_manager::{FileManager, TaskFile};
pub use kube_client::{KubeClient, TaskStatusSnapshot};
pub use plugin::{PluginOutcome, ProbePlugin};
pub use report_manager::ReportManager;
pub use runtime::{RuntimeAdapter, RuntimeCreator, RuntimeKey, RuntimeResolver};
pub use task::{runtime_name, ProbeTask, TaskKind};
