//! controller 侧：轮次时钟、轮次状态机与任务 reconcile

pub mod controller;
pub mod cron_utils;
pub mod scheduler;
pub mod summary;

pub use controller::{error_policy, reconcile, run_controller, TaskReconciler};
pub use cron_utils::{CronScheduler, ScheduleClock};
pub use scheduler::{RoundAction, RoundDecision, RoundScheduler};
pub use summary::SummaryReporter;
