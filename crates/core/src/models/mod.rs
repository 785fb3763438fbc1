pub mod plan;
pub mod report;
pub mod status;

pub use plan::{ScheduleForm, SchedulePlan, MAX_PLAN_MINUTES, UNLIMITED_ROUNDS};
pub use report::{AgentReport, ResourceUsage, SummaryReport};
pub use status::{
    format_duration, round_key, RoundStatus, RuntimeKind, RuntimeStatus, StatusHistoryRecord,
    TaskResource, TaskStatus, FAILURE_SOME_AGENTS_FAILED, FAILURE_SOME_AGENTS_NOT_REPORTED,
};
