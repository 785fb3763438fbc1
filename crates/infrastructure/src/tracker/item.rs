use chrono::{DateTime, Utc};

use fleetprobe_core::models::{RuntimeStatus, TaskResource};
use fleetprobe_core::traits::{RuntimeKey, TaskKind};

/// 追踪器中的一条运行时记录，一个运行时只属于一个任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: RuntimeKey,
    pub runtime_status: RuntimeStatus,
    /// 到达该时间后删除运行时
    pub deletion_time: Option<DateTime<Utc>>,
    pub service_name_v4: Option<String>,
    pub service_name_v6: Option<String>,
    pub task_kind: TaskKind,
    pub task_name: String,
}

impl Item {
    pub fn from_resource(
        task_kind: TaskKind,
        task_name: &str,
        resource: &TaskResource,
        deletion_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            key: RuntimeKey::new(resource.runtime_type, resource.runtime_name.clone()),
            runtime_status: resource.runtime_status,
            deletion_time,
            service_name_v4: resource.service_name_v4.clone(),
            service_name_v6: resource.service_name_v6.clone(),
            task_kind,
            task_name: task_name.to_string(),
        }
    }

    pub fn to_resource(&self, runtime_status: RuntimeStatus) -> TaskResource {
        TaskResource {
            runtime_type: self.key.kind,
            runtime_name: self.key.name.clone(),
            runtime_status,
            service_name_v4: self.service_name_v4.clone(),
            service_name_v6: self.service_name_v6.clone(),
        }
    }

    pub fn deletion_due(&self, now: DateTime<Utc>) -> bool {
        self.deletion_time.is_some_and(|t| now > t)
    }
}
