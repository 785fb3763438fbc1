use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{AgentSpec, ProbeRequest, SuccessCondition, TaskObject};
use crate::models::{SchedulePlan, TaskStatus};
use crate::traits::{ProbeTask, TaskKind};

/// 从每个节点对应用 HTTP 接口做健康检查
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "fleetprobe.io",
    version = "v1beta1",
    kind = "AppHttpHealthy",
    plural = "apphttphealthies",
    status = "TaskStatus",
    printcolumn = r#"{"name":"Url","type":"string","jsonPath":".spec.target.url"}"#,
    printcolumn = r#"{"name":"Finish","type":"boolean","jsonPath":".status.finish"}"#,
    printcolumn = r#"{"name":"Done","type":"integer","jsonPath":".status.doneRound"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppHttpHealthySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_spec: Option<AgentSpec>,

    #[serde(default)]
    pub schedule: SchedulePlan,

    pub target: HttpTarget,

    #[serde(default)]
    pub request: ProbeRequest,

    #[serde(default)]
    pub success_condition: SuccessCondition,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_status_code() -> u16 {
    200
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpTarget {
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// 期望的响应码
    #[serde(default = "default_status_code")]
    pub status_code: u16,
}

impl ProbeTask for AppHttpHealthy {
    const KIND: TaskKind = TaskKind::AppHttpHealthy;

    fn plan(&self) -> &SchedulePlan {
        &self.spec.schedule
    }

    fn agent_spec(&self) -> AgentSpec {
        self.spec.agent_spec.clone().unwrap_or_default()
    }

    fn task_status(&self) -> Option<&TaskStatus> {
        self.status.as_ref()
    }

    fn set_task_status(&mut self, status: TaskStatus) {
        self.status = Some(status);
    }

    fn into_object(self) -> TaskObject {
        TaskObject::AppHttpHealthy(self)
    }
}
