use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{AgentSpec, ProbeRequest, SuccessCondition, TaskObject};
use crate::models::{SchedulePlan, TaskStatus};
use crate::traits::{ProbeTask, TaskKind};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "fleetprobe.io",
    version = "v1beta1",
    kind = "NetDns",
    plural = "netdnses",
    status = "TaskStatus",
    printcolumn = r#"{"name":"Finish","type":"boolean","jsonPath":".status.finish"}"#,
    printcolumn = r#"{"name":"Done","type":"integer","jsonPath":".status.doneRound"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetDnsSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_spec: Option<AgentSpec>,

    #[serde(default)]
    pub schedule: SchedulePlan,

    pub target: DnsTarget,

    #[serde(default)]
    pub request: ProbeRequest,

    #[serde(default)]
    pub success_condition: SuccessCondition,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DnsTarget {
    pub domains: Vec<String>,
}

impl ProbeTask for NetDns {
    const KIND: TaskKind = TaskKind::NetDns;

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
        TaskObject::NetDns(self)
    }
}
