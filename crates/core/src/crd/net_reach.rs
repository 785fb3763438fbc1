use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{AgentSpec, ProbeRequest, SuccessCondition, TaskObject};
use crate::models::{SchedulePlan, TaskStatus};
use crate::traits::{ProbeTask, TaskKind};

/// 节点到目标端点的 TCP 连通性探测
///
/// ```yaml
/// apiVersion: fleetprobe.io/v1beta1
/// kind: NetReach
/// metadata:
///   name: reach-apiserver
/// spec:
///   schedule:
///     schedule: "0 10"
///     roundTimeoutMinute: 5
///     roundNumber: 3
///   target:
///     endpoints: ["kubernetes.default.svc:443"]
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "fleetprobe.io",
    version = "v1beta1",
    kind = "NetReach",
    plural = "netreaches",
    status = "TaskStatus",
    printcolumn = r#"{"name":"Finish","type":"boolean","jsonPath":".status.finish"}"#,
    printcolumn = r#"{"name":"Expected","type":"integer","jsonPath":".status.expectedRound"}"#,
    printcolumn = r#"{"name":"Done","type":"integer","jsonPath":".status.doneRound"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetReachSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_spec: Option<AgentSpec>,

    #[serde(default)]
    pub schedule: SchedulePlan,

    pub target: NetReachTarget,

    #[serde(default)]
    pub request: ProbeRequest,

    #[serde(default)]
    pub success_condition: SuccessCondition,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetReachTarget {
    /// `host:port`
    pub endpoints: Vec<String>,
}

impl ProbeTask for NetReach {
    const KIND: TaskKind = TaskKind::NetReach;

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
        TaskObject::NetReach(self)
    }
}
