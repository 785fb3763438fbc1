use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::api::DeleteParams;
use kube::Api;

use fleetprobe_core::traits::RuntimeAdapter;
use fleetprobe_core::ProbeResult;

use super::tolerate_gone;

pub struct DaemonSetAdapter {
    api: Api<DaemonSet>,
    name: String,
}

impl DaemonSetAdapter {
    pub fn new(api: Api<DaemonSet>, name: impl Into<String>) -> Self {
        Self {
            api,
            name: name.into(),
        }
    }
}

/// 期望调度数与就绪数一致
pub fn daemonset_ready(daemonset: &DaemonSet) -> bool {
    daemonset
        .status
        .as_ref()
        .is_some_and(|s| s.desired_number_scheduled == s.number_ready)
}

#[async_trait]
impl RuntimeAdapter for DaemonSetAdapter {
    async fn is_ready(&self) -> ProbeResult<bool> {
        Ok(self
            .api
            .get_opt(&self.name)
            .await?
            .is_some_and(|d| daemonset_ready(&d)))
    }

    async fn delete(&self) -> ProbeResult<()> {
        tolerate_gone(self.api.delete(&self.name, &DeleteParams::background()).await)
    }
}
