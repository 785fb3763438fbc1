use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::DeleteParams;
use kube::Api;

use fleetprobe_core::traits::RuntimeAdapter;
use fleetprobe_core::ProbeResult;

use super::tolerate_gone;

pub struct DeploymentAdapter {
    api: Api<Deployment>,
    name: String,
}

impl DeploymentAdapter {
    pub fn new(api: Api<Deployment>, name: impl Into<String>) -> Self {
        Self {
            api,
            name: name.into(),
        }
    }
}

/// 期望副本数与就绪副本数一致
pub fn deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    desired == ready
}

#[async_trait]
impl RuntimeAdapter for DeploymentAdapter {
    async fn is_ready(&self) -> ProbeResult<bool> {
        Ok(self
            .api
            .get_opt(&self.name)
            .await?
            .is_some_and(|d| deployment_ready(&d)))
    }

    async fn delete(&self) -> ProbeResult<()> {
        tolerate_gone(self.api.delete(&self.name, &DeleteParams::background()).await)
    }
}
