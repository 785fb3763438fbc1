//! 运行时适配与创建

mod creator;
mod daemonset;
mod deployment;

pub use creator::KubeRuntimeCreator;
pub use daemonset::{daemonset_ready, DaemonSetAdapter};
pub use deployment::{deployment_ready, DeploymentAdapter};

use std::sync::Arc;

use kube::{Api, Client};

use fleetprobe_core::models::RuntimeKind;
use fleetprobe_core::traits::{RuntimeAdapter, RuntimeKey, RuntimeResolver};
use fleetprobe_core::ProbeResult;

/// 资源不存在或正在删除都视为删除成功
fn tolerate_gone<T>(result: Result<T, kube::Error>) -> ProbeResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 404 || resp.code == 409 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub struct KubeRuntimeResolver {
    client: Client,
    namespace: String,
}

impl KubeRuntimeResolver {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

impl RuntimeResolver for KubeRuntimeResolver {
    fn resolve(&self, key: &RuntimeKey) -> Arc<dyn RuntimeAdapter> {
        match key.kind {
            RuntimeKind::Deployment => Arc::new(DeploymentAdapter::new(
                Api::namespaced(self.client.clone(), &self.namespace),
                key.name.clone(),
            )),
            RuntimeKind::DaemonSet => Arc::new(DaemonSetAdapter::new(
                Api::namespaced(self.client.clone(), &self.namespace),
                key.name.clone(),
            )),
        }
    }
}
