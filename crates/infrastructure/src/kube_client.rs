use std::collections::BTreeSet;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use fleetprobe_core::constants::{FIELD_MANAGER, RUNTIME_LABEL_KEY};
use fleetprobe_core::crd::{AppHttpHealthy, NetDns, NetReach};
use fleetprobe_core::models::TaskStatus;
use fleetprobe_core::traits::{KubeClient, TaskStatusSnapshot};
use fleetprobe_core::{ProbeError, ProbeResult, ProbeTask, TaskKind};

/// 基于 kube-rs 的实现，任务 CRD 为集群级资源，agent pod 位于固定命名空间
#[derive(Clone)]
pub struct KubeApiClient {
    client: Client,
    agent_namespace: String,
}

impl KubeApiClient {
    pub fn new(client: Client, agent_namespace: impl Into<String>) -> Self {
        Self {
            client,
            agent_namespace: agent_namespace.into(),
        }
    }

    async fn get_status<K: ProbeTask>(
        &self,
        name: &str,
    ) -> ProbeResult<Option<TaskStatusSnapshot>> {
        let api: Api<K> = Api::all(self.client.clone());
        let snapshot = api.get_opt(name).await?.map(|obj| TaskStatusSnapshot {
            resource_version: obj.resource_version(),
            status: obj.task_status().cloned(),
        });
        Ok(snapshot)
    }

    async fn patch_status<K: ProbeTask>(
        &self,
        name: &str,
        resource_version: Option<&str>,
        status: &TaskStatus,
    ) -> ProbeResult<()> {
        let api: Api<K> = Api::all(self.client.clone());
        let patch = match resource_version {
            Some(rv) => json!({ "metadata": { "resourceVersion": rv }, "status": status }),
            None => json!({ "status": status }),
        };
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| match e {
                kube::Error::Api(resp) if resp.code == 409 => {
                    ProbeError::Conflict(format!("{}/{}: {}", K::KIND, name, resp.message))
                }
                kube::Error::Api(resp) if resp.code == 404 => ProbeError::TaskNotFound {
                    kind: K::KIND.to_string(),
                    name: name.to_string(),
                },
                e => ProbeError::Kube(e),
            })?;
        debug!("已更新任务 {}/{} 状态", K::KIND, name);
        Ok(())
    }
}

#[async_trait]
impl KubeClient for KubeApiClient {
    async fn get_task_status(
        &self,
        kind: TaskKind,
        name: &str,
    ) -> ProbeResult<Option<TaskStatusSnapshot>> {
        match kind {
            TaskKind::NetReach => self.get_status::<NetReach>(name).await,
            TaskKind::AppHttpHealthy => self.get_status::<AppHttpHealthy>(name).await,
            TaskKind::NetDns => self.get_status::<NetDns>(name).await,
        }
    }

    async fn update_task_status(
        &self,
        kind: TaskKind,
        name: &str,
        resource_version: Option<&str>,
        status: &TaskStatus,
    ) -> ProbeResult<()> {
        match kind {
            TaskKind::NetReach => {
                self.patch_status::<NetReach>(name, resource_version, status)
                    .await
            }
            TaskKind::AppHttpHealthy => {
                self.patch_status::<AppHttpHealthy>(name, resource_version, status)
                    .await
            }
            TaskKind::NetDns => {
                self.patch_status::<NetDns>(name, resource_version, status)
                    .await
            }
        }
    }

    async fn list_agent_nodes(&self, runtime_name: &str) -> ProbeResult<BTreeSet<String>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.agent_namespace);
        let params = ListParams::default().labels(&format!("{RUNTIME_LABEL_KEY}={runtime_name}"));
        let nodes = pods
            .list(&params)
            .await?
            .items
            .into_iter()
            .filter(|pod| pod.metadata.deletion_timestamp.is_none())
            .filter(|pod| {
                pod.status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .is_some_and(|phase| phase == "Running")
            })
            .filter_map(|pod| pod.spec.and_then(|spec| spec.node_name))
            .collect();
        Ok(nodes)
    }
}
