use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, ObjectFieldSelector, PodSpec,
    PodTemplateSpec, Probe, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use fleetprobe_core::config::ControllerConfig;
use fleetprobe_core::constants::{
    AGENT_HEALTH_PORT, MANAGED_BY_LABEL, RUNTIME_LABEL_KEY, TASK_KIND_LABEL_KEY,
    TASK_NAME_LABEL_KEY,
};
use fleetprobe_core::models::{RuntimeKind, RuntimeStatus, TaskResource};
use fleetprobe_core::traits::{runtime_name, RuntimeCreator};
use fleetprobe_core::{AgentSpec, ProbeResult, TaskKind};

const AGENT_CONTAINER_NAME: &str = "agent";
const AGENT_SERVICE_ACCOUNT: &str = "fleetprobe-agent";

/// 为任务创建 agent 工作负载与 Service
pub struct KubeRuntimeCreator {
    client: Client,
    config: ControllerConfig,
}

impl KubeRuntimeCreator {
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self { client, config }
    }

    fn labels(kind: TaskKind, task_name: &str, runtime: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (RUNTIME_LABEL_KEY.to_string(), runtime.to_string()),
            (TASK_KIND_LABEL_KEY.to_string(), kind.lowercase().to_string()),
            (TASK_NAME_LABEL_KEY.to_string(), task_name.to_string()),
            (MANAGED_BY_LABEL.0.to_string(), MANAGED_BY_LABEL.1.to_string()),
        ])
    }

    fn selector(runtime: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(RUNTIME_LABEL_KEY.to_string(), runtime.to_string())])
    }

    fn metadata(&self, name: String, labels: &BTreeMap<String, String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.config.agent_namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        }
    }

    fn pod_template(
        &self,
        kind: TaskKind,
        task_name: &str,
        labels: &BTreeMap<String, String>,
        agent_spec: &AgentSpec,
    ) -> PodTemplateSpec {
        let env = vec![
            env_value("FLEETPROBE__AGENT__TASK_KIND", kind.as_str()),
            env_value("FLEETPROBE__AGENT__TASK_NAME", task_name),
            env_field("FLEETPROBE__AGENT__NODE_NAME", "spec.nodeName"),
            env_field("FLEETPROBE__AGENT__POD_NAME", "metadata.name"),
            env_value(
                "FLEETPROBE__OBSERVABILITY__HEALTH_BIND_ADDRESS",
                &format!("0.0.0.0:{AGENT_HEALTH_PORT}"),
            ),
        ];

        let container = Container {
            name: AGENT_CONTAINER_NAME.to_string(),
            image: Some(self.config.agent_image.clone()),
            args: Some(vec!["--mode".to_string(), "agent".to_string()]),
            env: Some(env),
            ports: Some(vec![ContainerPort {
                name: Some("health".to_string()),
                container_port: i32::from(AGENT_HEALTH_PORT),
                ..Default::default()
            }]),
            readiness_probe: Some(Probe {
                http_get: Some(HTTPGetAction {
                    path: Some("/readyz".to_string()),
                    port: IntOrString::Int(i32::from(AGENT_HEALTH_PORT)),
                    ..Default::default()
                }),
                period_seconds: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };

        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels.clone()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![container],
                service_account_name: Some(AGENT_SERVICE_ACCOUNT.to_string()),
                host_network: Some(agent_spec.host_network),
                dns_policy: agent_spec
                    .host_network
                    .then(|| "ClusterFirstWithHostNet".to_string()),
                termination_grace_period_seconds: Some(10),
                ..Default::default()
            }),
        }
    }

    async fn create_workload(
        &self,
        kind: TaskKind,
        task_name: &str,
        runtime: &str,
        agent_spec: &AgentSpec,
    ) -> ProbeResult<Option<OwnerReference>> {
        let labels = Self::labels(kind, task_name, runtime);
        let selector = LabelSelector {
            match_labels: Some(Self::selector(runtime)),
            ..Default::default()
        };
        let template = self.pod_template(kind, task_name, &labels, agent_spec);

        match agent_spec.kind {
            RuntimeKind::Deployment => {
                let deployment = Deployment {
                    metadata: self.metadata(runtime.to_string(), &labels),
                    spec: Some(DeploymentSpec {
                        replicas: Some(agent_spec.replicas()),
                        selector,
                        template,
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                let api: Api<Deployment> =
                    Api::namespaced(self.client.clone(), &self.config.agent_namespace);
                Ok(create_or_get(&api, &deployment).await?.controller_owner_ref(&()))
            }
            RuntimeKind::DaemonSet => {
                let daemonset = DaemonSet {
                    metadata: self.metadata(runtime.to_string(), &labels),
                    spec: Some(DaemonSetSpec {
                        selector,
                        template,
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                let api: Api<DaemonSet> =
                    Api::namespaced(self.client.clone(), &self.config.agent_namespace);
                Ok(create_or_get(&api, &daemonset).await?.controller_owner_ref(&()))
            }
        }
    }

    /// Service 归属于工作负载，随工作负载一起被回收
    async fn create_service(
        &self,
        name: String,
        family: &str,
        labels: &BTreeMap<String, String>,
        runtime: &str,
        owner: Option<OwnerReference>,
    ) -> ProbeResult<String> {
        let mut metadata = self.metadata(name.clone(), labels);
        metadata.owner_references = owner.map(|o| vec![o]);

        let service = Service {
            metadata,
            spec: Some(ServiceSpec {
                selector: Some(Self::selector(runtime)),
                ports: Some(vec![ServicePort {
                    name: Some("health".to_string()),
                    port: 80,
                    target_port: Some(IntOrString::Int(i32::from(AGENT_HEALTH_PORT))),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                ip_families: Some(vec![family.to_string()]),
                ip_family_policy: Some("SingleStack".to_string()),
                type_: Some("ClusterIP".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let api: Api<Service> = Api::namespaced(self.client.clone(), &self.config.agent_namespace);
        create_or_get(&api, &service).await?;
        Ok(name)
    }
}

#[async_trait]
impl RuntimeCreator for KubeRuntimeCreator {
    async fn create_task_runtime_if_not_exist(
        &self,
        kind: TaskKind,
        task_name: &str,
        agent_spec: &AgentSpec,
    ) -> ProbeResult<TaskResource> {
        let runtime = runtime_name(kind, task_name);
        let labels = Self::labels(kind, task_name, &runtime);
        let owner = self.create_workload(kind, task_name, &runtime, agent_spec).await?;

        let service_name_v4 = if self.config.enable_ipv4 {
            Some(
                self.create_service(
                    format!("{runtime}-ipv4"),
                    "IPv4",
                    &labels,
                    &runtime,
                    owner.clone(),
                )
                .await?,
            )
        } else {
            None
        };
        let service_name_v6 = if self.config.enable_ipv6 {
            Some(
                self.create_service(
                    format!("{runtime}-ipv6"),
                    "IPv6",
                    &labels,
                    &runtime,
                    owner,
                )
                .await?,
            )
        } else {
            None
        };

        info!("任务 {}/{} 的运行时 {} {} 已提交", kind, task_name, agent_spec.kind, runtime);
        Ok(TaskResource {
            runtime_type: agent_spec.kind,
            runtime_name: runtime,
            runtime_status: RuntimeStatus::Creating,
            service_name_v4,
            service_name_v6,
        })
    }
}

/// 已存在则复用
async fn create_or_get<K>(api: &Api<K>, obj: &K) -> ProbeResult<K>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    match api.create(&PostParams::default(), obj).await {
        Ok(created) => Ok(created),
        Err(kube::Error::Api(resp)) if resp.code == 409 => {
            debug!("{} 已存在，复用", obj.name_any());
            Ok(api.get(&obj.name_any()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

fn env_value(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn env_field(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
