use std::str::FromStr;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fleetprobe_core::crd::{HttpTarget, TaskObject};
use fleetprobe_core::traits::{PluginOutcome, ProbePlugin};
use fleetprobe_core::{ProbeError, ProbeResult, TaskKind};

use super::{evaluate, probe_targets};

/// HTTP 健康检查，状态码与期望一致即成功
pub struct HttpPlugin {
    client: Client,
}

impl HttpPlugin {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn send(&self, target: &HttpTarget, method: &Method) -> Result<(), String> {
        let mut request = self.client.request(method.clone(), &target.url);
        for (key, value) in &target.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &target.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        if status == target.status_code {
            Ok(())
        } else {
            Err(format!("期望状态码 {}，实际 {}", target.status_code, status))
        }
    }
}

impl Default for HttpPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbePlugin for HttpPlugin {
    fn kind(&self) -> TaskKind {
        TaskKind::AppHttpHealthy
    }

    async fn execute(
        &self,
        task: &TaskObject,
        cancel: CancellationToken,
    ) -> ProbeResult<PluginOutcome> {
        let TaskObject::AppHttpHealthy(task) = task else {
            return Err(ProbeError::PluginExecution(format!(
                "AppHttpHealthy 插件收到了 {} 任务",
                task.kind()
            )));
        };
        let spec = &task.spec;
        let method = Method::from_str(&spec.target.method.to_uppercase()).map_err(|e| {
            ProbeError::PluginExecution(format!("不支持的 HTTP 方法 {}: {e}", spec.target.method))
        })?;
        debug!("HTTP {} {}", method, spec.target.url);

        let targets = [spec.target.url.clone()];
        let results = probe_targets(&targets, &spec.request, &cancel, |_| {
            let method = method.clone();
            async move { self.send(&spec.target, &method).await }
        })
        .await;
        Ok(evaluate(results, &spec.success_condition))
    }
}
