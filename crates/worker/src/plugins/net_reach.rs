use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fleetprobe_core::crd::TaskObject;
use fleetprobe_core::traits::{PluginOutcome, ProbePlugin};
use fleetprobe_core::{ProbeError, ProbeResult, TaskKind};

use super::{evaluate, probe_targets};

/// TCP 建连探测
pub struct TcpPlugin;

#[async_trait]
impl ProbePlugin for TcpPlugin {
    fn kind(&self) -> TaskKind {
        TaskKind::NetReach
    }

    async fn execute(
        &self,
        task: &TaskObject,
        cancel: CancellationToken,
    ) -> ProbeResult<PluginOutcome> {
        let TaskObject::NetReach(task) = task else {
            return Err(ProbeError::PluginExecution(format!(
                "NetReach 插件收到了 {} 任务",
                task.kind()
            )));
        };
        let spec = &task.spec;
        debug!("TCP 探测 {} 个目标", spec.target.endpoints.len());

        let results = probe_targets(
            &spec.target.endpoints,
            &spec.request,
            &cancel,
            |endpoint| async move {
                TcpStream::connect(endpoint.as_str())
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            },
        )
        .await;
        Ok(evaluate(results, &spec.success_condition))
    }
}
