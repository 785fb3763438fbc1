use async_trait::async_trait;
use tokio::net::lookup_host;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fleetprobe_core::crd::TaskObject;
use fleetprobe_core::traits::{PluginOutcome, ProbePlugin};
use fleetprobe_core::{ProbeError, ProbeResult, TaskKind};

use super::{evaluate, probe_targets};

/// 使用系统解析器解析域名，至少得到一个地址才算成功
pub struct DnsPlugin;

async fn resolve(domain: String) -> Result<(), String> {
    let mut addrs = lookup_host((domain.as_str(), 0))
        .await
        .map_err(|e| e.to_string())?;
    match addrs.next() {
        Some(_) => Ok(()),
        None => Err(format!("{domain} 没有解析到地址")),
    }
}

#[async_trait]
impl ProbePlugin for DnsPlugin {
    fn kind(&self) -> TaskKind {
        TaskKind::NetDns
    }

    async fn execute(
        &self,
        task: &TaskObject,
        cancel: CancellationToken,
    ) -> ProbeResult<PluginOutcome> {
        let TaskObject::NetDns(task) = task else {
            return Err(ProbeError::PluginExecution(format!(
                "NetDns 插件收到了 {} 任务",
                task.kind()
            )));
        };
        let spec = &task.spec;
        debug!("DNS 解析 {} 个域名", spec.target.domains.len());

        let results = probe_targets(&spec.target.domains, &spec.request, &cancel, resolve).await;
        Ok(evaluate(results, &spec.success_condition))
    }
}
