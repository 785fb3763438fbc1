//! 内置探测插件
//!
//! 插件只做轻量探测，每个目标按 `request.attempts` 发起请求，
//! 成功请求占比达到 `successCondition.successRate` 即视为满足成功条件。

mod app_http;
mod net_dns;
mod net_reach;

pub use app_http::HttpPlugin;
pub use net_dns::DnsPlugin;
pub use net_reach::TcpPlugin;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use fleetprobe_core::crd::{ProbeRequest, SuccessCondition};
use fleetprobe_core::traits::{PluginOutcome, ProbePlugin};
use fleetprobe_core::TaskKind;

/// 按任务类型查找插件，启动时构造后以引用传递
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<TaskKind, Arc<dyn ProbePlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TcpPlugin));
        registry.register(Arc::new(HttpPlugin::new()));
        registry.register(Arc::new(DnsPlugin));
        registry
    }

    /// 同类型插件后注册的覆盖先注册的
    pub fn register(&mut self, plugin: Arc<dyn ProbePlugin>) {
        self.plugins.insert(plugin.kind(), plugin);
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn ProbePlugin>> {
        self.plugins.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<_> = self.plugins.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

/// 单个目标的探测结果
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    pub target: String,
    pub requests: u32,
    pub succeeded: u32,
    pub mean_latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// 并发探测所有目标，取消后剩余请求记为失败
pub(crate) async fn probe_targets<F, Fut>(
    targets: &[String],
    request: &ProbeRequest,
    cancel: &CancellationToken,
    probe: F,
) -> Vec<TargetResult>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let per_request = Duration::from_millis(request.per_request_timeout_ms.max(1));
    let attempts = request.attempts.max(1);

    let runs = targets.iter().map(|target| {
        let probe = &probe;
        async move {
            let mut result = TargetResult {
                target: target.clone(),
                requests: attempts,
                succeeded: 0,
                mean_latency_ms: 0.0,
                last_error: None,
            };
            let mut total_latency = 0.0;
            for _ in 0..attempts {
                if cancel.is_cancelled() {
                    result.last_error = Some("cancelled".to_string());
                    break;
                }
                let started = Instant::now();
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => Err("cancelled".to_string()),
                    r = tokio::time::timeout(per_request, probe(target.clone())) => {
                        r.unwrap_or_else(|_| Err(format!("timeout after {per_request:?}")))
                    }
                };
                match outcome {
                    Ok(()) => {
                        result.succeeded += 1;
                        total_latency += started.elapsed().as_secs_f64() * 1000.0;
                    }
                    Err(e) => result.last_error = Some(e),
                }
            }
            if result.succeeded > 0 {
                result.mean_latency_ms = total_latency / f64::from(result.succeeded);
            }
            result
        }
    });

    futures::future::join_all(runs).await
}

pub(crate) fn evaluate(results: Vec<TargetResult>, condition: &SuccessCondition) -> PluginOutcome {
    let requests: u32 = results.iter().map(|r| r.requests).sum();
    let succeeded: u32 = results.iter().map(|r| r.succeeded).sum();
    let rate = if requests == 0 {
        0.0
    } else {
        f64::from(succeeded) / f64::from(requests)
    };
    let detail = serde_json::json!({
        "requests": requests,
        "succeeded": succeeded,
        "successRate": rate,
        "targets": results,
    });

    if requests == 0 {
        PluginOutcome::failure("no probe target configured", detail)
    } else if rate + f64::EPSILON >= condition.success_rate {
        PluginOutcome::success(detail)
    } else {
        PluginOutcome::failure(
            format!(
                "success rate {:.3} is lower than required {:.3}",
                rate, condition.success_rate
            ),
            detail,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request(attempts: u32) -> ProbeRequest {
        ProbeRequest {
            per_request_timeout_ms: 200,
            attempts,
        }
    }

    #[tokio::test]
    async fn test_probe_targets_counts_attempts() {
        let calls = AtomicU32::new(0);
        let targets = vec!["a".to_string(), "b".to_string()];
        let results = probe_targets(&targets, &request(3), &CancellationToken::new(), |t| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if t == "a" {
                    Ok(())
                } else {
                    Err("refused".to_string())
                }
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(results[0].succeeded, 3);
        assert_eq!(results[1].succeeded, 0);
        assert_eq!(results[1].last_error.as_deref(), Some("refused"));

        let outcome = evaluate(results.clone(), &SuccessCondition { success_rate: 0.5 });
        assert!(outcome.failure_reason.is_none());
        let outcome = evaluate(results, &SuccessCondition::default());
        assert!(outcome.failure_reason.is_some());
    }

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let targets = vec!["slow".to_string()];
        let results = probe_targets(&targets, &request(1), &CancellationToken::new(), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(results[0].succeeded, 0);
        assert!(results[0].last_error.as_deref().unwrap().starts_with("timeout"));
    }

    #[tokio::test]
    async fn test_cancelled_probe_stops_early() {
        let token = CancellationToken::new();
        token.cancel();
        let targets = vec!["x".to_string()];
        let results = probe_targets(&targets, &request(5), &token, |_| async { Ok(()) }).await;
        assert_eq!(results[0].succeeded, 0);
        assert_eq!(results[0].last_error.as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_empty_targets_fail() {
        let outcome = evaluate(vec![], &SuccessCondition::default());
        assert_eq!(outcome.failure_reason.as_deref(), Some("no probe target configured"));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = PluginRegistry::with_builtin();
        assert_eq!(
            registry.kinds(),
            vec![TaskKind::NetReach, TaskKind::AppHttpHealthy, TaskKind::NetDns]
        );
        assert!(registry.get(TaskKind::NetDns).is_some());
        assert!(PluginRegistry::new().get(TaskKind::NetDns).is_none());
    }
}
