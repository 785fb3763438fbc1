//! 指标采集
//!
//! 指标通过 `metrics` 门面记录，未安装导出器时调用是空操作。

use std::net::SocketAddr;

use anyhow::Result;
use metrics::{counter, histogram};
use tracing::info;

use fleetprobe_core::models::RoundStatus;
use fleetprobe_core::TaskKind;

pub struct MetricsCollector;

impl MetricsCollector {
    pub fn record_round_finalized(kind: TaskKind, status: RoundStatus) {
        counter!(
            "fleetprobe_rounds_finalized_total",
            "kind" => kind.as_str(),
            "status" => status.to_string()
        )
        .increment(1);
    }

    pub fn record_agent_round(kind: TaskKind, succeed: bool, duration_seconds: f64) {
        let outcome = if succeed { "succeed" } else { "fail" };
        counter!(
            "fleetprobe_agent_rounds_total",
            "kind" => kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("fleetprobe_agent_round_duration_seconds", "kind" => kind.as_str())
            .record(duration_seconds);
    }

    pub fn record_tracker_signal_dropped() {
        counter!("fleetprobe_tracker_signals_dropped_total").increment(1);
    }

    pub fn record_runtime_ready() {
        counter!("fleetprobe_runtimes_ready_total").increment(1);
    }

    pub fn record_runtime_deleted() {
        counter!("fleetprobe_runtimes_deleted_total").increment(1);
    }
}

/// 安装 Prometheus 导出器，需在 tokio 运行时内调用
pub fn init_metrics(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| anyhow::anyhow!("指标地址无效 {bind_address}: {e}"))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    info!("Prometheus 指标导出已启动: {}", addr);
    Ok(())
}
