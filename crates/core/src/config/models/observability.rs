use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// json 或 pretty
    pub log_format: String,
    pub health_bind_address: String,
    /// 未设置时不启动 Prometheus 导出
    pub metrics_bind_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            health_bind_address: "0.0.0.0:5710".to_string(),
            metrics_bind_address: None,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                valid_levels
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!("不支持的日志格式: {}", self.log_format));
        }

        self.health_bind_address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| anyhow::anyhow!("健康检查地址无效 {}: {e}", self.health_bind_address))?;

        if let Some(addr) = &self.metrics_bind_address {
            addr.parse::<std::net::SocketAddr>()
                .map_err(|e| anyhow::anyhow!("指标地址无效 {addr}: {e}"))?;
        }
        Ok(())
    }
}
