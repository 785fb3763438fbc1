//! 探测插件接口
//!
//! 插件是 agent 上真正发起探测的组件，每种任务类型对应一个插件：
//! - NetReach：TCP 连通性
//! - AppHttpHealthy：HTTP 健康检查
//! - NetDns：DNS 解析
//!
//! 插件返回值区分两类失败：
//! - `Err(..)`：基础设施故障，例如目标配置无法解析
//! - `Ok(PluginOutcome { failure_reason: Some(..), .. })`：探测完成但未达到成功条件
//!
//! 两者在轮次层面都记为失败，但失败原因文本会保留在报告里。
//!
//! 插件必须响应取消令牌：轮次超时后令牌被取消，插件应尽快返回。

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::TaskKind;
use crate::crd::TaskObject;
use crate::ProbeResult;

/// 插件一次执行的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginOutcome {
    /// 未满足成功条件时的原因
    pub failure_reason: Option<String>,
    /// 写入报告的插件明细
    pub detail: serde_json::Value,
}

impl PluginOutcome {
    pub fn success(detail: serde_json::Value) -> Self {
        Self {
            failure_reason: None,
            detail,
        }
    }

    pub fn failure(reason: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            detail,
        }
    }
}

#[async_trait]
pub trait ProbePlugin: Send + Sync {
    fn kind(&self) -> TaskKind;

    async fn execute(
        &self,
        task: &TaskObject,
        cancel: CancellationToken,
    ) -> ProbeResult<PluginOutcome>;
}
