//! 资源追踪器
//!
//! 运行时的就绪与删除和轮次推进完全解耦：
//! - controller 通过 [`ResourceTracker::apply`] 声明运行时应处的状态
//! - 扫描协程每隔 `trace_gap` 把所有记录推入有界信号通道，推送超时则本轮丢弃
//! - 执行器池从通道消费记录，调用运行时适配器并把结果写回任务 CRD
//!
//! 写回失败时记录保留在缓存中，下一次扫描自然重试。

mod cache_db;
mod item;

pub use cache_db::CacheDb;
pub use item::Item;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleetprobe_core::config::TrackerConfig;
use fleetprobe_core::models::RuntimeStatus;
use fleetprobe_core::traits::{KubeClient, RuntimeResolver};
use fleetprobe_core::{ProbeError, ProbeResult, StructuredLogger};

use crate::metrics_collector::MetricsCollector;

pub struct ResourceTracker {
    db: CacheDb,
    config: TrackerConfig,
    kube_client: Arc<dyn KubeClient>,
    resolver: Arc<dyn RuntimeResolver>,
}

impl ResourceTracker {
    pub fn new(
        config: TrackerConfig,
        kube_client: Arc<dyn KubeClient>,
        resolver: Arc<dyn RuntimeResolver>,
    ) -> Self {
        Self {
            db: CacheDb::new(config.max_database_cap),
            config,
            kube_client,
            resolver,
        }
    }

    /// 与已有记录完全一致时不做任何事；缓存已满时返回容量错误
    pub async fn apply(&self, item: Item) -> ProbeResult<()> {
        self.db.apply(item).await.map(|_| ())
    }

    pub async fn list(&self) -> Vec<Item> {
        self.db.list().await
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    /// 启动扫描协程与执行器池，令牌取消后全部退出
    pub fn start(self: &Arc<Self>, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let (tx, rx) = mpsc::channel::<Item>(self.config.item_channel_buffer);
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(self.config.executor_workers + 1);

        let tracker = Arc::clone(self);
        let trace_token = token.clone();
        handles.push(tokio::spawn(async move {
            tracker.trace_loop(tx, trace_token).await;
        }));

        for worker_id in 0..self.config.executor_workers {
            let tracker = Arc::clone(self);
            let rx = Arc::clone(&rx);
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                tracker.executor_loop(worker_id, rx, token).await;
            }));
        }

        info!(
            "资源追踪器已启动: {} 个执行器, 扫描间隔 {:?}",
            self.config.executor_workers,
            self.config.trace_gap()
        );
        handles
    }

    async fn trace_loop(&self, tx: mpsc::Sender<Item>, token: CancellationToken) {
        let mut ticker = interval(self.config.trace_gap());
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    for item in self.db.list().await {
                        let key = item.key.clone();
                        match tx.send_timeout(item, self.config.signal_timeout()).await {
                            Ok(()) => {}
                            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                                warn!("运行时 {} 信号发送超时，本轮跳过", key);
                                MetricsCollector::record_tracker_signal_dropped();
                            }
                            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                                debug!("信号通道已关闭");
                                return;
                            }
                        }
                    }
                }
            }
        }
        info!("资源追踪扫描已停止");
    }

    async fn executor_loop(
        &self,
        worker_id: usize,
        rx: Arc<Mutex<mpsc::Receiver<Item>>>,
        token: CancellationToken,
    ) {
        loop {
            let item = tokio::select! {
                _ = token.cancelled() => break,
                item = async { rx.lock().await.recv().await } => item,
            };
            let Some(item) = item else { break };
            debug!("执行器 {} 处理运行时 {}", worker_id, item.key);
            self.execute_item(item).await;
        }
        debug!("执行器 {} 已停止", worker_id);
    }

    /// 处理一条记录：到期删除，或在就绪后标记为已创建
    pub async fn execute_item(&self, item: Item) {
        let adapter = self.resolver.resolve(&item.key);

        if item.deletion_due(Utc::now()) {
            if let Err(e) = adapter.delete().await {
                warn!("删除运行时 {} 失败: {}", item.key, e);
                return;
            }
            match self.update_runtime_status(&item, RuntimeStatus::Deleted).await {
                Ok(()) => {
                    self.db.delete(&item).await;
                    StructuredLogger::runtime_deleted(&item.key, &item.task_name);
                    MetricsCollector::record_runtime_deleted();
                }
                Err(e) => warn_update_failed(&item, &e),
            }
            return;
        }

        if item.runtime_status != RuntimeStatus::Creating {
            return;
        }

        match adapter.is_ready().await {
            Ok(true) => match self.update_runtime_status(&item, RuntimeStatus::Created).await {
                Ok(()) => {
                    self.db.delete(&item).await;
                    StructuredLogger::runtime_ready(&item.key, &item.task_name);
                    MetricsCollector::record_runtime_ready();
                }
                Err(e) => warn_update_failed(&item, &e),
            },
            Ok(false) => debug!("运行时 {} 尚未就绪", item.key),
            Err(e) => warn!("检查运行时 {} 就绪状态失败: {}", item.key, e),
        }
    }

    /// 读取最新状态后写回，状态已一致时跳过；任务已不存在视为成功
    async fn update_runtime_status(&self, item: &Item, target: RuntimeStatus) -> ProbeResult<()> {
        let Some(snapshot) = self
            .kube_client
            .get_task_status(item.task_kind, &item.task_name)
            .await?
        else {
            debug!("任务 {}/{} 已不存在", item.task_kind, item.task_name);
            return Ok(());
        };

        let mut status = snapshot.status.unwrap_or_default();
        match status.resource.as_mut() {
            Some(resource) if resource.runtime_status == target => return Ok(()),
            Some(resource) => resource.runtime_status = target,
            None => status.resource = Some(item.to_resource(target)),
        }

        self.kube_client
            .update_task_status(
                item.task_kind,
                &item.task_name,
                snapshot.resource_version.as_deref(),
                &status,
            )
            .await
    }
}

fn warn_update_failed(item: &Item, error: &ProbeError) {
    warn!(
        "更新任务 {}/{} 的运行时状态失败: {}",
        item.task_kind, item.task_name, error
    );
}
