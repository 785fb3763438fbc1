use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use fleetprobe_core::traits::{FileManager, TaskFile};
use fleetprobe_core::{ProbeResult, TaskKind};

/// 本地目录中的报告文件
///
/// 文件名即元数据，过期时间编码在文件名末尾，清理时无需读取内容。
#[derive(Debug, Clone)]
pub struct LocalFileManager {
    dir: PathBuf,
}

impl LocalFileManager {
    pub async fn new(dir: impl Into<PathBuf>) -> ProbeResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn all_files(&self) -> ProbeResult<Vec<TaskFile>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match TaskFile::parse(name) {
                Some(file) => files.push(file),
                None => debug!("跳过非报告文件: {}", name),
            }
        }
        Ok(files)
    }

    /// 删除过期的报告文件，返回删除数量
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> ProbeResult<usize> {
        let mut removed = 0;
        for file in self.all_files().await? {
            if !file.is_expired(now) {
                continue;
            }
            match tokio::fs::remove_file(self.dir.join(&file.file_name)).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("删除过期报告 {} 失败: {}", file.file_name, e),
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl FileManager for LocalFileManager {
    async fn write_task_file(
        &self,
        kind: TaskKind,
        task_name: &str,
        round_number: i64,
        node_name: &str,
        expiry: DateTime<Utc>,
        data: &[u8],
    ) -> ProbeResult<()> {
        let file = TaskFile::new(kind, task_name, round_number, node_name, expiry);
        let path = self.dir.join(&file.file_name);
        // 先写临时文件再改名，读者不会看到写了一半的报告
        let tmp = self.dir.join(format!(".{}.tmp", file.file_name));
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("已写入报告 {}", file.file_name);
        Ok(())
    }

    async fn list_task_files(&self, kind: TaskKind, task_name: &str) -> ProbeResult<Vec<TaskFile>> {
        let mut files: Vec<TaskFile> = self
            .all_files()
            .await?
            .into_iter()
            .filter(|f| f.kind == kind && f.task_name == task_name)
            .collect();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }

    async fn read_task_file(&self, file: &TaskFile) -> ProbeResult<Vec<u8>> {
        Ok(tokio::fs::read(self.dir.join(&file.file_name)).await?)
    }
}

/// 周期性清理过期报告
pub struct FileCleanupService {
    file_manager: Arc<LocalFileManager>,
    interval: Duration,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl FileCleanupService {
    pub fn new(file_manager: Arc<LocalFileManager>, interval: Duration) -> Self {
        Self {
            file_manager,
            interval,
            shutdown_tx: None,
            cleanup_handle: None,
        }
    }

    pub fn start(&mut self) {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let file_manager = self.file_manager.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut cleanup_interval = interval(period);
            loop {
                tokio::select! {
                    _ = cleanup_interval.tick() => {
                        match file_manager.cleanup_expired(Utc::now()).await {
                            Ok(0) => {}
                            Ok(n) => info!("已清理 {} 个过期报告", n),
                            Err(e) => error!("清理过期报告失败: {}", e),
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            info!("报告清理服务已停止");
        });

        self.cleanup_handle = Some(handle);
        info!(
            "报告清理服务已启动，目录 {:?}，间隔 {:?}",
            self.file_manager.dir(),
            self.interval
        );
    }

    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.cleanup_handle.take() {
            if let Err(e) = handle.await {
                warn!("等待报告清理服务退出失败: {}", e);
            }
        }
    }
}
