//! 协作者接口的内存实现

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use fleetprobe_core::crd::TaskObject;
use fleetprobe_core::models::{RuntimeStatus, TaskResource, TaskStatus};
use fleetprobe_core::traits::{
    runtime_name, FileManager, KubeClient, PluginOutcome, ProbePlugin, ReportManager,
    RuntimeAdapter, RuntimeCreator, RuntimeKey, RuntimeResolver, TaskFile, TaskStatusSnapshot,
};
use fleetprobe_core::{AgentSpec, ProbeError, ProbeResult, TaskKind};

#[derive(Debug, Default)]
struct StoredTask {
    resource_version: u64,
    status: Option<TaskStatus>,
}

#[derive(Debug, Default)]
struct KubeState {
    tasks: HashMap<(TaskKind, String), StoredTask>,
    agents: HashMap<String, BTreeSet<String>>,
    updates: usize,
    fail_updates: bool,
}

/// 带 resourceVersion 检查的任务状态存储
#[derive(Debug, Clone, Default)]
pub struct MockKubeClient {
    state: Arc<Mutex<KubeState>>,
}

impl MockKubeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_task(&self, kind: TaskKind, name: &str, status: Option<TaskStatus>) {
        self.state.lock().unwrap().tasks.insert(
            (kind, name.to_string()),
            StoredTask {
                resource_version: 1,
                status,
            },
        );
    }

    pub fn set_agent_nodes<I, S>(&self, runtime_name: &str, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .lock()
            .unwrap()
            .agents
            .insert(runtime_name.to_string(), nodes.into_iter().map(Into::into).collect());
    }

    pub fn status(&self, kind: TaskKind, name: &str) -> Option<TaskStatus> {
        self.state
            .lock()
            .unwrap()
            .tasks
            .get(&(kind, name.to_string()))
            .and_then(|t| t.status.clone())
    }

    pub fn resource_version(&self, kind: TaskKind, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .tasks
            .get(&(kind, name.to_string()))
            .map(|t| t.resource_version.to_string())
    }

    pub fn update_count(&self) -> usize {
        self.state.lock().unwrap().updates
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.state.lock().unwrap().fail_updates = fail;
    }
}

#[async_trait]
impl KubeClient for MockKubeClient {
    async fn get_task_status(
        &self,
        kind: TaskKind,
        name: &str,
    ) -> ProbeResult<Option<TaskStatusSnapshot>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .get(&(kind, name.to_string()))
            .map(|t| TaskStatusSnapshot {
                resource_version: Some(t.resource_version.to_string()),
                status: t.status.clone(),
            }))
    }

    async fn update_task_status(
        &self,
        kind: TaskKind,
        name: &str,
        resource_version: Option<&str>,
        status: &TaskStatus,
    ) -> ProbeResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_updates {
            return Err(ProbeError::Internal("mock update failure".to_string()));
        }
        let task = state
            .tasks
            .get_mut(&(kind, name.to_string()))
            .ok_or_else(|| ProbeError::TaskNotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })?;
        if let Some(rv) = resource_version {
            if rv != task.resource_version.to_string() {
                return Err(ProbeError::Conflict(format!(
                    "{kind}/{name}: expected {rv}, current {}",
                    task.resource_version
                )));
            }
        }
        task.status = Some(status.clone());
        task.resource_version += 1;
        state.updates += 1;
        Ok(())
    }

    async fn list_agent_nodes(&self, runtime_name: &str) -> ProbeResult<BTreeSet<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .agents
            .get(runtime_name)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct MockRuntimeAdapter {
    ready: AtomicBool,
    ready_delay_ms: AtomicU64,
    fail_delete: AtomicBool,
    delete_calls: AtomicUsize,
    ready_checks: AtomicUsize,
}

impl MockRuntimeAdapter {
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// 每次就绪检查前等待，模拟卡住的执行器
    pub fn set_ready_delay(&self, delay: Duration) {
        self.ready_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn ready_checks(&self) -> usize {
        self.ready_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeAdapter for MockRuntimeAdapter {
    async fn is_ready(&self) -> ProbeResult<bool> {
        self.ready_checks.fetch_add(1, Ordering::SeqCst);
        let delay = self.ready_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(self.ready.load(Ordering::SeqCst))
    }

    async fn delete(&self) -> ProbeResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ProbeError::Internal("mock delete failure".to_string()));
        }
        Ok(())
    }
}

/// 每个运行时键对应一个共享的 [`MockRuntimeAdapter`]
#[derive(Debug, Clone, Default)]
pub struct MockRuntimeResolver {
    adapters: Arc<Mutex<BTreeMap<RuntimeKey, Arc<MockRuntimeAdapter>>>>,
}

impl MockRuntimeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adapter(&self, key: &RuntimeKey) -> Arc<MockRuntimeAdapter> {
        self.adapters
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .clone()
    }
}

impl RuntimeResolver for MockRuntimeResolver {
    fn resolve(&self, key: &RuntimeKey) -> Arc<dyn RuntimeAdapter> {
        self.adapter(key)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockRuntimeCreator {
    calls: Arc<Mutex<Vec<(TaskKind, String)>>>,
}

impl MockRuntimeCreator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(TaskKind, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RuntimeCreator for MockRuntimeCreator {
    async fn create_task_runtime_if_not_exist(
        &self,
        kind: TaskKind,
        task_name: &str,
        agent_spec: &AgentSpec,
    ) -> ProbeResult<TaskResource> {
        self.calls.lock().unwrap().push((kind, task_name.to_string()));
        let name = runtime_name(kind, task_name);
        Ok(TaskResource {
            runtime_type: agent_spec.kind,
            service_name_v4: Some(format!("{name}-ipv4")),
            service_name_v6: None,
            runtime_name: name,
            runtime_status: RuntimeStatus::Creating,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockFileManager {
    files: Arc<Mutex<BTreeMap<String, (TaskFile, Vec<u8>)>>>,
}

impl MockFileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<TaskFile> {
        self.files
            .lock()
            .unwrap()
            .values()
            .map(|(f, _)| f.clone())
            .collect()
    }

    pub fn contents(&self, file_name: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(file_name)
            .map(|(_, data)| data.clone())
    }
}

#[async_trait]
impl FileManager for MockFileManager {
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
        self.files
            .lock()
            .unwrap()
            .insert(file.file_name.clone(), (file, data.to_vec()));
        Ok(())
    }

    async fn list_task_files(&self, kind: TaskKind, task_name: &str) -> ProbeResult<Vec<TaskFile>> {
        Ok(self
            .files()
            .into_iter()
            .filter(|f| f.kind == kind && f.task_name == task_name)
            .collect())
    }

    async fn read_task_file(&self, file: &TaskFile) -> ProbeResult<Vec<u8>> {
        self.contents(&file.file_name).ok_or_else(|| {
            ProbeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                file.file_name.clone(),
            ))
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockReportManager {
    keys: Arc<Mutex<Vec<String>>>,
}

impl MockReportManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

impl ReportManager for MockReportManager {
    fn trigger_sync_report(&self, key: &str) {
        self.keys.lock().unwrap().push(key.to_string());
    }
}

/// 插件的预设结果
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed,
    Unmet(String),
    Error(String),
}

#[derive(Debug)]
pub struct MockPlugin {
    kind: TaskKind,
    outcome: MockOutcome,
    delay: Duration,
    honor_cancel: bool,
    calls: AtomicUsize,
    completions: AtomicUsize,
}

impl MockPlugin {
    pub fn new(kind: TaskKind, outcome: MockOutcome) -> Self {
        Self {
            kind,
            outcome,
            delay: Duration::ZERO,
            honor_cancel: true,
            calls: AtomicUsize::new(0),
            completions: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 忽略取消令牌，一直执行到 delay 结束
    pub fn ignoring_cancel(mut self) -> Self {
        self.honor_cancel = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbePlugin for MockPlugin {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn execute(
        &self,
        _task: &TaskObject,
        cancel: CancellationToken,
    ) -> ProbeResult<PluginOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            if self.honor_cancel {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = cancel.cancelled() => {
                        self.completions.fetch_add(1, Ordering::SeqCst);
                        return Ok(PluginOutcome::failure(
                            "cancelled",
                            serde_json::Value::Null,
                        ));
                    }
                }
            } else {
                tokio::time::sleep(self.delay).await;
            }
        }
        self.completions.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            MockOutcome::Succeed => {
                Ok(PluginOutcome::success(serde_json::json!({ "mock": true })))
            }
            MockOutcome::Unmet(reason) => Ok(PluginOutcome::failure(
                reason.clone(),
                serde_json::Value::Null,
            )),
            MockOutcome::Error(message) => Err(ProbeError::PluginExecution(message.clone())),
        }
    }
}
