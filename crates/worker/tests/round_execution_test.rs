use std::sync::Arc;
use std::time::Duration;

use fleetprobe_core::models::AgentReport;
use fleetprobe_core::{ProbeTask, TaskKind};
use fleetprobe_infrastructure::ResourceSampler;
use fleetprobe_testing_utils::{MockFileManager, MockOutcome, MockPlugin, TaskBuilder, TestEnv};
use fleetprobe_worker::{PluginRegistry, RoundContext, RoundExecutor, FAILURE_ROUND_TIMEOUT};

fn executor(plugin: Option<Arc<MockPlugin>>, files: &MockFileManager) -> RoundExecutor {
    let mut registry = PluginRegistry::new();
    if let Some(plugin) = plugin {
        registry.register(plugin);
    }
    RoundExecutor::new(
        Arc::new(registry),
        Arc::new(files.clone()),
        ResourceSampler::new(Duration::from_millis(10)),
    )
}

fn context(timeout: Duration) -> RoundContext {
    RoundContext {
        task: TaskBuilder::new("edge").net_reach(&["10.0.0.1:80"]).into_object(),
        round_number: 2,
        node_name: "node-a".to_string(),
        pod_name: "agent-0".to_string(),
        timeout,
    }
}

fn only_report(files: &MockFileManager) -> AgentReport {
    let listed = files.files();
    assert_eq!(listed.len(), 1);
    let data = files.contents(&listed[0].file_name).unwrap();
    serde_json::from_slice(&data).unwrap()
}

#[tokio::test]
async fn test_successful_round_writes_report() {
    let files = MockFileManager::new();
    let plugin = Arc::new(MockPlugin::new(TaskKind::NetReach, MockOutcome::Succeed));
    let executor = executor(Some(plugin.clone()), &files);

    let outcome = executor.launch(context(Duration::from_secs(5))).wait().await;
    assert!(outcome.succeed);
    assert!(outcome.failure_reason.is_none());
    assert_eq!(plugin.calls(), 1);

    // 报告在结果发送前写出
    let report = only_report(&files);
    assert!(report.succeed);
    assert_eq!(report.round_number, 2);
    assert_eq!(report.node_name, "node-a");
    assert_eq!(report.pod_name, "agent-0");
    assert!(report.end_time_stamp >= report.start_time_stamp);

    let file = &files.files()[0];
    assert_eq!(file.round_number, 2);
    assert!(file.expiry >= report.end_time_stamp + chrono::Duration::minutes(5));
}

#[tokio::test]
async fn test_plugin_error_is_reported_as_failure() {
    let files = MockFileManager::new();
    let plugin = Arc::new(MockPlugin::new(
        TaskKind::NetReach,
        MockOutcome::Error("socket exploded".to_string()),
    ));
    let outcome = executor(Some(plugin), &files)
        .launch(context(Duration::from_secs(5)))
        .wait()
        .await;

    assert!(!outcome.succeed);
    assert!(outcome.failure_reason.unwrap().contains("socket exploded"));
    assert!(!only_report(&files).succeed);
}

#[tokio::test]
async fn test_unmet_condition_keeps_plugin_reason() {
    let files = MockFileManager::new();
    let plugin = Arc::new(MockPlugin::new(
        TaskKind::NetReach,
        MockOutcome::Unmet("2 of 3 endpoints unreachable".to_string()),
    ));
    let outcome = executor(Some(plugin), &files)
        .launch(context(Duration::from_secs(5)))
        .wait()
        .await;

    assert!(!outcome.succeed);
    assert_eq!(outcome.failure_reason.as_deref(), Some("2 of 3 endpoints unreachable"));
    assert_eq!(
        only_report(&files).failure_reason.as_deref(),
        Some("2 of 3 endpoints unreachable")
    );
}

#[tokio::test]
async fn test_timeout_returns_before_stubborn_plugin_finishes() {
    let files = MockFileManager::new();
    let plugin = Arc::new(
        MockPlugin::new(TaskKind::NetReach, MockOutcome::Succeed)
            .with_delay(Duration::from_millis(400))
            .ignoring_cancel(),
    );
    let executor = executor(Some(plugin.clone()), &files);

    let started = std::time::Instant::now();
    let outcome = executor.launch(context(Duration::from_millis(50))).wait().await;
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(!outcome.succeed);
    assert_eq!(outcome.failure_reason.as_deref(), Some(FAILURE_ROUND_TIMEOUT));
    assert_eq!(plugin.completions(), 0);

    // 插件最终结束后仍会写出超时报告
    let files_ref = files.clone();
    assert!(TestEnv::wait_for(|| {
        let files = files_ref.clone();
        async move { !files.files().is_empty() }
    }, Duration::from_secs(2)).await);
    let report = only_report(&files);
    assert!(!report.succeed);
    assert_eq!(report.failure_reason.as_deref(), Some(FAILURE_ROUND_TIMEOUT));
}

#[tokio::test]
async fn test_cancel_aware_plugin_stops_at_deadline() {
    let files = MockFileManager::new();
    let plugin = Arc::new(
        MockPlugin::new(TaskKind::NetReach, MockOutcome::Succeed)
            .with_delay(Duration::from_secs(10)),
    );
    let outcome = executor(Some(plugin.clone()), &files)
        .launch(context(Duration::from_millis(50)))
        .wait()
        .await;

    assert_eq!(outcome.failure_reason.as_deref(), Some(FAILURE_ROUND_TIMEOUT));
    let plugin_ref = plugin.clone();
    assert!(TestEnv::wait_for(|| {
        let plugin = plugin_ref.clone();
        async move { plugin.completions() == 1 }
    }, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_missing_plugin_fails_round() {
    let files = MockFileManager::new();
    let outcome = executor(None, &files)
        .launch(context(Duration::from_secs(5)))
        .wait()
        .await;

    assert!(!outcome.succeed);
    assert!(outcome.failure_reason.is_some());
    assert!(!only_report(&files).succeed);
}
