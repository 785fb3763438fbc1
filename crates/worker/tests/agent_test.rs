use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleetprobe_core::models::{RoundStatus, TaskStatus};
use fleetprobe_core::{ProbeTask, TaskKind};
use fleetprobe_infrastructure::ResourceSampler;
use fleetprobe_testing_utils::{
    MockFileManager, MockKubeClient, MockOutcome, MockPlugin, RecordBuilder, StatusBuilder,
    TaskBuilder, TestEnv,
};
use fleetprobe_worker::{
    AgentAction, AgentIdentity, AgentRoundExecutor, LocalRoundStatus, PluginRegistry, RoundExecutor,
};

const POLL: Duration = Duration::from_millis(50);
const ROUND1: &str = "NetReach.edge.round1";

struct Fixture {
    kube: MockKubeClient,
    plugin: Arc<MockPlugin>,
    agent: AgentRoundExecutor,
}

fn fixture(plugin: MockPlugin) -> Fixture {
    let kube = MockKubeClient::new();
    let plugin = Arc::new(plugin);
    let mut plugins = PluginRegistry::new();
    plugins.register(plugin.clone());
    let executor = RoundExecutor::new(
        Arc::new(plugins),
        Arc::new(MockFileManager::new()),
        ResourceSampler::new(Duration::from_millis(10)),
    );
    let agent = AgentRoundExecutor::new(
        Arc::new(kube.clone()),
        executor,
        AgentIdentity {
            task_kind: TaskKind::NetReach,
            task_name: "edge".to_string(),
            node_name: "node-a".to_string(),
            pod_name: "agent-0".to_string(),
            poll_interval: POLL,
        },
    );
    Fixture { kube, plugin, agent }
}

fn ongoing_status() -> TaskStatus {
    StatusBuilder::new(3)
        .with_round(RecordBuilder::new(1, Utc::now(), 10).ongoing().build())
        .build()
}

#[tokio::test]
async fn test_duplicate_triggers_run_plugin_once() {
    let f = fixture(
        MockPlugin::new(TaskKind::NetReach, MockOutcome::Succeed)
            .with_delay(Duration::from_millis(200)),
    );
    let status = ongoing_status();
    f.kube.insert_task(TaskKind::NetReach, "edge", Some(status.clone()));
    let task = TaskBuilder::new("edge").with_status(status).net_reach(&["10.0.0.1:80"]);

    let first = f.agent.reconcile_task(&task).await.unwrap();
    let second = f.agent.reconcile_task(&task).await.unwrap();
    assert_eq!(first, AgentAction::RequeueAfter(POLL));
    assert_eq!(second, AgentAction::RequeueAfter(POLL));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.plugin.calls(), 1);
    assert_eq!(f.kube.update_count(), 0);
}

#[tokio::test]
async fn test_finished_round_appends_node() {
    let f = fixture(MockPlugin::new(TaskKind::NetReach, MockOutcome::Succeed));
    let status = ongoing_status();
    f.kube.insert_task(TaskKind::NetReach, "edge", Some(status.clone()));
    let task = TaskBuilder::new("edge").with_status(status).net_reach(&["10.0.0.1:80"]);

    f.agent.reconcile_task(&task).await.unwrap();
    let registry = f.agent.registry().clone();
    assert!(
        TestEnv::wait_for(
            || {
                let registry = registry.clone();
                async move { registry.get(ROUND1).await == Some(LocalRoundStatus::Succeeded) }
            },
            Duration::from_secs(2),
        )
        .await
    );

    let action = f.agent.reconcile_task(&task).await.unwrap();
    assert_eq!(action, AgentAction::Requeue);

    let stored = f.kube.status(TaskKind::NetReach, "edge").unwrap();
    let latest = stored.latest().unwrap();
    assert_eq!(latest.succeed_agent_node_list, vec!["node-a".to_string()]);
    assert!(latest.failed_agent_node_list.is_empty());
    assert_eq!(latest.status, RoundStatus::Ongoing);
    assert_eq!(f.plugin.calls(), 1);
}

#[tokio::test]
async fn test_failed_round_appends_to_failed_list() {
    let f = fixture(MockPlugin::new(
        TaskKind::NetReach,
        MockOutcome::Unmet("unreachable".to_string()),
    ));
    let status = ongoing_status();
    f.kube.insert_task(TaskKind::NetReach, "edge", Some(status.clone()));
    let task = TaskBuilder::new("edge").with_status(status).net_reach(&["10.0.0.1:80"]);

    f.agent.reconcile_task(&task).await.unwrap();
    let registry = f.agent.registry().clone();
    assert!(
        TestEnv::wait_for(
            || {
                let registry = registry.clone();
                async move { registry.get(ROUND1).await == Some(LocalRoundStatus::Fail) }
            },
            Duration::from_secs(2),
        )
        .await
    );
    f.agent.reconcile_task(&task).await.unwrap();

    let stored = f.kube.status(TaskKind::NetReach, "edge").unwrap();
    assert_eq!(stored.latest().unwrap().failed_agent_node_list, vec!["node-a".to_string()]);
}

#[tokio::test]
async fn test_stale_resource_version_is_a_conflict() {
    let f = fixture(MockPlugin::new(TaskKind::NetReach, MockOutcome::Succeed));
    let status = ongoing_status();
    f.kube.insert_task(TaskKind::NetReach, "edge", Some(status.clone()));
    let task = TaskBuilder::new("edge")
        .with_status(status)
        .with_resource_version("0")
        .net_reach(&["10.0.0.1:80"]);

    f.agent.reconcile_task(&task).await.unwrap();
    let registry = f.agent.registry().clone();
    assert!(
        TestEnv::wait_for(
            || {
                let registry = registry.clone();
                async move { registry.get(ROUND1).await == Some(LocalRoundStatus::Succeeded) }
            },
            Duration::from_secs(2),
        )
        .await
    );

    let err = f.agent.reconcile_task(&task).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(f.plugin.calls(), 1);
}

#[tokio::test]
async fn test_not_ongoing_round_is_ignored() {
    let f = fixture(MockPlugin::new(TaskKind::NetReach, MockOutcome::Succeed));
    for status in [RoundStatus::NotStarted, RoundStatus::Succeed, RoundStatus::Fail] {
        let task = TaskBuilder::new("edge")
            .with_status(
                StatusBuilder::new(3)
                    .with_round(RecordBuilder::new(1, Utc::now(), 10).with_status(status).build())
                    .build(),
            )
            .net_reach(&["10.0.0.1:80"]);
        assert_eq!(f.agent.reconcile_task(&task).await.unwrap(), AgentAction::Idle);
    }

    let no_status = TaskBuilder::new("edge").net_reach(&["10.0.0.1:80"]);
    assert_eq!(f.agent.reconcile_task(&no_status).await.unwrap(), AgentAction::Idle);
    assert_eq!(f.plugin.calls(), 0);
}

#[tokio::test]
async fn test_other_tasks_are_ignored() {
    let f = fixture(MockPlugin::new(TaskKind::NetReach, MockOutcome::Succeed));
    let other_name = TaskBuilder::new("other")
        .with_status(ongoing_status())
        .net_reach(&["10.0.0.1:80"]);
    let other_kind = TaskBuilder::new("edge")
        .with_status(ongoing_status())
        .net_dns(&["example.com"]);

    assert_eq!(f.agent.reconcile_task(&other_name).await.unwrap(), AgentAction::Idle);
    assert_eq!(f.agent.reconcile_task(&other_kind).await.unwrap(), AgentAction::Idle);
    assert!(f.agent.registry().is_empty().await);
}

#[tokio::test]
async fn test_reported_node_does_not_rerun() {
    let f = fixture(MockPlugin::new(TaskKind::NetReach, MockOutcome::Succeed));
    let task = TaskBuilder::new("edge")
        .with_status(
            StatusBuilder::new(3)
                .with_round(
                    RecordBuilder::new(1, Utc::now(), 10)
                        .ongoing()
                        .failed(&["node-a"])
                        .build(),
                )
                .build(),
        )
        .net_reach(&["10.0.0.1:80"]);

    assert_eq!(f.agent.reconcile_task(&task).await.unwrap(), AgentAction::Idle);
    assert_eq!(f.plugin.calls(), 0);
}

#[tokio::test]
async fn test_deadline_result_is_kept_until_read() {
    let f = fixture(
        MockPlugin::new(TaskKind::NetReach, MockOutcome::Succeed)
            .with_delay(Duration::from_secs(2))
            .ignoring_cancel(),
    );
    let task = TaskBuilder::new("edge")
        .with_status(ongoing_status())
        .net_reach(&["10.0.0.1:80"]);
    let key = ROUND1;
    let registry = f.agent.registry().clone();
    assert!(registry.try_begin(key).await);
    f.agent.launch(task.into_object(), 1, key, Duration::from_millis(100));

    // 截止时间前后条目不能先于结果消失
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        match registry.get(key).await {
            Some(LocalRoundStatus::Fail) => break,
            Some(LocalRoundStatus::Ongoing) => {}
            other => panic!("unexpected entry before result: {other:?}"),
        }
        assert!(tokio::time::Instant::now() < deadline, "result never stored");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(
        TestEnv::wait_for(
            || {
                let registry = registry.clone();
                async move { registry.get(key).await.is_none() }
            },
            Duration::from_secs(2),
        )
        .await
    );
    assert_eq!(f.plugin.calls(), 1);
}

#[tokio::test]
async fn test_early_result_expires_after_timeout() {
    let f = fixture(MockPlugin::new(TaskKind::NetReach, MockOutcome::Succeed));
    let task = TaskBuilder::new("edge")
        .with_status(ongoing_status())
        .net_reach(&["10.0.0.1:80"]);
    let key = ROUND1;
    let registry = f.agent.registry().clone();
    assert!(registry.try_begin(key).await);
    f.agent.launch(task.into_object(), 1, key, Duration::from_millis(300));

    assert!(
        TestEnv::wait_for(
            || {
                let registry = registry.clone();
                async move { registry.get(key).await == Some(LocalRoundStatus::Succeeded) }
            },
            Duration::from_secs(1),
        )
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.get(key).await, Some(LocalRoundStatus::Succeeded));

    assert!(
        TestEnv::wait_for(
            || {
                let registry = registry.clone();
                async move { registry.get(key).await.is_none() }
            },
            Duration::from_secs(2),
        )
        .await
    );
}
