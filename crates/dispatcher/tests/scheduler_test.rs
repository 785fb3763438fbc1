use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use fleetprobe_core::crd::NetReach;
use fleetprobe_core::models::{
    RoundStatus, FAILURE_SOME_AGENTS_FAILED, FAILURE_SOME_AGENTS_NOT_REPORTED,
};
use fleetprobe_core::traits::runtime_name;
use fleetprobe_core::{ProbeTask, TaskKind, UNLIMITED_ROUNDS};
use fleetprobe_dispatcher::{RoundAction, RoundDecision, RoundScheduler};
use fleetprobe_testing_utils::{
    MockKubeClient, RecordBuilder, StatusBuilder, TaskBuilder, TestEnv,
};

const POLL: StdDuration = StdDuration::from_secs(5);

fn scheduler(kube: &MockKubeClient, max_history: usize) -> RoundScheduler {
    RoundScheduler::new(Arc::new(kube.clone()), POLL, max_history)
}

fn runtime() -> String {
    runtime_name(TaskKind::NetReach, "reach")
}

fn task(rounds: i64) -> NetReach {
    TaskBuilder::new("reach")
        .with_schedule("0 60")
        .with_round_timeout(60)
        .with_round_number(rounds)
        .net_reach(&["10.0.0.1:443"])
}

fn apply(task: &mut NetReach, decision: &RoundDecision) {
    if let Some(status) = &decision.status {
        task.set_task_status(status.clone());
    }
}

/// 首轮从 `now` 开始的进行中任务
fn ongoing_task(now: DateTime<Utc>, succeeded: &[&str], failed: &[&str]) -> NetReach {
    let status = StatusBuilder::new(1)
        .with_round(
            RecordBuilder::new(1, now, 60)
                .ongoing()
                .succeeded(succeeded)
                .failed(failed)
                .build(),
        )
        .build();
    TaskBuilder::new("reach")
        .with_status(status)
        .net_reach(&["10.0.0.1:443"])
}

#[tokio::test]
async fn test_bootstrap_schedules_first_round() {
    let kube = MockKubeClient::new();
    let now = TestEnv::fixed_now();

    let decision = scheduler(&kube, 10).process(&task(3), now).await.unwrap();

    assert_eq!(decision.action, RoundAction::Requeue);
    let status = decision.status.unwrap();
    assert_eq!(status.expected_round, Some(3));
    assert_eq!(status.done_round, Some(0));
    assert_eq!(status.history.len(), 1);
    let record = &status.history[0];
    assert_eq!(record.round_number, 1);
    assert_eq!(record.status, RoundStatus::NotStarted);
    assert_eq!(record.start_time_stamp, now);
    assert_eq!(record.dead_line_time_stamp, now + Duration::minutes(60));
    assert_eq!(decision.scheduled.unwrap().round_number, 1);
}

#[tokio::test]
async fn test_cron_bootstrap_uses_next_fire_time() {
    let kube = MockKubeClient::new();
    let now = TestEnv::fixed_now();
    let task = TaskBuilder::new("reach")
        .with_schedule("*/10 * * * *")
        .with_round_timeout(5)
        .net_reach(&["10.0.0.1:443"]);

    let decision = scheduler(&kube, 10).process(&task, now).await.unwrap();
    let status = decision.status.unwrap();
    assert_eq!(status.history[0].start_time_stamp, now + Duration::minutes(10));
}

#[tokio::test]
async fn test_all_agents_succeed_finishes_task() {
    let kube = MockKubeClient::new();
    kube.set_agent_nodes(&runtime(), ["node-a", "node-b", "node-c"]);
    let sched = scheduler(&kube, 10);
    let now = TestEnv::fixed_now();
    let mut task = task(1);

    let d = sched.process(&task, now).await.unwrap();
    apply(&mut task, &d);
    let d = sched.process(&task, now).await.unwrap();
    assert_eq!(d.action, RoundAction::Requeue);
    apply(&mut task, &d);
    assert_eq!(task.task_status().unwrap().history[0].status, RoundStatus::Ongoing);

    let mut status = task.task_status().cloned().unwrap();
    status.history[0].succeed_agent_node_list =
        vec!["node-a".into(), "node-b".into(), "node-c".into()];
    task.set_task_status(status);

    let later = now + Duration::minutes(3);
    let d = sched.process(&task, later).await.unwrap();
    assert_eq!(d.action, RoundAction::Idle);
    let finalized = d.finalized.clone().unwrap();
    assert_eq!(finalized.status, RoundStatus::Succeed);
    assert_eq!(finalized.expected_actor_number, Some(3));
    assert!(d.scheduled.is_none());

    let status = d.status.unwrap();
    assert_eq!(status.history[0].status, RoundStatus::Succeed);
    assert_eq!(status.history[0].end_time_stamp, Some(later));
    assert_eq!(status.done_round, Some(1));
    assert_eq!(status.last_round_status, Some(RoundStatus::Succeed));
    assert!(status.finish);
    assert_eq!(status.finish_time, Some(later));
}

#[tokio::test]
async fn test_missing_agent_waits_then_fails_at_deadline() {
    let kube = MockKubeClient::new();
    kube.set_agent_nodes(&runtime(), ["node-a", "node-b", "node-c"]);
    let sched = scheduler(&kube, 10);
    let start = TestEnv::fixed_now();
    let task = ongoing_task(start, &["node-a", "node-b"], &[]);

    let d = sched.process(&task, start + Duration::minutes(10)).await.unwrap();
    assert!(d.status.is_none());
    assert_eq!(d.action, RoundAction::RequeueAfter(POLL));

    // 接近截止时间时等待不超过剩余时间
    let d = sched
        .process(&task, start + Duration::minutes(60) - Duration::seconds(2))
        .await
        .unwrap();
    assert_eq!(d.action, RoundAction::RequeueAfter(StdDuration::from_secs(2)));

    let deadline = start + Duration::minutes(60);
    let d = sched.process(&task, deadline).await.unwrap();
    let record = d.finalized.unwrap();
    assert_eq!(record.status, RoundStatus::Fail);
    assert_eq!(record.not_report_agent_node_list, vec!["node-c".to_string()]);
    assert_eq!(record.failure_reason.as_deref(), Some(FAILURE_SOME_AGENTS_NOT_REPORTED));
    assert_eq!(record.expected_actor_number, Some(3));
    assert!(d.status.unwrap().finish);
}

#[tokio::test]
async fn test_failed_agent_closes_round_early() {
    let kube = MockKubeClient::new();
    kube.set_agent_nodes(&runtime(), ["node-a", "node-b"]);
    let start = TestEnv::fixed_now();
    let task = ongoing_task(start, &["node-a"], &["node-b"]);

    let d = scheduler(&kube, 10)
        .process(&task, start + Duration::minutes(1))
        .await
        .unwrap();
    let record = d.finalized.unwrap();
    assert_eq!(record.status, RoundStatus::Fail);
    assert_eq!(record.failure_reason.as_deref(), Some(FAILURE_SOME_AGENTS_FAILED));
    assert!(record.not_report_agent_node_list.is_empty());
}

#[tokio::test]
async fn test_reports_from_departed_agents_still_count() {
    let kube = MockKubeClient::new();
    kube.set_agent_nodes(&runtime(), ["node-a"]);
    let start = TestEnv::fixed_now();
    let task = ongoing_task(start, &["node-a", "node-gone"], &[]);

    let d = scheduler(&kube, 10)
        .process(&task, start + Duration::minutes(1))
        .await
        .unwrap();
    let record = d.finalized.unwrap();
    assert_eq!(record.status, RoundStatus::Succeed);
    assert_eq!(record.expected_actor_number, Some(2));
}

#[tokio::test]
async fn test_empty_quorum_waits_inside_window() {
    let kube = MockKubeClient::new();
    let sched = scheduler(&kube, 10);
    let start = TestEnv::fixed_now();
    let task = ongoing_task(start, &[], &[]);

    let d = sched.process(&task, start + Duration::minutes(1)).await.unwrap();
    assert!(d.status.is_none());
    assert_eq!(d.action, RoundAction::RequeueAfter(POLL));

    let d = sched.process(&task, start + Duration::minutes(60)).await.unwrap();
    let record = d.finalized.unwrap();
    assert_eq!(record.status, RoundStatus::Succeed);
    assert_eq!(record.expected_actor_number, Some(0));
}

#[tokio::test]
async fn test_waits_for_round_start() {
    let kube = MockKubeClient::new();
    let now = TestEnv::fixed_now();
    let status = StatusBuilder::new(2)
        .with_round(RecordBuilder::new(1, now + Duration::minutes(7), 5).build())
        .build();
    let task = TaskBuilder::new("reach")
        .with_schedule("7 10")
        .with_round_timeout(5)
        .with_round_number(2)
        .with_status(status)
        .net_reach(&["10.0.0.1:443"]);

    let d = scheduler(&kube, 10).process(&task, now).await.unwrap();
    assert!(d.status.is_none());
    assert_eq!(d.action, RoundAction::RequeueAfter(StdDuration::from_secs(7 * 60)));
}

#[tokio::test]
async fn test_finished_task_is_terminal() {
    let kube = MockKubeClient::new();
    let now = TestEnv::fixed_now();
    let status = StatusBuilder::new(1)
        .with_done_round(1)
        .with_round(
            RecordBuilder::new(1, now - Duration::hours(2), 60)
                .with_status(RoundStatus::Succeed)
                .build(),
        )
        .finished(now - Duration::hours(1))
        .build();
    let task = TaskBuilder::new("reach").with_status(status).net_reach(&[]);

    let d = scheduler(&kube, 10).process(&task, now).await.unwrap();
    assert!(d.status.is_none());
    assert_eq!(d.action, RoundAction::Idle);
}

#[tokio::test]
async fn test_done_rounds_without_finish_flag_are_closed() {
    let kube = MockKubeClient::new();
    let now = TestEnv::fixed_now();
    let status = StatusBuilder::new(1)
        .with_done_round(1)
        .with_round(
            RecordBuilder::new(1, now - Duration::hours(2), 60)
                .with_status(RoundStatus::Succeed)
                .build(),
        )
        .build();
    let task = TaskBuilder::new("reach").with_status(status).net_reach(&[]);

    let d = scheduler(&kube, 10).process(&task, now).await.unwrap();
    let status = d.status.unwrap();
    assert!(status.finish);
    assert_eq!(status.finish_time, Some(now));
    assert_eq!(d.action, RoundAction::Idle);
}

#[tokio::test]
async fn test_replay_is_deterministic() {
    let kube = MockKubeClient::new();
    kube.set_agent_nodes(&runtime(), ["node-a"]);
    let sched = scheduler(&kube, 10);
    let start = TestEnv::fixed_now();
    let mut task = ongoing_task(start, &["node-a"], &[]);
    if let Some(status) = task.status.as_mut() {
        status.expected_round = Some(5);
    }
    let now = start + Duration::minutes(2);

    let first = sched.process(&task, now).await.unwrap();
    let second = sched.process(&task, now).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.status.as_ref().unwrap().done_round, Some(1));

    // 已结束但未推进的记录只推进一次
    let mut half_done = task.task_status().cloned().unwrap();
    half_done.history[0].finalize(vec![], now);
    task.set_task_status(half_done);
    let d = sched.process(&task, now).await.unwrap();
    let status = d.status.unwrap();
    assert_eq!(status.done_round, Some(1));
    assert_eq!(status.history[0].round_number, 2);
    assert_eq!(status.history[0].start_time_stamp, start + Duration::minutes(60));
}

#[tokio::test]
async fn test_unlimited_rounds_keep_bounded_history() {
    let kube = MockKubeClient::new();
    let sched = scheduler(&kube, 3);
    let mut task = task(UNLIMITED_ROUNDS);
    let mut now = TestEnv::fixed_now();

    for round in 1..=8 {
        // 排期 / 开始 / 截止时结束并排期下一轮
        for _ in 0..2 {
            let d = sched.process(&task, now).await.unwrap();
            apply(&mut task, &d);
            assert!(task.task_status().unwrap().history.len() <= 3);
        }
        now += Duration::minutes(60);
        let d = sched.process(&task, now).await.unwrap();
        assert_eq!(d.finalized.as_ref().unwrap().round_number, round);
        apply(&mut task, &d);

        let status = task.task_status().unwrap();
        assert!(status.history.len() <= 3);
        assert!(!status.finish);
        assert_eq!(status.done_round, Some(round));
        assert_eq!(status.history[0].round_number, round + 1);
    }
}
