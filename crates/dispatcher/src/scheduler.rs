//! 轮次状态机
//!
//! 每次 reconcile 基于 CRD 上持久化的 `TaskStatus` 和当前时间计算出新的状态，
//! 计算本身是确定的：同样的输入得到同样的输出，冲突后重放不会重复推进轮次。
//!
//! 一轮的生命周期：
//! - `notstarted`：已排期，等待窗口开始
//! - `ongoing`：窗口内，等待 agent 上报
//! - `succeed` / `fail`：所有 agent 上报后提前结束，或到达截止时间被强制结束
//!
//! 结束时的判定规则：失败列表和未上报列表都为空才算成功。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{debug, info};

use fleetprobe_core::models::{RoundStatus, StatusHistoryRecord, TaskStatus};
use fleetprobe_core::traits::KubeClient;
use fleetprobe_core::{ProbeResult, ProbeTask};

use crate::cron_utils::ScheduleClock;

/// reconcile 之后的调度动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundAction {
    /// 立即重新 reconcile
    Requeue,
    RequeueAfter(StdDuration),
    /// 等待下一次对象变更
    Idle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundDecision {
    /// 需要写回的新状态，`None` 表示没有变化
    pub status: Option<TaskStatus>,
    pub action: RoundAction,
    /// 本次结束的轮次，写回成功后用于生成汇总报告
    pub finalized: Option<StatusHistoryRecord>,
    /// 本次新排期的轮次
    pub scheduled: Option<StatusHistoryRecord>,
}

impl RoundDecision {
    fn unchanged(action: RoundAction) -> Self {
        Self {
            status: None,
            action,
            finalized: None,
            scheduled: None,
        }
    }

    fn changed(status: TaskStatus, action: RoundAction) -> Self {
        Self {
            status: Some(status),
            action,
            finalized: None,
            scheduled: None,
        }
    }
}

pub struct RoundScheduler {
    kube_client: Arc<dyn KubeClient>,
    poll_interval: StdDuration,
    max_history: usize,
}

impl RoundScheduler {
    pub fn new(
        kube_client: Arc<dyn KubeClient>,
        poll_interval: StdDuration,
        max_history: usize,
    ) -> Self {
        Self {
            kube_client,
            poll_interval,
            max_history: max_history.max(1),
        }
    }

    pub fn poll_interval(&self) -> StdDuration {
        self.poll_interval
    }

    /// 计算一次 reconcile 的结果，不做任何写入
    pub async fn process<K: ProbeTask>(
        &self,
        task: &K,
        now: DateTime<Utc>,
    ) -> ProbeResult<RoundDecision> {
        let plan = task.plan();
        let clock = ScheduleClock::new(plan)?;
        let task_name = task.name_any();
        let mut status = task.task_status().cloned().unwrap_or_default();

        if status.expected_round.is_none() {
            let start = clock.start_time(now);
            status.expected_round = Some(plan.round_number);
            status.done_round = Some(0);
            status.finish = false;
            status.finish_time = None;
            status.last_round_status = None;
            let record = StatusHistoryRecord::not_started(1, start, plan.round_timeout());
            status.push_record(record.clone(), self.max_history);

            info!("任务 {}/{} 初始化，首轮开始于 {}", K::KIND, task_name, start);
            let mut decision = RoundDecision::changed(status, RoundAction::Requeue);
            decision.scheduled = Some(record);
            return Ok(decision);
        }

        if status.finish {
            return Ok(RoundDecision::unchanged(RoundAction::Idle));
        }

        if status.all_rounds_done() {
            status.finish = true;
            status.finish_time = Some(now);
            return Ok(RoundDecision::changed(status, RoundAction::Idle));
        }

        let Some(latest) = status.latest().cloned() else {
            // 历史被清空，按已完成轮次补排下一轮
            let round = status.done_round.unwrap_or(0) + 1;
            let record = StatusHistoryRecord::not_started(
                round,
                clock.start_time(now),
                plan.round_timeout(),
            );
            status.push_record(record.clone(), self.max_history);
            let mut decision = RoundDecision::changed(status, RoundAction::Requeue);
            decision.scheduled = Some(record);
            return Ok(decision);
        };

        if latest.status.is_terminal() {
            // 已结束但尚未推进
            return Ok(self.advance(status, &clock, plan.round_timeout(), None, now));
        }

        if latest.in_window(now) {
            match latest.status {
                RoundStatus::NotStarted => {
                    if let Some(record) = status.latest_mut() {
                        record.status = RoundStatus::Ongoing;
                    }
                    debug!("任务 {}/{} 第 {} 轮开始", K::KIND, task_name, latest.round_number);
                    Ok(RoundDecision::changed(status, RoundAction::Requeue))
                }
                _ => {
                    let (agents, unknown) = self
                        .unknown_nodes(&task.unique_runtime_key(), &latest)
                        .await?;
                    let wait = self.poll_interval.min(until(now, latest.dead_line_time_stamp));
                    if !unknown.is_empty() {
                        debug!(
                            "任务 {}/{} 第 {} 轮仍有 {} 个节点未上报",
                            K::KIND,
                            task_name,
                            latest.round_number,
                            unknown.len()
                        );
                        return Ok(RoundDecision::unchanged(RoundAction::RequeueAfter(wait)));
                    }
                    if agents.is_empty() && latest.reported_nodes().is_empty() {
                        debug!("任务 {}/{} 尚未发现任何 agent", K::KIND, task_name);
                        return Ok(RoundDecision::unchanged(RoundAction::RequeueAfter(wait)));
                    }
                    Ok(self.finalize_and_advance(
                        status,
                        &clock,
                        plan.round_timeout(),
                        unknown,
                        now,
                    ))
                }
            }
        } else if now < latest.start_time_stamp {
            Ok(RoundDecision::unchanged(RoundAction::RequeueAfter(until(
                now,
                latest.start_time_stamp,
            ))))
        } else {
            let (_, unknown) = self
                .unknown_nodes(&task.unique_runtime_key(), &latest)
                .await?;
            info!(
                "任务 {}/{} 第 {} 轮到达截止时间，强制结束",
                K::KIND,
                task_name,
                latest.round_number
            );
            Ok(self.finalize_and_advance(
                status,
                &clock,
                plan.round_timeout(),
                unknown,
                now,
            ))
        }
    }

    async fn unknown_nodes(
        &self,
        runtime_name: &str,
        record: &StatusHistoryRecord,
    ) -> ProbeResult<(BTreeSet<String>, Vec<String>)> {
        let agents = self.kube_client.list_agent_nodes(runtime_name).await?;
        let reported = record.reported_nodes();
        let unknown = agents.difference(&reported).cloned().collect();
        Ok((agents, unknown))
    }

    fn finalize_and_advance(
        &self,
        mut status: TaskStatus,
        clock: &ScheduleClock,
        timeout: chrono::Duration,
        unknown: Vec<String>,
        now: DateTime<Utc>,
    ) -> RoundDecision {
        let finalized = status.latest_mut().map(|record| {
            record.finalize(unknown, now);
            record.clone()
        });
        self.advance(status, clock, timeout, finalized, now)
    }

    /// 以最新一轮的轮次号作为已完成轮次，重复执行结果相同
    fn advance(
        &self,
        mut status: TaskStatus,
        clock: &ScheduleClock,
        timeout: chrono::Duration,
        finalized: Option<StatusHistoryRecord>,
        now: DateTime<Utc>,
    ) -> RoundDecision {
        let Some(latest) = status.latest().cloned() else {
            return RoundDecision::unchanged(RoundAction::Idle);
        };
        status.done_round = Some(latest.round_number);
        status.last_round_status = Some(latest.status);

        if status.all_rounds_done() {
            status.finish = true;
            status.finish_time = Some(now);
            let mut decision = RoundDecision::changed(status, RoundAction::Idle);
            decision.finalized = finalized;
            return decision;
        }

        let start = clock.next(latest.start_time_stamp);
        let record = StatusHistoryRecord::not_started(latest.round_number + 1, start, timeout);
        status.push_record(record.clone(), self.max_history);

        let mut decision = RoundDecision::changed(status, RoundAction::Requeue);
        decision.finalized = finalized;
        decision.scheduled = Some(record);
        decision
    }
}

fn until(now: DateTime<Utc>, target: DateTime<Utc>) -> StdDuration {
    (target - now).to_std().unwrap_or(StdDuration::ZERO)
}
