//! 测试数据构造器

use chrono::{DateTime, Duration, Utc};

use fleetprobe_core::crd::{
    AppHttpHealthy, AppHttpHealthySpec, DnsTarget, HttpTarget, NetDns, NetDnsSpec, NetReach,
    NetReachSpec, NetReachTarget,
};
use fleetprobe_core::models::{
    RoundStatus, SchedulePlan, StatusHistoryRecord, TaskResource, TaskStatus,
};
use fleetprobe_core::AgentSpec;

/// 三种任务 CRD 共用的构造器
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    name: String,
    plan: SchedulePlan,
    agent_spec: Option<AgentSpec>,
    status: Option<TaskStatus>,
    resource_version: Option<String>,
}

impl TaskBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            plan: SchedulePlan::default(),
            agent_spec: None,
            status: None,
            resource_version: Some("1".to_string()),
        }
    }

    pub fn with_schedule(mut self, schedule: &str) -> Self {
        self.plan.schedule = schedule.to_string();
        self
    }

    pub fn with_round_timeout(mut self, minutes: i64) -> Self {
        self.plan.round_timeout_minute = minutes;
        self
    }

    pub fn with_round_number(mut self, rounds: i64) -> Self {
        self.plan.round_number = rounds;
        self
    }

    pub fn with_agent_spec(mut self, agent_spec: AgentSpec) -> Self {
        self.agent_spec = Some(agent_spec);
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_resource_version(mut self, rv: &str) -> Self {
        self.resource_version = Some(rv.to_string());
        self
    }

    pub fn net_reach(self, endpoints: &[&str]) -> NetReach {
        let mut task = NetReach::new(
            &self.name,
            NetReachSpec {
                agent_spec: self.agent_spec,
                schedule: self.plan,
                target: NetReachTarget {
                    endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
                },
                request: Default::default(),
                success_condition: Default::default(),
            },
        );
        task.metadata.resource_version = self.resource_version;
        task.status = self.status;
        task
    }

    pub fn net_dns(self, domains: &[&str]) -> NetDns {
        let mut task = NetDns::new(
            &self.name,
            NetDnsSpec {
                agent_spec: self.agent_spec,
                schedule: self.plan,
                target: DnsTarget {
                    domains: domains.iter().map(|d| d.to_string()).collect(),
                },
                request: Default::default(),
                success_condition: Default::default(),
            },
        );
        task.metadata.resource_version = self.resource_version;
        task.status = self.status;
        task
    }

    pub fn app_http_healthy(self, url: &str) -> AppHttpHealthy {
        let mut task = AppHttpHealthy::new(
            &self.name,
            AppHttpHealthySpec {
                agent_spec: self.agent_spec,
                schedule: self.plan,
                target: HttpTarget {
                    url: url.to_string(),
                    method: "GET".to_string(),
                    headers: Default::default(),
                    body: None,
                    status_code: 200,
                },
                request: Default::default(),
                success_condition: Default::default(),
            },
        );
        task.metadata.resource_version = self.resource_version;
        task.status = self.status;
        task
    }
}

/// 任务状态构造器，`with_round` 按调用顺序把新记录放在最前
#[derive(Debug, Clone)]
pub struct StatusBuilder {
    status: TaskStatus,
}

impl StatusBuilder {
    pub fn new(expected_round: i64) -> Self {
        Self {
            status: TaskStatus {
                expected_round: Some(expected_round),
                done_round: Some(0),
                ..Default::default()
            },
        }
    }

    pub fn with_done_round(mut self, done: i64) -> Self {
        self.status.done_round = Some(done);
        self
    }

    pub fn with_round(mut self, record: StatusHistoryRecord) -> Self {
        self.status.history.insert(0, record);
        self
    }

    pub fn with_resource(mut self, resource: TaskResource) -> Self {
        self.status.resource = Some(resource);
        self
    }

    pub fn finished(mut self, at: DateTime<Utc>) -> Self {
        self.status.finish = true;
        self.status.finish_time = Some(at);
        self
    }

    pub fn build(self) -> TaskStatus {
        self.status
    }
}

#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: StatusHistoryRecord,
}

impl RecordBuilder {
    pub fn new(round: i64, start: DateTime<Utc>, timeout_minutes: i64) -> Self {
        Self {
            record: StatusHistoryRecord::not_started(
                round,
                start,
                Duration::minutes(timeout_minutes),
            ),
        }
    }

    pub fn ongoing(mut self) -> Self {
        self.record.status = RoundStatus::Ongoing;
        self
    }

    pub fn with_status(mut self, status: RoundStatus) -> Self {
        self.record.status = status;
        self
    }

    pub fn succeeded(mut self, nodes: &[&str]) -> Self {
        self.record.succeed_agent_node_list = nodes.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn failed(mut self, nodes: &[&str]) -> Self {
        self.record.failed_agent_node_list = nodes.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn build(self) -> StatusHistoryRecord {
        self.record
    }
}
