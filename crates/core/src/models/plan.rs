use std::str::FromStr;

use chrono::Duration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ProbeError, ProbeResult};

/// 不限轮次
pub const UNLIMITED_ROUNDS: i64 = -1;

/// 计划中任何分钟数的上限（十年）
pub const MAX_PLAN_MINUTES: i64 = 10 * 365 * 24 * 60;

/// 任务的调度计划，准入后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePlan {
    /// 5段 cron 表达式，或 "{startAfterMinutes} {intervalMinutes}"
    pub schedule: String,
    pub round_timeout_minute: i64,
    /// 总轮次，-1 表示不限
    pub round_number: i64,
}

impl Default for SchedulePlan {
    fn default() -> Self {
        Self {
            schedule: "0 60".to_string(),
            round_timeout_minute: 60,
            round_number: 1,
        }
    }
}

/// 解析后的调度表达式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleForm {
    /// 标准5段 cron
    Cron(String),
    /// 首轮延迟分钟数 + 轮次间隔分钟数
    Simple {
        start_after_minutes: i64,
        interval_minutes: i64,
    },
}

impl ScheduleForm {
    /// 解析调度表达式
    pub fn parse(schedule: &str) -> ProbeResult<Self> {
        let fields: Vec<&str> = schedule.split_whitespace().collect();
        match fields.len() {
            2 => {
                let start_after_minutes = fields[0].parse::<i64>().map_err(|e| {
                    ProbeError::invalid_schedule(schedule, format!("首轮延迟分钟数无效: {e}"))
                })?;
                let interval_minutes = fields[1].parse::<i64>().map_err(|e| {
                    ProbeError::invalid_schedule(schedule, format!("轮次间隔分钟数无效: {e}"))
                })?;
                Ok(Self::Simple {
                    start_after_minutes,
                    interval_minutes,
                })
            }
            5 => {
                let expr = Self::to_cron_crate_expr(schedule);
                let parsed = cron::Schedule::from_str(&expr)
                    .map_err(|e| ProbeError::invalid_schedule(schedule, e.to_string()))?;
                // 例如 "0 0 30 2 *" 永远不会触发
                if parsed.upcoming(chrono::Utc).next().is_none() {
                    return Err(ProbeError::invalid_schedule(
                        schedule,
                        "cron 表达式没有未来的触发时间",
                    ));
                }
                Ok(Self::Cron(fields.join(" ")))
            }
            n => Err(ProbeError::invalid_schedule(
                schedule,
                format!("期望5段 cron 或 2个整数，实际为 {n} 段"),
            )),
        }
    }

    /// cron crate 要求秒字段，5段表达式前补 "0"
    pub fn to_cron_crate_expr(five_fields: &str) -> String {
        format!("0 {}", five_fields.trim())
    }
}

impl SchedulePlan {
    pub fn is_unlimited(&self) -> bool {
        self.round_number == UNLIMITED_ROUNDS
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::try_minutes(self.round_timeout_minute).unwrap_or(Duration::MAX)
    }

    /// 准入阶段的校验规则，时钟只会基于通过校验的计划构造
    pub fn validate(&self) -> ProbeResult<ScheduleForm> {
        if self.round_timeout_minute < 1 {
            return Err(ProbeError::Validation(format!(
                "roundTimeoutMinute 必须大于等于1，实际为 {}",
                self.round_timeout_minute
            )));
        }
        if self.round_timeout_minute > MAX_PLAN_MINUTES {
            return Err(ProbeError::Validation(format!(
                "roundTimeoutMinute 不能超过 {MAX_PLAN_MINUTES}，实际为 {}",
                self.round_timeout_minute
            )));
        }
        if self.round_number < 1 && self.round_number != UNLIMITED_ROUNDS {
            return Err(ProbeError::Validation(format!(
                "roundNumber 必须大于等于1或为-1，实际为 {}",
                self.round_number
            )));
        }

        let form = ScheduleForm::parse(&self.schedule)?;
        if let ScheduleForm::Simple {
            start_after_minutes,
            interval_minutes,
        } = form
        {
            if start_after_minutes < 0 {
                return Err(ProbeError::invalid_schedule(
                    &self.schedule,
                    "首轮延迟分钟数不能为负",
                ));
            }
            if interval_minutes < 1 {
                return Err(ProbeError::invalid_schedule(
                    &self.schedule,
                    "轮次间隔必须大于等于1分钟",
                ));
            }
            if start_after_minutes > MAX_PLAN_MINUTES || interval_minutes > MAX_PLAN_MINUTES {
                return Err(ProbeError::invalid_schedule(
                    &self.schedule,
                    format!("分钟数不能超过 {MAX_PLAN_MINUTES}"),
                ));
            }
            if self.round_timeout_minute > interval_minutes {
                return Err(ProbeError::Validation(format!(
                    "roundTimeoutMinute({}) 不能大于轮次间隔({})",
                    self.round_timeout_minute, interval_minutes
                )));
            }
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(schedule: &str, timeout: i64, rounds: i64) -> SchedulePlan {
        SchedulePlan {
            schedule: schedule.to_string(),
            round_timeout_minute: timeout,
            round_number: rounds,
        }
    }

    #[test]
    fn test_simple_form_validation() {
        assert_eq!(
            plan("0 60", 60, 1).validate().unwrap(),
            ScheduleForm::Simple {
                start_after_minutes: 0,
                interval_minutes: 60
            }
        );
        assert!(plan("-1 60", 60, 1).validate().is_err());
        assert!(plan("0 0", 1, 1).validate().is_err());
        assert!(plan("0 10", 11, 1).validate().is_err());
        assert!(plan("a 10", 1, 1).validate().is_err());
    }

    #[test]
    fn test_cron_form_validation() {
        assert!(matches!(
            plan("*/5 * * * *", 1, -1).validate().unwrap(),
            ScheduleForm::Cron(_)
        ));
        assert!(plan("61 * * * *", 1, 1).validate().is_err());
        assert!(plan("* * * *", 1, 1).validate().is_err());
    }

    #[test]
    fn test_round_bounds() {
        assert!(plan("0 1", 0, 1).validate().is_err());
        assert!(plan("0 1", 1, 0).validate().is_err());
        assert!(plan("0 1", 1, -2).validate().is_err());
        assert!(plan("0 1", 1, -1).validate().is_ok());
        assert!(plan("0 1", 1, -1).is_unlimited());
    }

    #[test]
    fn test_oversized_minutes_rejected() {
        assert!(plan("0 1000000000000", 1, 1).validate().is_err());
        assert!(plan("200000000000000 200000000000000", 1, 1).validate().is_err());
        assert!(plan("*/5 * * * *", 1_000_000_000_000_000, 1).validate().is_err());
        let edge = format!("{MAX_PLAN_MINUTES} {MAX_PLAN_MINUTES}");
        assert!(plan(&edge, 60, 1).validate().is_ok());
    }

    #[test]
    fn test_round_timeout_saturates() {
        let p = plan("*/5 * * * *", i64::MAX, 1);
        assert_eq!(p.round_timeout(), Duration::MAX);
        assert_eq!(plan("0 60", 30, 1).round_timeout(), Duration::minutes(30));
    }
}
