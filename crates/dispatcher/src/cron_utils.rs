use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::warn;

use fleetprobe_core::models::{ScheduleForm, SchedulePlan};
use fleetprobe_core::{ProbeError, ProbeResult};

/// CRON表达式解析和调度工具
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 使用标准5段 cron 表达式创建
    pub fn new(cron_expr: &str) -> ProbeResult<Self> {
        let expr = ScheduleForm::to_cron_crate_expr(cron_expr);
        let schedule = Schedule::from_str(&expr)
            .map_err(|e| ProbeError::invalid_schedule(cron_expr, e.to_string()))?;
        Ok(Self { schedule })
    }

    /// 严格晚于 `from` 的下一次触发时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}

enum ClockForm {
    Cron(CronScheduler),
    Simple { start_after: Duration, interval: Duration },
}

/// 轮次时钟，计算首轮开始时间与后续轮次的开始时间
///
/// 只能基于通过 [`SchedulePlan::validate`] 的计划构造，运行期不会再出现解析错误。
pub struct ScheduleClock {
    form: ClockForm,
}

impl ScheduleClock {
    pub fn new(plan: &SchedulePlan) -> ProbeResult<Self> {
        let form = match plan.validate()? {
            ScheduleForm::Cron(expr) => ClockForm::Cron(CronScheduler::new(&expr)?),
            ScheduleForm::Simple {
                start_after_minutes,
                interval_minutes,
            } => ClockForm::Simple {
                start_after: saturating_minutes(start_after_minutes),
                interval: saturating_minutes(interval_minutes),
            },
        };
        Ok(Self { form })
    }

    pub fn start_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match &self.form {
            ClockForm::Cron(cron) => Self::cron_after(cron, now),
            ClockForm::Simple { start_after, .. } => saturating_add(now, *start_after),
        }
    }

    pub fn next(&self, prev_start: DateTime<Utc>) -> DateTime<Utc> {
        match &self.form {
            ClockForm::Cron(cron) => Self::cron_after(cron, prev_start),
            ClockForm::Simple { interval, .. } => saturating_add(prev_start, *interval),
        }
    }

    fn cron_after(cron: &CronScheduler, from: DateTime<Utc>) -> DateTime<Utc> {
        cron.next_execution_time(from).unwrap_or_else(|| {
            warn!("cron 表达式在 {} 之后没有触发时间", from);
            DateTime::<Utc>::MAX_UTC
        })
    }
}

fn saturating_minutes(minutes: i64) -> Duration {
    Duration::try_minutes(minutes).unwrap_or(Duration::MAX)
}

fn saturating_add(from: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    from.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fleetprobe_core::models::MAX_PLAN_MINUTES;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, 0).unwrap()
    }

    fn plan(schedule: &str, timeout: i64) -> SchedulePlan {
        SchedulePlan {
            schedule: schedule.to_string(),
            round_timeout_minute: timeout,
            round_number: 3,
        }
    }

    #[test]
    fn test_simple_form() {
        let clock = ScheduleClock::new(&plan("5 30", 10)).unwrap();
        assert_eq!(clock.start_time(at(8, 0)), at(8, 5));
        assert_eq!(clock.next(at(8, 5)), at(8, 35));
    }

    #[test]
    fn test_cron_form_is_strictly_after() {
        let clock = ScheduleClock::new(&plan("*/15 * * * *", 10)).unwrap();
        assert_eq!(clock.start_time(at(8, 0)), at(8, 15));
        assert_eq!(clock.start_time(at(8, 7)), at(8, 15));
        assert_eq!(clock.next(at(8, 15)), at(8, 30));
    }

    #[test]
    fn test_invalid_plan_never_builds_a_clock() {
        assert!(ScheduleClock::new(&plan("5 0", 1)).is_err());
        assert!(ScheduleClock::new(&plan("0 10", 20)).is_err());
        assert!(ScheduleClock::new(&plan("61 * * * *", 10)).is_err());
    }

    #[test]
    fn test_cron_next_execution_time() {
        let scheduler = CronScheduler::new("0 * * * *").unwrap();
        assert_eq!(scheduler.next_execution_time(at(8, 30)), Some(at(9, 0)));
        assert_eq!(scheduler.next_execution_time(at(9, 0)), Some(at(10, 0)));
    }

    #[test]
    fn test_simple_form_saturates_near_the_end_of_time() {
        let max = plan(&format!("{MAX_PLAN_MINUTES} {MAX_PLAN_MINUTES}"), 60);
        let clock = ScheduleClock::new(&max).unwrap();
        assert_eq!(clock.next(DateTime::<Utc>::MAX_UTC), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            clock.start_time(DateTime::<Utc>::MAX_UTC - Duration::minutes(1)),
            DateTime::<Utc>::MAX_UTC
        );
        assert_eq!(saturating_minutes(i64::MAX), Duration::MAX);
    }

    #[test]
    fn test_oversized_plan_never_builds_a_clock() {
        assert!(ScheduleClock::new(&plan("0 1000000000000", 1)).is_err());
        assert!(ScheduleClock::new(&plan("200000000000000 200000000000000", 1)).is_err());
    }
}
