use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

use fleetprobe_core::models::ResourceUsage;

/// /proc/self/stat 中 utime/stime 的时钟频率
const CLOCK_TICKS_PER_SECOND: f64 = 100.0;

/// 进程资源采样器
///
/// 在一轮探测执行期间按固定间隔采样本进程的 RSS 与 CPU 时间，
/// 停止时返回最大值与平均值。
#[derive(Debug, Clone)]
pub struct ResourceSampler {
    interval: Duration,
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl ResourceSampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(10)),
        }
    }

    pub fn start(&self) -> SamplerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut acc = UsageAccumulator::default();
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        acc.sample(Instant::now(), read_memory_mb(), read_cpu_seconds())
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            acc.sample(Instant::now(), read_memory_mb(), read_cpu_seconds());
            acc.finish()
        });

        SamplerHandle {
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }
}

pub struct SamplerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<ResourceUsage>,
}

impl SamplerHandle {
    pub async fn stop(mut self) -> ResourceUsage {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match self.handle.await {
            Ok(usage) => usage,
            Err(e) => {
                warn!("资源采样任务异常退出: {}", e);
                ResourceUsage::default()
            }
        }
    }
}

#[derive(Debug, Default)]
struct UsageAccumulator {
    max_memory_mb: f64,
    sum_memory_mb: f64,
    memory_samples: usize,
    max_cpu_percent: f64,
    sum_cpu_percent: f64,
    cpu_samples: usize,
    last_cpu: Option<(Instant, f64)>,
}

impl UsageAccumulator {
    fn sample(&mut self, at: Instant, memory_mb: Option<f64>, cpu_seconds: Option<f64>) {
        if let Some(mem) = memory_mb {
            self.max_memory_mb = self.max_memory_mb.max(mem);
            self.sum_memory_mb += mem;
            self.memory_samples += 1;
        }

        let Some(cpu) = cpu_seconds else {
            return;
        };
        if let Some((last_at, last_cpu)) = self.last_cpu {
            let wall = at.duration_since(last_at).as_secs_f64();
            if wall > 0.0 {
                let percent = ((cpu - last_cpu).max(0.0) / wall) * 100.0;
                self.max_cpu_percent = self.max_cpu_percent.max(percent);
                self.sum_cpu_percent += percent;
                self.cpu_samples += 1;
            }
        }
        self.last_cpu = Some((at, cpu));
    }

    fn finish(self) -> ResourceUsage {
        let mean = |sum: f64, n: usize| if n == 0 { 0.0 } else { sum / n as f64 };
        let usage = ResourceUsage {
            max_memory_mb: self.max_memory_mb,
            mean_memory_mb: mean(self.sum_memory_mb, self.memory_samples),
            max_cpu_percent: self.max_cpu_percent,
            mean_cpu_percent: mean(self.sum_cpu_percent, self.cpu_samples),
            samples: self.memory_samples,
        };
        debug!("资源采样结束: {:?}", usage);
        usage
    }
}

/// `VmRSS:   12345 kB`
fn parse_vm_rss_mb(status: &str) -> Option<f64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

/// 进程名可能包含空格，从最后一个 `)` 之后开始数字段
fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

#[cfg(target_os = "linux")]
fn read_memory_mb() -> Option<f64> {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| parse_vm_rss_mb(&s))
}

#[cfg(target_os = "linux")]
fn read_cpu_seconds() -> Option<f64> {
    std::fs::read_to_string("/proc/self/stat")
        .ok()
        .and_then(|s| parse_cpu_ticks(&s))
        .map(|ticks| ticks as f64 / CLOCK_TICKS_PER_SECOND)
}

#[cfg(not(target_os = "linux"))]
fn read_memory_mb() -> Option<f64> {
    None
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_seconds() -> Option<f64> {
    None
}
