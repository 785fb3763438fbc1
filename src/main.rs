use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use tracing::{error, info, warn};

use fleetprobe::app::{AppMode, Application};
use fleetprobe::shutdown::{wait_for_shutdown_signal, ShutdownManager};
use fleetprobe_core::{init_logging, AppConfig};

fn cli() -> Command {
    Command::new("fleetprobe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Kubernetes 集群探测任务调度")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，缺省时依次查找默认位置"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["controller", "agent"])
                .default_value("controller"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("task-kind")
                .long("task-kind")
                .value_name("KIND")
                .help("agent 负责的任务类型")
                .value_parser(["NetReach", "AppHttpHealthy", "NetDns"]),
        )
        .arg(
            Arg::new("task-name")
                .long("task-name")
                .value_name("NAME")
                .help("agent 负责的任务名称"),
        )
        .arg(
            Arg::new("node-name")
                .long("node-name")
                .value_name("NODE")
                .env("NODE_NAME")
                .help("agent 所在节点"),
        )
}

/// 命令行参数优先于配置文件与 FLEETPROBE__ 环境变量
fn apply_overrides(config: &mut AppConfig, matches: &ArgMatches) {
    let arg = |name: &str| matches.get_one::<String>(name).cloned();

    if let Some(level) = arg("log-level") {
        config.observability.log_level = level;
    }
    if let Some(format) = arg("log-format") {
        config.observability.log_format = format;
    }
    if let Some(kind) = arg("task-kind") {
        config.agent.task_kind = Some(kind);
    }
    if let Some(name) = arg("task-name") {
        config.agent.task_name = Some(name);
    }
    if config.agent.node_name.is_none() {
        config.agent.node_name = arg("node-name");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mode: AppMode = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("controller")
        .parse()?;

    let mut config = AppConfig::load(config_path).context("加载配置失败")?;
    apply_overrides(&mut config, &matches);

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;
    info!("启动 fleetprobe，模式: {mode}");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    let app = Application::new(config, mode)?;
    let shutdown = ShutdownManager::new();

    let app_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = app.run(&shutdown).await {
                error!("应用运行失败: {e:#}");
            }
            // 组件自行退出时同样结束进程
            shutdown.shutdown();
        })
    };

    let mut shutdown_rx = shutdown.subscribe();
    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
            shutdown.shutdown();
        }
        _ = shutdown_rx.recv() => {}
    }

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("fleetprobe 已退出");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_controller() {
        let matches = cli().try_get_matches_from(["fleetprobe"]).unwrap();
        assert_eq!(matches.get_one::<String>("mode").unwrap(), "controller");
        assert!(matches.get_one::<String>("config").is_none());
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        assert!(cli()
            .try_get_matches_from(["fleetprobe", "--mode", "dispatcher"])
            .is_err());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let matches = cli()
            .try_get_matches_from([
                "fleetprobe",
                "--mode",
                "agent",
                "--task-kind",
                "NetDns",
                "--task-name",
                "resolver",
                "--log-format",
                "json",
                "--node-name",
                "node-a",
            ])
            .unwrap();
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &matches);

        assert_eq!(config.agent.task_kind.as_deref(), Some("NetDns"));
        assert_eq!(config.agent.task_name.as_deref(), Some("resolver"));
        assert_eq!(config.agent.node_name.as_deref(), Some("node-a"));
        assert_eq!(config.observability.log_format, "json");
        assert_eq!(config.observability.log_level, "info");
    }
}
