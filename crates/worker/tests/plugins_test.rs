use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use fleetprobe_core::traits::ProbePlugin;
use fleetprobe_core::ProbeTask;
use fleetprobe_testing_utils::TaskBuilder;
use fleetprobe_worker::{DnsPlugin, HttpPlugin, TcpPlugin};

/// 对每个连接回复固定状态行
async fn http_responder(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("http://{addr}/healthz")
}

#[tokio::test]
async fn test_tcp_plugin_reaches_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move { while listener.accept().await.is_ok() {} });

    let task = TaskBuilder::new("edge").net_reach(&[&addr]).into_object();
    let outcome = TcpPlugin.execute(&task, CancellationToken::new()).await.unwrap();
    assert!(outcome.failure_reason.is_none(), "{:?}", outcome);
    assert_eq!(outcome.detail["succeeded"], 1);
}

#[tokio::test]
async fn test_tcp_plugin_reports_closed_port() {
    // 绑定后立即释放，端口上不再有监听
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let task = TaskBuilder::new("edge").net_reach(&[&addr]).into_object();
    let outcome = TcpPlugin.execute(&task, CancellationToken::new()).await.unwrap();
    assert!(outcome.failure_reason.is_some());
}

#[tokio::test]
async fn test_tcp_plugin_rejects_other_kinds() {
    let task = TaskBuilder::new("edge").net_dns(&["localhost"]).into_object();
    assert!(TcpPlugin.execute(&task, CancellationToken::new()).await.is_err());
}

#[tokio::test]
async fn test_dns_plugin_resolves_localhost() {
    let task = TaskBuilder::new("resolver").net_dns(&["localhost"]).into_object();
    let outcome = DnsPlugin.execute(&task, CancellationToken::new()).await.unwrap();
    assert!(outcome.failure_reason.is_none(), "{:?}", outcome);
}

#[tokio::test]
async fn test_dns_plugin_without_domains_fails() {
    let task = TaskBuilder::new("resolver").net_dns(&[]).into_object();
    let outcome = DnsPlugin.execute(&task, CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.failure_reason.as_deref(), Some("no probe target configured"));
}

#[tokio::test]
async fn test_http_plugin_matches_status_code() {
    let url = http_responder("200 OK").await;
    let task = TaskBuilder::new("web").app_http_healthy(&url).into_object();
    let outcome = HttpPlugin::new().execute(&task, CancellationToken::new()).await.unwrap();
    assert!(outcome.failure_reason.is_none(), "{:?}", outcome);
}

#[tokio::test]
async fn test_http_plugin_unexpected_status_fails() {
    let url = http_responder("503 Service Unavailable").await;
    let task = TaskBuilder::new("web").app_http_healthy(&url).into_object();
    let outcome = HttpPlugin::new().execute(&task, CancellationToken::new()).await.unwrap();
    assert!(outcome.failure_reason.is_some());
    let error = outcome.detail["targets"][0]["lastError"].as_str().unwrap();
    assert!(error.contains("503"));
}
