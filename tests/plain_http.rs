//! 用本地 HTTP 服务器验证真实引擎的明文行为

use std::time::Duration;

use httpmock::prelude::*;
use httpmock::Method::HEAD;
use tokio_util::sync::CancellationToken;
use url::Url;

use protoprobe::config::Config;
use protoprobe::core::task::{run_transfer, HttpVersion};
use protoprobe::core::{
    HttpEngine, Orchestrator, Protocol, ReqwestEngine, RunSettings, StreamRequest, Target, TaskStatus,
    TransferState,
};
use protoprobe::ui::LineSink;

fn engine() -> ReqwestEngine {
    let config = Config {
        probe_timeout: 2,
        transfer_timeout: 10,
        ..Config::default()
    };
    ReqwestEngine::new(&config).unwrap()
}

fn plain_request(server: &MockServer, path: &str) -> StreamRequest {
    StreamRequest {
        url: Url::parse(&server.url(path)).unwrap(),
        protocol: Protocol::Http1Plain,
    }
}

#[tokio::test]
async fn test_plain_redirect_is_not_followed() {
    let server = MockServer::start_async().await;
    let redirect = server
        .mock_async(|when, then| {
            when.method(GET).path("/big.iso");
            then.status(301).header("Location", "https://example.com/big.iso");
        })
        .await;

    let engine = engine();
    let state = TransferState::new(Protocol::Http1Plain);
    run_transfer(&engine, plain_request(&server, "/big.iso"), &state, &CancellationToken::new()).await;

    assert_eq!(state.status(), TaskStatus::Redirected("https://example.com/big.iso".to_string()));
    assert_eq!(state.received(), 0);
    redirect.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_plain_body_is_counted() {
    let server = MockServer::start_async().await;
    let body = vec![7u8; 64 * 1024];
    let download = server
        .mock_async(|when, then| {
            when.method(GET).path("/big.iso");
            then.status(200).body(&body);
        })
        .await;

    let engine = engine();
    let state = TransferState::new(Protocol::Http1Plain);
    run_transfer(&engine, plain_request(&server, "/big.iso"), &state, &CancellationToken::new()).await;

    assert_eq!(state.status(), TaskStatus::Completed);
    assert_eq!(state.received(), body.len() as u64);
    assert_eq!(state.total(), Some(body.len() as u64));
    download.assert_async().await;
}

#[tokio::test]
async fn test_error_status_fails_task() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        })
        .await;

    let engine = engine();
    let state = TransferState::new(Protocol::Http1Plain);
    run_transfer(&engine, plain_request(&server, "/missing"), &state, &CancellationToken::new()).await;

    match state.status() {
        TaskStatus::Failed(reason) => assert!(reason.contains("404")),
        other => panic!("期望失败，实际为 {:?}", other),
    }
}

#[tokio::test]
async fn test_head_probe_reports_version_and_alt_svc() {
    let server = MockServer::start_async().await;
    let head = server
        .mock_async(|when, then| {
            when.method(HEAD).path("/");
            then.status(200).header("Alt-Svc", "h3=\":443\"; ma=86400");
        })
        .await;

    let probe = engine()
        .probe(&Url::parse(&server.url("/")).unwrap(), Duration::from_secs(2))
        .await;

    assert!(probe.reachable);
    assert_eq!(probe.version, Some(HttpVersion::Http11));
    assert_eq!(probe.alt_svc.as_deref(), Some("h3=\":443\"; ma=86400"));
    head.assert_async().await;
}

#[tokio::test]
async fn test_plain_only_host_end_to_end() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/file.bin");
            then.status(200);
        })
        .await;
    let download = server
        .mock_async(|when, then| {
            when.method(GET).path("/file.bin");
            then.status(200).body(vec![1u8; 8192]);
        })
        .await;

    // 端口 1 上没有 TLS 服务，只剩明文
    let target = Target::parse(&server.url("/file.bin"), 80, 1).unwrap();
    let engine = std::sync::Arc::new(engine());
    let settings = RunSettings {
        probe_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(50),
        ..RunSettings::default()
    };
    let mut orchestrator = Orchestrator::new(engine, settings);
    let mut sink = LineSink::new(Vec::new(), Duration::from_secs(1));

    let report = orchestrator
        .run(&target, &mut sink, futures::future::pending())
        .await
        .unwrap()
        .expect("下载没有开始");

    assert!(!report.probe.tls.reachable);
    assert_eq!(report.snapshots.len(), 1);
    assert_eq!(report.snapshots[0].status, TaskStatus::Completed);
    assert_eq!(report.snapshots[0].received, 8192);
    download.assert_async().await;

    let output = String::from_utf8(sink.into_inner()).unwrap();
    assert!(output.contains("HTTP/1.1 (Plain)"));
    assert!(output.contains("完成"));
}
