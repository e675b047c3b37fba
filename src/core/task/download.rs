use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::core::engine::{HttpEngine, StreamRequest};
use crate::core::error::DownloadError;
use super::state::{TaskStatus, TransferState};

/// Location 头缺失时记录的重定向目标
pub const UNKNOWN_LOCATION: &str = "<unknown>";

/// 执行一个协议的下载，直到进入终态
///
/// 打开连接和每次读取都与取消信号竞争，取消时丢弃响应（释放连接）
/// 并记录为中断。所有错误都留在任务内部，只体现为终态。
pub async fn run_transfer<E>(
    engine: &E,
    request: StreamRequest,
    state: &TransferState,
    cancel: &CancellationToken,
) where
    E: HttpEngine + ?Sized,
{
    let protocol = request.protocol;
    log::info!("[{}] 开始下载 {}", protocol, request.url);

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => TaskStatus::interrupted(),
        status = stream_body(engine, &request, state) => status,
    };

    if state.finish(status.clone()) {
        match &status {
            TaskStatus::Failed(reason) => log::warn!("[{}] 下载失败: {}", protocol, reason),
            _ => log::info!(
                "[{}] {}，共 {} 字节，用时 {:.2}s",
                protocol,
                status,
                state.received(),
                state.elapsed().as_secs_f64()
            ),
        }
    }
}

async fn stream_body<E>(engine: &E, request: &StreamRequest, state: &TransferState) -> TaskStatus
where
    E: HttpEngine + ?Sized,
{
    let response = match engine.open(request).await {
        Ok(response) => response,
        Err(e) => return TaskStatus::Failed(e.to_string()),
    };
    log::debug!("[{}] 响应头: {:?}", request.protocol, response);

    if response.is_redirect() && !request.follow_redirects() {
        let target = response
            .location
            .clone()
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
        return TaskStatus::Redirected(target);
    }

    if !response.is_success() {
        return TaskStatus::Failed(DownloadError::Status(response.status).to_string());
    }

    let expected = request.protocol.wire_version();
    if response.version != expected {
        return TaskStatus::Failed(
            DownloadError::ProtocolMismatch {
                expected: expected.to_string(),
                actual: response.version.to_string(),
            }
            .to_string(),
        );
    }

    if let Some(total) = response.content_length {
        state.set_total(total);
    }

    let mut body = response.body;
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => state.record_chunk(bytes.len() as u64),
            Err(e) => return TaskStatus::Failed(e.to_string()),
        }
    }

    TaskStatus::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::{EndpointProbe, StreamResponse};
    use crate::core::error::SetupError;
    use crate::core::task::{HttpVersion, Protocol};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use url::Url;

    enum Reply {
        Body { status: u16, version: HttpVersion, length: Option<u64>, chunks: Vec<usize> },
        Redirect(Option<&'static str>),
        BrokenBody,
        Stall,
        Refused,
    }

    struct OneShot {
        reply: Reply,
        opened: AtomicUsize,
    }

    impl OneShot {
        fn new(reply: Reply) -> Self {
            Self { reply, opened: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl HttpEngine for OneShot {
        async fn resolve(&self, _host: &str, _port: u16) -> Result<Vec<SocketAddr>, SetupError> {
            Ok(Vec::new())
        }

        async fn probe(&self, _url: &Url, _timeout: Duration) -> EndpointProbe {
            EndpointProbe::default()
        }

        async fn open(&self, _request: &StreamRequest) -> Result<StreamResponse, DownloadError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let response = |status, version, content_length, body| StreamResponse {
                status,
                version,
                location: None,
                content_length,
                body,
            };
            match &self.reply {
                Reply::Body { status, version, length, chunks } => {
                    let items: Vec<Result<Bytes, DownloadError>> =
                        chunks.iter().map(|n| Ok(Bytes::from(vec![0u8; *n]))).collect();
                    Ok(response(*status, *version, *length, stream::iter(items).boxed()))
                }
                Reply::Redirect(location) => Ok(StreamResponse {
                    location: location.map(str::to_string),
                    ..response(301, HttpVersion::Http11, None, stream::empty().boxed())
                }),
                Reply::BrokenBody => {
                    let items = vec![
                        Ok(Bytes::from_static(b"abcd")),
                        Err(DownloadError::Network("连接被重置".to_string())),
                    ];
                    Ok(response(200, HttpVersion::Http11, Some(100), stream::iter(items).boxed()))
                }
                Reply::Stall => {
                    let first = stream::iter(vec![Ok(Bytes::from_static(b"xy"))]);
                    Ok(response(200, HttpVersion::Http2, None, first.chain(stream::pending()).boxed()))
                }
                Reply::Refused => Err(DownloadError::Network("连接被拒绝".to_string())),
            }
        }
    }

    fn request(protocol: Protocol) -> StreamRequest {
        StreamRequest {
            url: Url::parse("https://example.com/file.bin").unwrap(),
            protocol,
        }
    }

    async fn run(engine: &OneShot, protocol: Protocol) -> TransferState {
        let state = TransferState::new(protocol);
        run_transfer(engine, request(protocol), &state, &CancellationToken::new()).await;
        state
    }

    #[tokio::test]
    async fn test_completed_download_counts_bytes() {
        let engine = OneShot::new(Reply::Body {
            status: 200,
            version: HttpVersion::Http11,
            length: Some(300),
            chunks: vec![100, 100, 100],
        });
        let state = run(&engine, Protocol::Http1Tls).await;
        assert_eq!(state.status(), TaskStatus::Completed);
        assert_eq!(state.received(), 300);
        assert_eq!(state.total(), Some(300));
    }

    #[tokio::test]
    async fn test_plain_redirect_is_not_followed() {
        for location in [Some("https://example.com/file.bin"), None] {
            let engine = OneShot::new(Reply::Redirect(location));
            let state = run(&engine, Protocol::Http1Plain).await;
            let expected = location.unwrap_or(UNKNOWN_LOCATION).to_string();
            assert_eq!(state.status(), TaskStatus::Redirected(expected));
            assert_eq!(engine.opened.load(Ordering::SeqCst), 1);
            assert_eq!(state.received(), 0);
        }
    }

    #[tokio::test]
    async fn test_redirect_status_on_tls_variant_is_failure() {
        // TLS 客户端自己跟随重定向，仍然拿到 3xx 说明超出了重定向上限
        let engine = OneShot::new(Reply::Redirect(Some("https://example.com/loop")));
        let state = run(&engine, Protocol::Http1Tls).await;
        assert_eq!(state.status(), TaskStatus::Failed("服务器返回状态码 301".to_string()));
    }

    #[tokio::test]
    async fn test_error_status_is_failure() {
        let engine = OneShot::new(Reply::Body {
            status: 404,
            version: HttpVersion::Http2,
            length: Some(10),
            chunks: vec![10],
        });
        let state = run(&engine, Protocol::Http2).await;
        assert_eq!(state.status(), TaskStatus::Failed("服务器返回状态码 404".to_string()));
        assert_eq!(state.total(), None);
    }

    #[tokio::test]
    async fn test_protocol_mismatch_is_failure() {
        let engine = OneShot::new(Reply::Body {
            status: 200,
            version: HttpVersion::Http11,
            length: None,
            chunks: vec![1],
        });
        let state = run(&engine, Protocol::Http2).await;
        assert_eq!(
            state.status(),
            TaskStatus::Failed("协商到 HTTP/1.1 而不是 HTTP/2".to_string())
        );
    }

    #[tokio::test]
    async fn test_body_error_keeps_partial_count() {
        let engine = OneShot::new(Reply::BrokenBody);
        let state = run(&engine, Protocol::Http1Tls).await;
        assert_eq!(state.status(), TaskStatus::Failed("网络错误: 连接被重置".to_string()));
        assert_eq!(state.received(), 4);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let engine = OneShot::new(Reply::Refused);
        let state = run(&engine, Protocol::Http3).await;
        assert!(matches!(state.status(), TaskStatus::Failed(reason) if reason.contains("连接被拒绝")));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_stalled_read() {
        let engine = OneShot::new(Reply::Stall);
        let state = TransferState::new(Protocol::Http2);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let finished = tokio::time::timeout(
            Duration::from_secs(2),
            run_transfer(&engine, request(Protocol::Http2), &state, &cancel),
        )
        .await;
        tokio_test::assert_ok!(finished);
        assert!(state.status().is_interrupted());
        assert_eq!(state.received(), 2);
    }
}
