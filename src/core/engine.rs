//! HTTP/QUIC 客户端引擎的抽象边界
//!
//! 探测器和下载任务只依赖 [`HttpEngine`]，真正的实现见
//! [`crate::core::reqwest_engine`]，测试里可以换成脚本化的假引擎。

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use url::Url;

use crate::core::error::{DownloadError, SetupError};
use crate::core::task::{HttpVersion, Protocol};

/// 单个端点的探测结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointProbe {
    pub reachable: bool,
    pub error: Option<String>,
    pub version: Option<HttpVersion>,
    pub alt_svc: Option<String>,
}

impl EndpointProbe {
    pub fn reachable(version: HttpVersion, alt_svc: Option<String>) -> Self {
        Self {
            reachable: true,
            error: None,
            version: Some(version),
            alt_svc,
        }
    }

    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            reachable: false,
            error: Some(error.into()),
            version: None,
            alt_svc: None,
        }
    }
}

/// 一次强制协议的流式 GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub url: Url,
    pub protocol: Protocol,
}

impl StreamRequest {
    pub fn follow_redirects(&self) -> bool {
        self.protocol.follows_redirects()
    }
}

/// 响应头与响应体流
pub struct StreamResponse {
    pub status: u16,
    pub version: HttpVersion,
    pub location: Option<String>,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, DownloadError>>,
}

impl StreamResponse {
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("location", &self.location)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait HttpEngine: Send + Sync + 'static {
    /// 解析主机，完全失败时返回致命错误
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, SetupError>;

    /// 轻量探测（HEAD，不跟随重定向），失败只记录不抛出
    async fn probe(&self, url: &Url, timeout: Duration) -> EndpointProbe;

    /// 打开流式 GET，返回时响应头已经到达
    async fn open(&self, request: &StreamRequest) -> Result<StreamResponse, DownloadError>;
}
