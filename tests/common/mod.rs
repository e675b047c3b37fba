//! 集成测试共用的假引擎与记录型输出端
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use url::Url;

use protoprobe::core::task::HttpVersion;
use protoprobe::core::{
    DownloadError, EndpointProbe, HttpEngine, Protocol, SetupError, StreamRequest, StreamResponse,
};
use protoprobe::ui::{ProgressRow, RenderSink};

/// 某个协议的下载表现
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// 按给定大小依次返回数据块，每块之间间隔 `gap`
    Body {
        chunks: Vec<usize>,
        declare_length: bool,
        gap: Duration,
    },
    /// 返回 `sent` 字节后永远不再有数据
    Stall { sent: usize },
    Redirect(String),
    Refuse(String),
}

impl Behaviour {
    pub fn body(total: usize, chunk: usize) -> Self {
        let mut chunks = vec![chunk; total / chunk];
        if total % chunk != 0 {
            chunks.push(total % chunk);
        }
        Behaviour::Body {
            chunks,
            declare_length: true,
            gap: Duration::from_millis(5),
        }
    }
}

/// 脚本化引擎：探测结果与每个协议的行为都预先写好
pub struct FakeEngine {
    pub resolvable: bool,
    /// 探测请求永不返回
    pub hang_probe: bool,
    pub plain: EndpointProbe,
    pub tls: EndpointProbe,
    behaviours: HashMap<Protocol, Behaviour>,
    opens: Mutex<Vec<StreamRequest>>,
}

impl FakeEngine {
    pub fn new(plain: EndpointProbe, tls: EndpointProbe) -> Self {
        Self {
            resolvable: true,
            hang_probe: false,
            plain,
            tls,
            behaviours: HashMap::new(),
            opens: Mutex::new(Vec::new()),
        }
    }

    /// HTTP 与 HTTPS 都可达，ALPN h2，并声明 HTTP/3
    pub fn full_stack() -> Self {
        Self::new(
            EndpointProbe::reachable(HttpVersion::Http11, None),
            EndpointProbe::reachable(HttpVersion::Http2, Some("h3=\":443\"; ma=86400".to_string())),
        )
    }

    pub fn unresolvable() -> Self {
        let mut engine = Self::new(
            EndpointProbe::unreachable("未探测"),
            EndpointProbe::unreachable("未探测"),
        );
        engine.resolvable = false;
        engine
    }

    pub fn hanging_probe() -> Self {
        let mut engine = Self::full_stack();
        engine.hang_probe = true;
        engine
    }

    pub fn with(mut self, protocol: Protocol, behaviour: Behaviour) -> Self {
        self.behaviours.insert(protocol, behaviour);
        self
    }

    pub fn opened(&self) -> Vec<StreamRequest> {
        self.opens.lock().unwrap().clone()
    }

    pub fn open_count(&self, protocol: Protocol) -> usize {
        self.opened().iter().filter(|r| r.protocol == protocol).count()
    }
}

fn version_of(protocol: Protocol) -> HttpVersion {
    protocol.wire_version()
}

#[async_trait]
impl HttpEngine for FakeEngine {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, SetupError> {
        if self.resolvable {
            Ok(vec![SocketAddr::from(([192, 0, 2, 10], port))])
        } else {
            Err(SetupError::Resolve {
                host: host.to_string(),
                reason: "无此主机".to_string(),
            })
        }
    }

    async fn probe(&self, url: &Url, _timeout: Duration) -> EndpointProbe {
        if self.hang_probe {
            return futures::future::pending().await;
        }
        if url.scheme() == "https" {
            self.tls.clone()
        } else {
            self.plain.clone()
        }
    }

    async fn open(&self, request: &StreamRequest) -> Result<StreamResponse, DownloadError> {
        self.opens.lock().unwrap().push(request.clone());
        let behaviour = self
            .behaviours
            .get(&request.protocol)
            .cloned()
            .unwrap_or_else(|| Behaviour::body(4096, 1024));
        let version = version_of(request.protocol);

        match behaviour {
            Behaviour::Body { chunks, declare_length, gap } => {
                let total: usize = chunks.iter().sum();
                let body = stream::iter(chunks)
                    .then(move |len| async move {
                        tokio::time::sleep(gap).await;
                        Ok::<_, DownloadError>(Bytes::from(vec![0u8; len]))
                    })
                    .boxed();
                Ok(StreamResponse {
                    status: 200,
                    version,
                    location: None,
                    content_length: declare_length.then_some(total as u64),
                    body,
                })
            }
            Behaviour::Stall { sent } => {
                let body = stream::once(async move { Ok::<_, DownloadError>(Bytes::from(vec![0u8; sent])) })
                    .chain(stream::pending())
                    .boxed();
                Ok(StreamResponse {
                    status: 200,
                    version,
                    location: None,
                    content_length: Some(sent as u64 * 100),
                    body,
                })
            }
            Behaviour::Redirect(location) => Ok(StreamResponse {
                status: 301,
                version,
                location: Some(location),
                content_length: Some(0),
                body: stream::empty().boxed(),
            }),
            Behaviour::Refuse(reason) => Err(DownloadError::Network(reason)),
        }
    }
}

/// 记录每一帧的输出端
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub frames: Arc<Mutex<Vec<Vec<ProgressRow>>>>,
    pub finished: Arc<Mutex<Option<Vec<ProgressRow>>>>,
}

impl RecordingSink {
    pub fn frames(&self) -> Vec<Vec<ProgressRow>> {
        self.frames.lock().unwrap().clone()
    }

    pub fn final_rows(&self) -> Option<Vec<ProgressRow>> {
        self.finished.lock().unwrap().clone()
    }
}

impl RenderSink for RecordingSink {
    fn render_frame(&mut self, rows: &[ProgressRow]) {
        self.frames.lock().unwrap().push(rows.to_vec());
    }

    fn finish(&mut self, rows: &[ProgressRow]) {
        *self.finished.lock().unwrap() = Some(rows.to_vec());
    }
}
