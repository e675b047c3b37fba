//! Probe: 下载前的能力探测
//!
//! 依次判断主机能否解析、明文 HTTP 是否可达、TLS 是否可达及其协商的 ALPN，
//! 以及 TLS 响应的 `Alt-Svc` 里是否声明了 HTTP/3。不下载任何负载。

pub mod alt_svc;

use std::net::SocketAddr;
use std::time::Duration;

use crate::core::engine::{EndpointProbe, HttpEngine};
use crate::core::error::SetupError;
use crate::core::target::{AltAuthority, Target};
use crate::core::task::HttpVersion;

pub use alt_svc::AltSvcEntry;

/// 单个端点是否可达
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointStatus {
    pub reachable: bool,
    pub error: Option<String>,
}

/// 一次运行的探测结果，创建后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub host: String,
    pub addresses: Vec<SocketAddr>,
    pub plain_port: u16,
    pub tls_port: u16,
    pub plain: EndpointStatus,
    pub tls: EndpointStatus,
    /// TLS 上协商到的协议标识，例如 "http/1.1"、"h2"
    pub alpn: Option<String>,
    /// 原始 `Alt-Svc` 头
    pub alt_svc: Option<String>,
    pub alt_svc_entries: Vec<AltSvcEntry>,
}

impl ProbeResult {
    pub fn http2_negotiated(&self) -> bool {
        self.tls.reachable && self.alpn.as_deref() == Some(HttpVersion::Http2.alpn_id())
    }

    pub fn http3_advertised(&self) -> bool {
        self.http3_entry().is_some()
    }

    pub fn http3_entry(&self) -> Option<&AltSvcEntry> {
        alt_svc::find_http3(&self.alt_svc_entries)
    }

    /// Alt-Svc 声明的 HTTP/3 入口（主机、端口）
    pub fn http3_authority(&self) -> AltAuthority {
        self.http3_entry()
            .map(|entry| AltAuthority {
                host: entry.host.clone(),
                port: entry.port,
            })
            .unwrap_or_default()
    }
}

/// 能力探测器
pub struct Prober<'a, E: HttpEngine + ?Sized> {
    engine: &'a E,
    timeout: Duration,
}

impl<'a, E: HttpEngine + ?Sized> Prober<'a, E> {
    pub fn new(engine: &'a E, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    /// 执行探测。只有主机完全无法解析时返回错误
    pub async fn run(&self, target: &Target) -> Result<ProbeResult, SetupError> {
        let addresses = self.engine.resolve(target.host(), target.tls_port()).await?;
        log::info!("{} 解析到 {} 个地址: {:?}", target.host(), addresses.len(), addresses);

        let (plain, tls) = tokio::join!(
            self.engine.probe(target.plain_url(), self.timeout),
            self.engine.probe(target.tls_url(), self.timeout),
        );
        log::info!("明文探测: {:?}", plain);
        log::info!("TLS 探测: {:?}", tls);

        let alt_svc = if tls.reachable { tls.alt_svc.clone() } else { None };
        let alt_svc_entries = alt_svc.as_deref().map(alt_svc::parse).unwrap_or_default();
        let alpn = tls.version.filter(|_| tls.reachable).map(|v| v.alpn_id().to_string());

        Ok(ProbeResult {
            host: target.host().to_string(),
            addresses,
            plain_port: target.plain_port(),
            tls_port: target.tls_port(),
            plain: endpoint_status(plain),
            tls: endpoint_status(tls),
            alpn,
            alt_svc,
            alt_svc_entries,
        })
    }
}

fn endpoint_status(probe: EndpointProbe) -> EndpointStatus {
    EndpointStatus {
        reachable: probe.reachable,
        error: probe.error,
    }
}
