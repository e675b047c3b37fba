use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ALT_SVC, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Version};
use url::Url;

use crate::config::Config;
use crate::core::engine::{EndpointProbe, HttpEngine, StreamRequest, StreamResponse};
use crate::core::error::{error_chain, DownloadError, SetupError};
use crate::core::task::{HttpVersion, Protocol};

/// 基于 reqwest 的引擎，每个协议变体一个独立客户端，互不复用连接
pub struct ReqwestEngine {
    probe_plain: Client,
    probe_tls: Client,
    plain: Client,
    tls: Client,
    h2: Client,
    h3: Client,
}

impl ReqwestEngine {
    pub fn new(config: &Config) -> Result<Self, SetupError> {
        let connect_timeout = Duration::from_secs(config.probe_timeout);
        let transfer_timeout = Duration::from_secs(config.transfer_timeout);
        let follow = || Policy::limited(config.max_redirects);
        let base = || {
            Client::builder()
                .user_agent(&config.user_agent)
                .connect_timeout(connect_timeout)
        };

        Ok(Self {
            probe_plain: build(base().http1_only().redirect(Policy::none()))?,
            // 不限制协议，让 ALPN 在 h2 与 http/1.1 之间自由协商
            probe_tls: build(base().redirect(Policy::none()))?,
            plain: build(base().http1_only().redirect(Policy::none()).timeout(transfer_timeout))?,
            tls: build(base().http1_only().redirect(follow()).timeout(transfer_timeout))?,
            h2: build(base().http2_prior_knowledge().redirect(follow()).timeout(transfer_timeout))?,
            h3: build(base().http3_prior_knowledge().redirect(follow()).timeout(transfer_timeout))?,
        })
    }

    fn client_for(&self, protocol: Protocol) -> &Client {
        match protocol {
            Protocol::Http1Plain => &self.plain,
            Protocol::Http1Tls => &self.tls,
            Protocol::Http2 => &self.h2,
            Protocol::Http3 => &self.h3,
        }
    }
}

fn build(builder: ClientBuilder) -> Result<Client, SetupError> {
    builder.build().map_err(|e| SetupError::Client(error_chain(&e)))
}

fn wire_version(version: Version) -> HttpVersion {
    if version == Version::HTTP_3 {
        HttpVersion::Http3
    } else if version == Version::HTTP_2 {
        HttpVersion::Http2
    } else {
        HttpVersion::Http11
    }
}

#[async_trait]
impl HttpEngine for ReqwestEngine {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, SetupError> {
        let resolve_error = |reason: String| SetupError::Resolve {
            host: host.to_string(),
            reason,
        };
        let addresses: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| resolve_error(e.to_string()))?
            .collect();
        if addresses.is_empty() {
            return Err(resolve_error("没有可用地址".to_string()));
        }
        Ok(addresses)
    }

    async fn probe(&self, url: &Url, timeout: Duration) -> EndpointProbe {
        let client = if url.scheme() == "https" {
            &self.probe_tls
        } else {
            &self.probe_plain
        };

        match client.head(url.clone()).timeout(timeout).send().await {
            Ok(response) => {
                let alt_svc = response
                    .headers()
                    .get(ALT_SVC)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                log::debug!("探测 {} -> {} {:?}", url, response.status(), response.version());
                EndpointProbe::reachable(wire_version(response.version()), alt_svc)
            }
            Err(e) if e.is_timeout() => EndpointProbe::unreachable(format!("{}s 内无响应", timeout.as_secs())),
            Err(e) => EndpointProbe::unreachable(error_chain(&e)),
        }
    }

    async fn open(&self, request: &StreamRequest) -> Result<StreamResponse, DownloadError> {
        let mut builder = self.client_for(request.protocol).get(request.url.clone());
        if request.protocol == Protocol::Http3 {
            builder = builder.version(Version::HTTP_3);
        }

        let response = builder.send().await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(StreamResponse {
            status: response.status().as_u16(),
            version: wire_version(response.version()),
            location,
            content_length: response.content_length(),
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(DownloadError::from))
                .boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_version_mapping() {
        assert_eq!(wire_version(Version::HTTP_10), HttpVersion::Http11);
        assert_eq!(wire_version(Version::HTTP_11), HttpVersion::Http11);
        assert_eq!(wire_version(Version::HTTP_2), HttpVersion::Http2);
        assert_eq!(wire_version(Version::HTTP_3), HttpVersion::Http3);
    }

    // HTTP/3 客户端创建时会绑定 UDP 端口，需要运行时
    #[tokio::test]
    async fn test_engine_builds_with_default_config() {
        assert!(ReqwestEngine::new(&Config::default()).is_ok());
    }
}
