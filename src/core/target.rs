use url::{Host, Url};

use crate::core::error::SetupError;
use crate::core::task::Protocol;

/// 被测目标：同一主机和路径的明文与 TLS 两个入口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    plain: Url,
    tls: Url,
}

impl Target {
    /// 解析命令行给出的 URL 或主机名
    ///
    /// 省略协议时按 https 处理。显式端口只作用于同协议的入口，
    /// 另一个入口使用配置里的默认端口。
    pub fn parse(input: &str, http_port: u16, https_port: u16) -> Result<Self, SetupError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SetupError::InvalidUrl("未提供 URL".to_string()));
        }

        let with_scheme = if has_scheme(input) {
            input.to_string()
        } else {
            format!("https://{}", input)
        };
        let mut url = Url::parse(&with_scheme)
            .map_err(|e| SetupError::InvalidUrl(format!("{}: {}", input, e)))?;

        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(SetupError::UnsupportedScheme(scheme));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(SetupError::InvalidUrl(format!("{}: 缺少主机名", input))),
        };

        url.set_fragment(None);
        let explicit_port = url.port();

        let plain_port = match (scheme.as_str(), explicit_port) {
            ("http", Some(port)) => port,
            _ => http_port,
        };
        let tls_port = match (scheme.as_str(), explicit_port) {
            ("https", Some(port)) => port,
            _ => https_port,
        };

        let plain = with_endpoint(&url, "http", plain_port, input)?;
        let tls = with_endpoint(&url, "https", tls_port, input)?;

        Ok(Self { host, plain, tls })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn plain_url(&self) -> &Url {
        &self.plain
    }

    pub fn tls_url(&self) -> &Url {
        &self.tls
    }

    pub fn plain_port(&self) -> u16 {
        self.plain.port_or_known_default().unwrap_or(80)
    }

    pub fn tls_port(&self) -> u16 {
        self.tls.port_or_known_default().unwrap_or(443)
    }

    /// HTTP/3 连接的 URL，主机和端口来自 Alt-Svc 声明，缺省时沿用原始入口
    pub fn h3_url(&self, alt: &AltAuthority) -> Url {
        let mut url = self.tls.clone();
        if let Some(host) = alt.host.as_deref() {
            if url.set_host(Some(host)).is_err() {
                log::warn!("Alt-Svc 主机 {} 无效，沿用 {}", host, self.host);
            }
        }
        if let Some(port) = alt.port {
            // https URL 必然有主机，设置端口不会失败
            let _ = url.set_port(Some(port));
        }
        url
    }

    pub fn url_for(&self, protocol: Protocol, alt: &AltAuthority) -> Url {
        match protocol {
            Protocol::Http1Plain => self.plain.clone(),
            Protocol::Http1Tls | Protocol::Http2 => self.tls.clone(),
            Protocol::Http3 => self.h3_url(alt),
        }
    }
}

/// Alt-Svc 声明的替代入口，两项都可以省略
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AltAuthority {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// 只有 `://` 出现在第一个 `/`、`?`、`#` 之前才算带协议，查询串里的 URL 不算
fn has_scheme(input: &str) -> bool {
    let head_end = input.find(['/', '?', '#']).unwrap_or(input.len());
    input.find("://").map_or(false, |at| at < head_end)
}

fn with_endpoint(url: &Url, scheme: &str, port: u16, input: &str) -> Result<Url, SetupError> {
    let mut endpoint = url.clone();
    endpoint
        .set_scheme(scheme)
        .map_err(|_| SetupError::InvalidUrl(format!("{}: 无法切换到 {}", input, scheme)))?;
    endpoint
        .set_port(Some(port))
        .map_err(|_| SetupError::InvalidUrl(format!("{}: 无效端口 {}", input, port)))?;
    Ok(endpoint)
}
