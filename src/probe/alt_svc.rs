//! `Alt-Svc` 响应头解析（RFC 7838）
//!
//! 例：`h3=":443"; ma=86400, h3-29=":443"; ma=86400`

/// `Alt-Svc` 中的一条替代服务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSvcEntry {
    pub protocol: String,
    /// 为空表示与原始请求同一主机
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_age: Option<u64>,
}

impl AltSvcEntry {
    /// `h3`、草案版本 `h3-NN` 以及旧的 `quic` 标识都视为 HTTP/3
    pub fn is_http3(&self) -> bool {
        let id = self.protocol.to_ascii_lowercase();
        id == "h3" || id.starts_with("h3-") || id.starts_with("quic")
    }
}

/// 解析整个头部值。`clear` 或无法识别的条目返回空列表/被跳过
pub fn parse(value: &str) -> Vec<AltSvcEntry> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("clear") {
        return Vec::new();
    }

    split_outside_quotes(value, ',')
        .into_iter()
        .filter_map(parse_entry)
        .collect()
}

/// 第一条 HTTP/3 条目
pub fn find_http3(entries: &[AltSvcEntry]) -> Option<&AltSvcEntry> {
    entries.iter().find(|entry| entry.is_http3())
}

fn parse_entry(raw: &str) -> Option<AltSvcEntry> {
    let mut parts = split_outside_quotes(raw, ';').into_iter();
    let (protocol, authority) = parts.next()?.split_once('=')?;
    let protocol = protocol.trim();
    if protocol.is_empty() {
        return None;
    }

    let authority = unquote(authority.trim());
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host.trim(), port.trim().parse::<u16>().ok()),
        None => (authority, None),
    };
    let host = (!host.is_empty()).then(|| host.to_string());

    let max_age = parts.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("ma") {
            unquote(value.trim()).parse::<u64>().ok()
        } else {
            None
        }
    });

    Some(AltSvcEntry {
        protocol: protocol.to_string(),
        host,
        port,
        max_age,
    })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn split_outside_quotes(value: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in value.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == separator && !in_quotes => {
                pieces.push(value[start..idx].trim());
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(value[start..].trim());
    pieces.retain(|piece| !piece.is_empty());
    pieces
}
