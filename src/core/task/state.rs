use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use clap::ValueEnum;

use crate::core::error::DownloadError;

/// 被测试的协议变体，声明顺序即仪表盘的行顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Protocol {
    /// 明文 HTTP/1.1
    #[value(name = "plain")]
    Http1Plain,
    /// TLS 上的 HTTP/1.1
    #[value(name = "tls")]
    Http1Tls,
    /// TLS 上的 HTTP/2
    #[value(name = "h2")]
    Http2,
    /// QUIC 上的 HTTP/3
    #[value(name = "h3")]
    Http3,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::Http1Plain,
        Protocol::Http1Tls,
        Protocol::Http2,
        Protocol::Http3,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Protocol::Http1Plain => "HTTP/1.1 (Plain)",
            Protocol::Http1Tls => "HTTP/1.1 (TLS)",
            Protocol::Http2 => "HTTP/2 (TLS)",
            Protocol::Http3 => "HTTP/3 (QUIC)",
        }
    }

    /// 只有明文变体不跟随重定向，避免第二个请求影响计时
    pub fn follows_redirects(self) -> bool {
        !matches!(self, Protocol::Http1Plain)
    }

    pub fn wire_version(self) -> HttpVersion {
        match self {
            Protocol::Http1Plain | Protocol::Http1Tls => HttpVersion::Http11,
            Protocol::Http2 => HttpVersion::Http2,
            Protocol::Http3 => HttpVersion::Http3,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 响应实际使用的 HTTP 版本（HTTP/1.0 归入 1.1）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVersion {
    Http11,
    Http2,
    Http3,
}

impl HttpVersion {
    /// 对应的 ALPN 标识
    pub fn alpn_id(self) -> &'static str {
        match self {
            HttpVersion::Http11 => "http/1.1",
            HttpVersion::Http2 => "h2",
            HttpVersion::Http3 => "h3",
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpVersion::Http11 => "HTTP/1.1",
            HttpVersion::Http2 => "HTTP/2",
            HttpVersion::Http3 => "HTTP/3",
        })
    }
}

/// 下载任务状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Completed,
    Failed(String),
    Redirected(String),
}

impl TaskStatus {
    pub fn interrupted() -> Self {
        TaskStatus::Failed(DownloadError::Cancelled.to_string())
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, TaskStatus::Failed(reason) if *reason == DownloadError::Cancelled.to_string())
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Running => write!(f, "下载中"),
            TaskStatus::Completed => write!(f, "完成"),
            TaskStatus::Failed(reason) => write!(f, "失败: {}", reason),
            TaskStatus::Redirected(target) => write!(f, "重定向 -> {}", target),
        }
    }
}

#[derive(Debug)]
struct Terminal {
    status: TaskStatus,
    received: u64,
    elapsed: Duration,
}

/// 单个协议下载的共享状态
///
/// 下载任务是唯一的写者，聚合器是唯一的读者。字节数是原子计数器，
/// 总大小与终态都只能写入一次，终态写入后快照不再变化。
#[derive(Debug)]
pub struct TransferState {
    protocol: Protocol,
    received: AtomicU64,
    total: OnceLock<u64>,
    started: Instant,
    terminal: OnceLock<Terminal>,
}

impl TransferState {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            received: AtomicU64::new(0),
            total: OnceLock::new(),
            started: Instant::now(),
            terminal: OnceLock::new(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// 记录收到的一个数据块，终态之后的写入被忽略
    pub fn record_chunk(&self, len: u64) {
        if self.terminal.get().is_none() {
            self.received.fetch_add(len, Ordering::Release);
        }
    }

    /// 响应头里的 Content-Length，只记录第一次
    pub fn set_total(&self, total: u64) {
        let _ = self.total.set(total);
    }

    /// 进入终态。第一次调用生效，返回 false 表示已经是终态
    pub fn finish(&self, status: TaskStatus) -> bool {
        debug_assert!(status.is_terminal());
        self.terminal
            .set(Terminal {
                status,
                received: self.received.load(Ordering::Acquire),
                elapsed: self.started.elapsed(),
            })
            .is_ok()
    }

    pub fn received(&self) -> u64 {
        match self.terminal.get() {
            Some(terminal) => terminal.received,
            None => self.received.load(Ordering::Acquire),
        }
    }

    pub fn total(&self) -> Option<u64> {
        self.total.get().copied()
    }

    pub fn status(&self) -> TaskStatus {
        self.terminal
            .get()
            .map(|t| t.status.clone())
            .unwrap_or(TaskStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.get().is_some()
    }

    pub fn elapsed(&self) -> Duration {
        match self.terminal.get() {
            Some(terminal) => terminal.elapsed,
            None => self.started.elapsed(),
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            protocol: self.protocol,
            received: self.received(),
            total: self.total(),
            status: self.status(),
            elapsed: self.elapsed(),
        }
    }
}

/// 某一时刻的只读快照
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub protocol: Protocol,
    pub received: u64,
    pub total: Option<u64>,
    pub status: TaskStatus,
    pub elapsed: Duration,
}

impl TaskSnapshot {
    /// 整个传输的平均速度 (B/s)
    pub fn average_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.received as f64 / secs
        }
    }
}
