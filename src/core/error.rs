use thiserror::Error;
use std::error::Error as StdError;

/// 致命错误：探测阶段或启动阶段出现，直接终止本次运行
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("不支持的协议: {0}（仅支持 http 与 https）")]
    UnsupportedScheme(String),

    #[error("无法解析主机 {host}: {reason}")]
    Resolve {
        host: String,
        reason: String,
    },

    #[error("主机 {host} 没有可测试的协议（HTTP 与 HTTPS 均不可达或已被过滤）")]
    NothingToTest {
        host: String,
    },

    #[error("无法创建 HTTP 客户端: {0}")]
    Client(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 单个下载任务内部的错误，只会记录为该任务的失败状态，不会向外传播
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("网络错误: {0}")]
    Network(String),

    #[error("服务器返回状态码 {0}")]
    Status(u16),

    #[error("下载超时")]
    Timeout,

    #[error("协商到 {actual} 而不是 {expected}")]
    ProtocolMismatch {
        expected: String,
        actual: String,
    },

    /// 用户中断，任务在宽限期内停止或被强制中止
    #[error("已中断")]
    Cancelled,
}

impl From<reqwest::Error> for DownloadError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            DownloadError::Timeout
        } else {
            DownloadError::Network(error_chain(&error))
        }
    }
}

/// 把错误及其 source 链拼成一行，reqwest 的顶层信息往往不包含真正原因
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}
