//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 探测并测试：`protoprobe <url>`
//! - 只探测：`protoprobe --probe-only <url>`
//! - 限定协议：`protoprobe --only h2 --only h3 <url>`
//! - 编辑配置：`protoprobe -e`
//! - 指定配置：`protoprobe -c config.conf <url>`
//!
//! ## 平台支持
//!
//! - Windows: `%APPDATA%/protoprobe/protoprobe.conf`
//! - macOS: `~/Library/Application Support/protoprobe/protoprobe.conf`
//! - Linux: `~/.config/protoprobe/protoprobe.conf`

use clap::Parser;
use std::env;
use crate::config::Config;
use crate::core::error::SetupError;
use crate::core::task::Protocol;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/protoprobe/protoprobe.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/protoprobe/protoprobe.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/protoprobe/protoprobe.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 $EDITOR，其次 xdg-open，最后 nano
        if let Ok(editor) = env::var("EDITOR") {
            if std::process::Command::new(editor).arg(config_path).status().is_ok() {
                return;
            }
        }
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n构建时间: ",
    env!("VERGEN_BUILD_DATE"),
    "\n提交: ",
    env!("VERGEN_GIT_SHA")
);

/// protoprobe 命令行参数
///
/// 示例用法：
///   protoprobe https://example.com/big.iso
///   protoprobe --probe-only example.com
///   protoprobe --only h2 --only h3 example.com/big.iso
///   protoprobe -e  # 编辑配置文件
#[derive(Parser, Debug, Clone)]
#[command(
    name = "protoprobe",
    author = "panzhifu",
    version = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    about = "检测服务器支持的 HTTP 协议，并用每种协议并发下载同一资源进行对比",
    long_about = "先探测目标主机的 HTTP、HTTPS（ALPN）与 Alt-Svc，再用 HTTP/1.1、HTTPS、HTTP/2、HTTP/3 同时下载同一个 URL，实时显示各协议的速度。\n\n示例：\n  protoprobe https://example.com/big.iso\n  protoprobe --probe-only example.com\n  protoprobe --only h2 --only h3 example.com/big.iso\n  protoprobe -e\n"
)]
pub struct Args {
    /// 目标 URL，省略协议时默认 https
    #[arg(required_unless_present = "edit_config", help = "目标 URL，省略协议时默认 https。")]
    pub url: Option<String>,

    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件（-e 或 --edit）
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    #[arg(long, value_name = "SECS", help = "探测超时（秒），覆盖配置文件中的设置。")]
    pub probe_timeout: Option<u64>,

    #[arg(long, value_name = "SECS", help = "单个下载的总超时（秒），覆盖配置文件中的设置。")]
    pub timeout: Option<u64>,

    #[arg(long, value_name = "MS", help = "进度刷新间隔（毫秒，50-1000）。")]
    pub interval: Option<u64>,

    /// 只测试这些协议（可重复），不会加入探测阶段排除的协议
    #[arg(long, value_enum, value_name = "PROTO", help = "只测试指定协议，可重复：plain / tls / h2 / h3。")]
    pub only: Vec<Protocol>,

    #[arg(long, help = "逐行输出进度，不使用进度条。")]
    pub plain: bool,

    #[arg(long, help = "只显示协议探测结果，不进行下载。")]
    pub probe_only: bool,
}

impl Args {
    /// 解析命令行参数并加载配置
    pub fn parse_args() -> Result<(Self, Config), SetupError> {
        let args = Args::parse();

        // 文件不存在时先写入默认配置，再打开编辑器
        if args.edit_config {
            Config::load(&args.config)?;
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let config = args.load_config()?;
        Ok((args, config))
    }

    /// 加载或创建配置文件，合并命令行参数后校验
    pub fn load_config(&self) -> Result<Config, SetupError> {
        let mut config = Config::load(&self.config)
            .map_err(|e| SetupError::Config(format!("无法读取配置文件 {}: {}", self.config, e)))?;
        config.merge_from_args(self);
        config.validate()?;
        Ok(config)
    }

    pub fn target(&self) -> Result<&str, SetupError> {
        self.url
            .as_deref()
            .ok_or_else(|| SetupError::InvalidUrl("未提供目标 URL".to_string()))
    }
}
