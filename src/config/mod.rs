use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use log::LevelFilter;
use crate::core::error::SetupError;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 探测阶段单个请求的超时时间（秒），同时作为连接超时
    pub probe_timeout: u64,
    /// 单个下载任务的总超时时间（秒）
    pub transfer_timeout: u64,
    /// 仪表盘刷新间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 中断后等待任务收尾的时间（毫秒）
    pub cancel_grace_ms: u64,
    /// TLS 变体最多跟随的重定向次数
    pub max_redirects: usize,
    /// User-Agent
    pub user_agent: String,
    /// 明文 HTTP 默认端口
    pub http_port: u16,
    /// HTTPS 默认端口
    pub https_port: u16,
    /// 日志文件路径
    pub log_file: String,
    /// 日志级别：error / warn / info / debug / trace / off
    pub log_level: String,
    /// 日志文件轮转大小（字节）
    pub log_max_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_timeout: 5,
            transfer_timeout: 300,
            poll_interval_ms: 200,
            cancel_grace_ms: 2000,
            max_redirects: 10,
            user_agent: format!("protoprobe/{}", env!("CARGO_PKG_VERSION")),
            http_port: 80,
            https_port: 443,
            log_file: default_log_path(),
            log_level: "info".to_string(),
            log_max_size: 10 * 1024 * 1024,
        }
    }
}

/// 日志默认放在配置文件旁边
fn default_log_path() -> String {
    let config_path = crate::cli::default_config_path();
    match Path::new(&config_path).parent() {
        Some(dir) => dir.join("protoprobe.log").to_string_lossy().to_string(),
        None => "protoprobe.log".to_string(),
    }
}

impl Config {
    /// 加载配置文件，不存在时写入默认配置，格式错误时回退到默认配置
    pub fn load(path: &str) -> Result<Self, SetupError> {
        if !Path::new(path).exists() {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                eprintln!("配置文件格式错误: {}，将使用默认配置（文件未被修改）", e);
                Ok(Config::default())
            }
        }
    }

    /// 保存带教程的配置文件（唯一写入方法）
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), SetupError> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| SetupError::Config(format!("无法序列化配置: {}", e)))?;
        let full_content = format!("{}\n{}", Config::generate_tutorial_content(), config_content);
        fs::write(path, full_content)?;
        Ok(())
    }

    /// 生成配置文件教程内容
    fn generate_tutorial_content() -> &'static str {
        r#"# protoprobe 配置文件
# ====================
#
# TOML 格式。命令行参数会覆盖这里的设置，优先级：命令行 > 配置文件 > 默认值
#
# 配置文件位置：
# - Windows: %APPDATA%/protoprobe/protoprobe.conf
# - macOS: ~/Library/Application Support/protoprobe/protoprobe.conf
# - Linux: ~/.config/protoprobe/protoprobe.conf
#
# 使用示例：
#   protoprobe example.com/big.iso                 # 探测并并发测试所有支持的协议
#   protoprobe --probe-only example.com            # 只检测协议支持
#   protoprobe --only h2 --only h3 example.com/f   # 只测试 HTTP/2 与 HTTP/3
#   protoprobe --plain example.com/f > result.txt  # 逐行输出，适合重定向到文件
#
# ==================== 配置项说明 ====================
#
# probe_timeout     探测超时（秒），也是下载时的连接超时
# transfer_timeout  单个下载的总超时（秒），大文件请调大
# poll_interval_ms  进度刷新间隔（毫秒），范围 50-1000
# cancel_grace_ms   Ctrl-C 后等待任务停止的时间（毫秒）
# max_redirects     HTTPS 变体最多跟随的重定向次数；明文 HTTP 从不跟随
# http_port         明文 HTTP 的默认端口
# https_port        HTTPS / HTTP/3 的默认端口
# log_file          日志文件，超过 log_max_size 字节后轮转为 .backup
# log_level         error / warn / info / debug / trace / off
"#
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.probe_timeout == 0 {
            return Err(SetupError::Config("探测超时必须大于0".to_string()));
        }

        if self.transfer_timeout == 0 {
            return Err(SetupError::Config("下载超时必须大于0".to_string()));
        }

        if !(50..=1000).contains(&self.poll_interval_ms) {
            return Err(SetupError::Config("刷新间隔必须在 50-1000 毫秒之间".to_string()));
        }

        if self.http_port == 0 || self.https_port == 0 {
            return Err(SetupError::Config("端口必须大于0".to_string()));
        }

        if self.log_file.is_empty() {
            return Err(SetupError::Config("日志文件路径不能为空".to_string()));
        }

        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(SetupError::Config(format!("无效的日志级别: {}", self.log_level)));
        }

        Ok(())
    }

    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(timeout) = args.probe_timeout {
            self.probe_timeout = timeout;
        }

        if let Some(timeout) = args.timeout {
            self.transfer_timeout = timeout;
        }

        if let Some(interval) = args.interval {
            self.poll_interval_ms = interval;
        }
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 探测超时: {} 秒\n\
            - 下载超时: {} 秒\n\
            - 刷新间隔: {} 毫秒\n\
            - 端口: HTTP {} / HTTPS {}\n\
            - 日志: {} ({})",
            self.probe_timeout,
            self.transfer_timeout,
            self.poll_interval_ms,
            self.http_port,
            self.https_port,
            self.log_file,
            self.log_level
        )
    }
}
