pub mod progress;
pub mod sink;

use std::fmt;
use std::time::Duration;

use crossterm::style::Stylize;

use crate::core::orchestrator::RunReport;
use crate::core::task::{Protocol, TaskSnapshot};
use crate::probe::ProbeResult;

pub use progress::{Aggregator, ProgressRow};
pub use sink::{BarsSink, LineSink, RenderSink};

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message.green());
}

pub fn print_error(message: &str) {
    println!("{} {}", "✗".red(), message.red());
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message.yellow());
}

pub fn print_heading(message: &str) {
    println!("\n{}", format!("--- {} ---", message).bold().blue());
}

/// 打印探测结果
pub fn print_capabilities(probe: &ProbeResult) {
    print_heading(&format!("检测 {} 的协议支持", probe.host));

    match &probe.plain.error {
        None if probe.plain.reachable => print_success(&format!("HTTP (端口 {}): 可达", probe.plain_port)),
        error => print_error(&format!(
            "HTTP (端口 {}): 不可达 ({})",
            probe.plain_port,
            error.as_deref().unwrap_or("未知原因")
        )),
    }

    if probe.tls.reachable {
        print_success(&format!(
            "HTTPS (端口 {}): 可达，协商 ALPN: {}",
            probe.tls_port,
            probe.alpn.as_deref().unwrap_or("无")
        ));
    } else {
        print_error(&format!(
            "HTTPS (端口 {}): 失败 ({})",
            probe.tls_port,
            probe.tls.error.as_deref().unwrap_or("未知原因")
        ));
    }

    match (&probe.alt_svc, probe.http3_advertised()) {
        (Some(raw), true) => print_success(&format!("HTTP/3: Alt-Svc 已声明 ({})", raw)),
        _ if probe.tls.reachable => print_warning("HTTP/3: Alt-Svc 未声明"),
        _ => print_warning("HTTP/3: 未检测（HTTPS 不可达）"),
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn format_rate(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return "0.00 B/s".to_string();
    }
    format!("{}/s", format_size(bytes_per_sec as u64))
}

pub fn format_percent(percent: Option<f64>) -> String {
    match percent {
        Some(p) => format!("{:>5.1}%", p),
        None => "   --%".to_string(),
    }
}

pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return "未知".to_string();
    };
    let seconds = eta.as_secs();
    if seconds > 3600 {
        format!("{}h{}m", seconds / 3600, (seconds % 3600) / 60)
    } else if seconds > 60 {
        format!("{}m{}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

/// 运行结束后的对比摘要
pub struct RunSummary<'a> {
    pub rows: &'a [TaskSnapshot],
    pub interrupted: bool,
}

impl<'a> From<&'a RunReport> for RunSummary<'a> {
    fn from(report: &'a RunReport) -> Self {
        Self {
            rows: &report.snapshots,
            interrupted: report.interrupted,
        }
    }
}

impl fmt::Display for RunSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n下载摘要:")?;
        if self.interrupted {
            writeln!(f, "（测试被用户中断，以下为中断时的数据）")?;
        }
        for snapshot in self.rows {
            writeln!(
                f,
                "{:>16} | {:>12} | {:>8.2}秒 | {:>12} | {}",
                snapshot.protocol.label(),
                format_size(snapshot.received),
                snapshot.elapsed.as_secs_f64(),
                format_rate(snapshot.average_rate()),
                snapshot.status
            )?;
        }
        if let Some(fastest) = fastest_completed(self.rows) {
            writeln!(f, "最快: {}", fastest)?;
        }
        Ok(())
    }
}

/// 已完成任务中平均速度最高的协议
pub fn fastest_completed(rows: &[TaskSnapshot]) -> Option<Protocol> {
    rows.iter()
        .filter(|s| s.status == crate::core::task::TaskStatus::Completed && s.received > 0)
        .max_by(|a, b| a.average_rate().total_cmp(&b.average_rate()))
        .map(|s| s.protocol)
}
