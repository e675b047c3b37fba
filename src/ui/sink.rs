use std::io::{self, Write};
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::core::task::{Protocol, TaskStatus};
use super::progress::ProgressRow;
use super::{format_eta, format_percent, format_rate, format_size};

/// 渲染输出端：给定有序的行，绘制一帧
pub trait RenderSink: Send {
    fn render_frame(&mut self, rows: &[ProgressRow]);

    /// 最后一帧，之后不再调用
    fn finish(&mut self, rows: &[ProgressRow]);
}

const BAR_TEMPLATE: &str = "{prefix:>16.bold.blue} [{bar:30.cyan/blue}] {msg}";
const SPINNER_TEMPLATE: &str = "{prefix:>16.bold.blue} {spinner:.cyan} {msg}";

fn style(template: &str, fallback: fn() -> ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| fallback())
}

/// 一行的文字部分：百分比 • 已下载/总量 • 速度 • 剩余时间
pub fn row_message(row: &ProgressRow) -> String {
    if row.is_terminal() {
        return format!(
            "{} • {} • {}",
            format_percent(row.percent),
            format_transfer(row.bytes_done, row.bytes_total),
            row.status_text()
        );
    }
    format!(
        "{} • {} • {} • ETA {}",
        format_percent(row.percent),
        format_transfer(row.bytes_done, row.bytes_total),
        format_rate(row.rate),
        format_eta(row.eta)
    )
}

fn format_transfer(done: u64, total: Option<u64>) -> String {
    match total {
        Some(total) => format!("{}/{}", format_size(done), format_size(total)),
        None => format!("{}/?", format_size(done)),
    }
}

/// 终端进度条，每个协议一条
pub struct BarsSink {
    _multi: MultiProgress,
    bars: Vec<(Protocol, ProgressBar, bool)>,
}

impl BarsSink {
    pub fn new(protocols: &[Protocol]) -> Self {
        Self::with_target(protocols, ProgressDrawTarget::stderr())
    }

    pub fn with_target(protocols: &[Protocol], target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let bars = protocols
            .iter()
            .map(|protocol| {
                let bar = multi.add(ProgressBar::new(0));
                bar.set_style(style(SPINNER_TEMPLATE, ProgressStyle::default_spinner));
                bar.set_prefix(protocol.label());
                bar.set_message("连接中...");
                (*protocol, bar, false)
            })
            .collect();
        Self { _multi: multi, bars }
    }

    fn apply(&mut self, rows: &[ProgressRow]) {
        for row in rows {
            let Some((_, bar, sized)) = self.bars.iter_mut().find(|(p, _, _)| *p == row.protocol) else {
                continue;
            };
            if bar.is_finished() {
                continue;
            }
            if let (Some(total), false) = (row.bytes_total, *sized) {
                bar.set_style(style(BAR_TEMPLATE, ProgressStyle::default_bar));
                bar.set_length(total);
                *sized = true;
            }
            bar.set_position(row.bytes_done);
            if !*sized {
                bar.tick();
            }

            let message = row_message(row);
            match &row.status {
                TaskStatus::Running => bar.set_message(message),
                TaskStatus::Completed => bar.finish_with_message(message),
                TaskStatus::Failed(_) | TaskStatus::Redirected(_) => bar.abandon_with_message(message),
            }
        }
    }
}

impl RenderSink for BarsSink {
    fn render_frame(&mut self, rows: &[ProgressRow]) {
        self.apply(rows);
    }

    fn finish(&mut self, rows: &[ProgressRow]) {
        self.apply(rows);
        for (_, bar, _) in &self.bars {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

/// 非终端环境下的逐行输出，状态变化时立即输出，其余时间按固定间隔
pub struct LineSink<W: Write + Send> {
    out: W,
    every: Duration,
    last_print: Option<Instant>,
    last_status: Vec<TaskStatus>,
}

pub const LINE_INTERVAL: Duration = Duration::from_secs(1);

impl LineSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), LINE_INTERVAL)
    }
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(out: W, every: Duration) -> Self {
        Self {
            out,
            every,
            last_print: None,
            last_status: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_rows(&mut self, rows: &[ProgressRow]) {
        for row in rows {
            if let Err(e) = writeln!(self.out, "{:>16}  {}", row.label(), row_message(row)) {
                log::warn!("进度输出失败: {}", e);
                return;
            }
        }
        let _ = self.out.flush();
        self.last_print = Some(Instant::now());
        self.last_status = rows.iter().map(|r| r.status.clone()).collect();
    }
}

impl<W: Write + Send> RenderSink for LineSink<W> {
    fn render_frame(&mut self, rows: &[ProgressRow]) {
        let changed = rows.len() != self.last_status.len()
            || rows.iter().zip(&self.last_status).any(|(row, last)| row.status != *last);
        let due = self.last_print.map_or(true, |at| at.elapsed() >= self.every);
        if changed || due {
            self.write_rows(rows);
        }
    }

    fn finish(&mut self, rows: &[ProgressRow]) {
        self.write_rows(rows);
    }
}
