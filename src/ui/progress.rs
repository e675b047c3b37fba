use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::task::{Protocol, TaskSnapshot, TaskStatus, TransferState};

/// 仪表盘中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRow {
    pub protocol: Protocol,
    /// 总大小未知时为 None（不确定进度）
    pub percent: Option<f64>,
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
    /// 上一个轮询周期内的瞬时速度 (B/s)
    pub rate: f64,
    pub eta: Option<Duration>,
    pub status: TaskStatus,
}

impl ProgressRow {
    pub fn label(&self) -> &'static str {
        self.protocol.label()
    }

    pub fn status_text(&self) -> String {
        self.status.to_string()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 上一次采样，只由聚合器读写
#[derive(Debug, Clone, Copy)]
pub struct RateSampler {
    last_at: Instant,
    last_bytes: u64,
}

impl RateSampler {
    pub fn new(now: Instant) -> Self {
        Self { last_at: now, last_bytes: 0 }
    }

    /// 简单差分：(本次字节 - 上次字节) / 间隔，不做平滑
    pub fn sample(&mut self, bytes: u64, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_at).as_secs_f64();
        let delta = bytes.saturating_sub(self.last_bytes);
        self.last_at = now;
        self.last_bytes = bytes;
        if elapsed <= 0.0 {
            0.0
        } else {
            delta as f64 / elapsed
        }
    }
}

pub fn percent(done: u64, total: Option<u64>) -> Option<f64> {
    let total = total?;
    if total == 0 {
        return Some(100.0);
    }
    Some((done as f64 / total as f64 * 100.0).min(100.0))
}

/// 剩余字节 / 当前速度；速度为零或总大小未知时无法估计
pub fn eta(done: u64, total: Option<u64>, rate: f64) -> Option<Duration> {
    let remaining = total?.saturating_sub(done);
    if remaining == 0 {
        return Some(Duration::ZERO);
    }
    if rate <= 0.0 || !rate.is_finite() {
        return None;
    }
    Some(Duration::from_secs_f64(remaining as f64 / rate))
}

pub fn compute_row(snapshot: &TaskSnapshot, sampler: &mut RateSampler, now: Instant) -> ProgressRow {
    let rate = sampler.sample(snapshot.received, now);
    let running = !snapshot.status.is_terminal();
    ProgressRow {
        protocol: snapshot.protocol,
        percent: percent(snapshot.received, snapshot.total),
        bytes_done: snapshot.received,
        bytes_total: snapshot.total,
        rate: if running { rate } else { 0.0 },
        eta: if running { eta(snapshot.received, snapshot.total, rate) } else { None },
        status: snapshot.status.clone(),
    }
}

/// 进度聚合器：按固定周期轮询所有任务状态并生成行
///
/// 行顺序在创建时固定，不会因为任务结束先后而改变。
pub struct Aggregator {
    entries: Vec<(Arc<TransferState>, RateSampler)>,
}

impl Aggregator {
    pub fn new(states: &[Arc<TransferState>], now: Instant) -> Self {
        let mut entries: Vec<_> = states
            .iter()
            .map(|state| (Arc::clone(state), RateSampler::new(now)))
            .collect();
        entries.sort_by_key(|(state, _)| state.protocol());
        Self { entries }
    }

    pub fn poll(&mut self, now: Instant) -> Vec<ProgressRow> {
        self.entries
            .iter_mut()
            .map(|(state, sampler)| compute_row(&state.snapshot(), sampler, now))
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.entries.iter().all(|(state, _)| state.is_terminal())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
