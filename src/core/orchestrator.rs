//! 编排：探测 -> 选择任务 -> 并发下载 -> 结束
//!
//! 聚合器就是编排器自己的轮询循环，它只在定时器和中断信号上等待，
//! 从不等待某个下载任务结束，因此一个卡住的传输不会挡住其他行的刷新。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::engine::{HttpEngine, StreamRequest};
use crate::core::error::SetupError;
use crate::core::target::Target;
use crate::core::task::{run_transfer, Protocol, TaskSnapshot, TaskStatus, TransferState};
use crate::probe::{ProbeResult, Prober};
use crate::ui::{Aggregator, RenderSink};

/// 运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Probing,
    TaskSelection,
    Downloading,
    Finished,
}

/// 根据探测结果选择要启动的协议，顺序固定为 Plain、TLS、HTTP/2、HTTP/3
pub fn select_protocols(probe: &ProbeResult) -> Vec<Protocol> {
    let mut selected = Vec::with_capacity(Protocol::ALL.len());
    if probe.plain.reachable {
        selected.push(Protocol::Http1Plain);
    }
    if probe.tls.reachable {
        selected.push(Protocol::Http1Tls);
    }
    if probe.http2_negotiated() {
        selected.push(Protocol::Http2);
    }
    // QUIC 在连接时才协商，只要声明了就尝试
    if probe.http3_advertised() {
        selected.push(Protocol::Http3);
    }
    selected
}

/// 用 `--only` 进一步收窄，不会加入探测排除的协议
pub fn narrow(selected: Vec<Protocol>, only: &[Protocol]) -> Vec<Protocol> {
    if only.is_empty() {
        return selected;
    }
    selected.into_iter().filter(|p| only.contains(p)).collect()
}

/// 一次运行的参数
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
    pub cancel_grace: Duration,
    pub only: Vec<Protocol>,
}

impl RunSettings {
    pub fn from_config(config: &Config, only: &[Protocol]) -> Self {
        Self {
            probe_timeout: Duration::from_secs(config.probe_timeout),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            cancel_grace: Duration::from_millis(config.cancel_grace_ms),
            only: only.to_vec(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&Config::default(), &[])
    }
}

/// 一次运行的结果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub probe: ProbeResult,
    /// 按行顺序排列的最终快照
    pub snapshots: Vec<TaskSnapshot>,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn snapshot(&self, protocol: Protocol) -> Option<&TaskSnapshot> {
        self.snapshots.iter().find(|s| s.protocol == protocol)
    }
}

pub struct Orchestrator<E: HttpEngine> {
    engine: Arc<E>,
    settings: RunSettings,
    phase: Phase,
}

impl<E: HttpEngine> Orchestrator<E> {
    pub fn new(engine: Arc<E>, settings: RunSettings) -> Self {
        Self {
            engine,
            settings,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        log::debug!("阶段: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// 探测阶段，致命错误直接进入 Finished
    pub async fn probe(&mut self, target: &Target) -> Result<ProbeResult, SetupError> {
        self.enter(Phase::Probing);
        let result = Prober::new(self.engine.as_ref(), self.settings.probe_timeout)
            .run(target)
            .await;
        if let Err(e) = &result {
            log::error!("探测失败: {}", e);
            self.enter(Phase::Finished);
        }
        result
    }

    /// 探测，同时等待中断；探测期间被中断时返回 None 并直接结束
    pub async fn probe_until<F>(
        &mut self,
        target: &Target,
        interrupt: F,
    ) -> Result<Option<ProbeResult>, SetupError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let outcome = tokio::select! {
            biased;
            _ = &mut interrupt => None,
            result = self.probe(target) => Some(result),
        };
        match outcome {
            Some(result) => result.map(Some),
            None => {
                log::warn!("探测阶段收到中断信号，不再启动下载");
                self.enter(Phase::Finished);
                Ok(None)
            }
        }
    }

    /// 选择任务集合，一旦确定不再变化；为空时是致命错误
    pub fn select(&mut self, probe: &ProbeResult) -> Result<Vec<Protocol>, SetupError> {
        self.enter(Phase::TaskSelection);
        let selected = narrow(select_protocols(probe), &self.settings.only);
        if selected.is_empty() {
            self.enter(Phase::Finished);
            return Err(SetupError::NothingToTest {
                host: probe.host.clone(),
            });
        }
        log::info!("选择的协议: {:?}", selected);
        Ok(selected)
    }

    /// 并发下载阶段，直到所有任务进入终态或 `interrupt` 完成
    pub async fn download<S, F>(
        &mut self,
        target: &Target,
        probe: &ProbeResult,
        selected: &[Protocol],
        sink: &mut S,
        interrupt: F,
    ) -> RunReport
    where
        S: RenderSink + ?Sized,
        F: Future<Output = ()>,
    {
        self.enter(Phase::Downloading);
        let started = Instant::now();
        let cancel = CancellationToken::new();

        let mut protocols = selected.to_vec();
        protocols.sort();
        protocols.dedup();

        let alt = probe.http3_authority();
        let mut states = Vec::with_capacity(protocols.len());
        let mut handles = Vec::with_capacity(protocols.len());
        for protocol in protocols {
            let state = Arc::new(TransferState::new(protocol));
            let request = StreamRequest {
                url: target.url_for(protocol, &alt),
                protocol,
            };
            let engine = Arc::clone(&self.engine);
            let task_state = Arc::clone(&state);
            let token = cancel.child_token();
            handles.push(tokio::spawn(async move {
                run_transfer(engine.as_ref(), request, &task_state, &token).await;
            }));
            states.push(state);
        }

        let mut aggregator = Aggregator::new(&states, Instant::now());
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(interrupt);

        let mut interrupted = false;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let rows = aggregator.poll(Instant::now());
                    sink.render_frame(&rows);
                    if aggregator.all_terminal() || handles.iter().all(JoinHandle::is_finished) {
                        break;
                    }
                }
                _ = &mut interrupt => {
                    log::warn!("收到中断信号，正在取消 {} 个任务", states.len());
                    interrupted = true;
                    break;
                }
            }
        }

        if interrupted {
            cancel.cancel();
            self.settle(handles, &states).await;
        } else {
            reap(handles, &states).await;
        }

        let rows = aggregator.poll(Instant::now());
        sink.finish(&rows);
        self.enter(Phase::Finished);

        RunReport {
            probe: probe.clone(),
            snapshots: states.iter().map(|s| s.snapshot()).collect(),
            interrupted,
            elapsed: started.elapsed(),
        }
    }

    /// 完整运行：探测、选择、下载。下载开始前被中断时返回 None
    pub async fn run<S, F>(
        &mut self,
        target: &Target,
        sink: &mut S,
        interrupt: F,
    ) -> Result<Option<RunReport>, SetupError>
    where
        S: RenderSink + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let Some(probe) = self.probe_until(target, interrupt.as_mut()).await? else {
            return Ok(None);
        };
        let selected = self.select(&probe)?;
        let report = self
            .download(target, &probe, &selected, sink, interrupt.as_mut())
            .await;
        Ok(Some(report))
    }

    /// 取消后在宽限期内等待任务收尾，超时的任务被强制中止并记为中断
    async fn settle(&self, handles: Vec<JoinHandle<()>>, states: &[Arc<TransferState>]) {
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        match tokio::time::timeout(self.settings.cancel_grace, join_all(handles)).await {
            Ok(_) => log::info!("所有任务已在宽限期内停止"),
            Err(_) => {
                log::warn!("{:?} 内仍有任务未停止，强制中止", self.settings.cancel_grace);
                for abort in aborts {
                    abort.abort();
                }
            }
        }
        for state in states {
            if state.finish(TaskStatus::interrupted()) {
                log::warn!("[{}] 被强制标记为中断", state.protocol());
            }
        }
    }
}

/// 回收已经结束的任务；异常退出（panic）的任务记为失败
async fn reap(handles: Vec<JoinHandle<()>>, states: &[Arc<TransferState>]) {
    for (result, state) in join_all(handles).await.into_iter().zip(states) {
        if let Err(e) = result {
            log::error!("[{}] 任务异常退出: {}", state.protocol(), e);
            state.finish(TaskStatus::Failed(format!("任务异常退出: {}", e)));
        }
    }
}
