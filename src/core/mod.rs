//! Core: 目标解析、客户端引擎、下载任务与编排逻辑

pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod reqwest_engine;
pub mod target;
pub mod task;

pub use engine::{EndpointProbe, HttpEngine, StreamRequest, StreamResponse};
pub use error::{DownloadError, SetupError};
pub use orchestrator::{select_protocols, Orchestrator, Phase, RunReport, RunSettings};
pub use reqwest_engine::ReqwestEngine;
pub use target::{AltAuthority, Target};
pub use task::{Protocol, TaskStatus, TransferState};
