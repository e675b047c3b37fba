//! `task` 模块包含与单个协议下载相关的逻辑
//!
//! - `state`: 共享状态 `TransferState`、协议标签与终态 `TaskStatus`
//! - `download`: 实际的流式下载 `run_transfer`

pub mod state;
pub mod download;

pub use state::{HttpVersion, Protocol, TaskSnapshot, TaskStatus, TransferState};
pub use download::{run_transfer, UNKNOWN_LOCATION};
