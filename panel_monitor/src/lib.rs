//! `panel_monitor` 队列实时通道监视器的核心库。
//!
//! 主要模块包括：
//! - `config`: 管理监视器的配置信息加载与保存。
//! - `error`: 定义监视器特定的错误类型。
//! - `events`: 记录入站队列事件并生成需要的回复。

pub mod config;
pub mod error;
pub mod events;
