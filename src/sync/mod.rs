//! 远程状态同步模块
//!
//! 远程模式下把设备的忙碌/空闲变化推送到设备农场 Hub

mod hub_sync;

use async_trait::async_trait;

pub use hub_sync::HubStatusSync;

/// 设备状态同步
#[async_trait]
pub trait StatusSync: Send + Sync {
    /// 推送设备忙碌状态
    async fn push(&self, udid: &str, busy: bool) -> Result<(), SyncError>;
}

/// 状态同步错误
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Hub 拒绝更新: {status}")]
    Rejected { status: u16 },

    #[error("无法拼接设备接口地址: {0}")]
    InvalidUrl(String),
}
