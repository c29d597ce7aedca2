//! 设备池相关的类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 重新检查间隔的下限
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 设备池运行参数
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// 首次查询时自动加载设备列表；关闭后未加载时返回 `NotLoaded`
    pub auto_load: bool,

    /// 限时等待空闲设备时的重新检查间隔，不低于 [`MIN_POLL_INTERVAL`]
    pub wait_poll_interval: Duration,
}

impl PoolOptions {
    /// 实际使用的重新检查间隔
    pub fn poll_interval(&self) -> Duration {
        self.wait_poll_interval.max(MIN_POLL_INTERVAL)
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            auto_load: true,
            wait_poll_interval: Duration::from_millis(500),
        }
    }
}

/// 设备池事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// 设备列表已加载
    Loaded { count: usize },

    /// 设备列表已清空
    Reset,

    /// 设备被占用
    Acquired { udid: String },

    /// 设备被释放
    Released { udid: String },

    /// 设备状态被直接修改
    BusyChanged { udid: String, busy: bool },
}

/// 设备池状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub total: usize,
    pub free: usize,
    pub busy: usize,
    pub loaded_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_floor() {
        let options = PoolOptions {
            wait_poll_interval: Duration::ZERO,
            ..PoolOptions::default()
        };
        assert_eq!(options.poll_interval(), MIN_POLL_INTERVAL);
        assert_eq!(
            PoolOptions::default().poll_interval(),
            Duration::from_millis(500)
        );
    }
}
