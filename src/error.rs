use thiserror::Error;

use crate::config::{ConfigError, ExecutionMode};
use crate::inventory::InventoryError;

/// 设备池统一错误类型
#[derive(Error, Debug)]
pub enum PoolError {
    /// 设备清单获取失败，设备池保持未加载状态
    #[error("设备清单不可用 ({backend}): {source}")]
    SourceUnavailable {
        backend: ExecutionMode,
        #[source]
        source: InventoryError,
    },

    /// 设备列表尚未加载
    #[error("设备列表未加载，请先调用 load()")]
    NotLoaded,

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// PoolError 的 Result 类型别名
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// 调用方稍后重试是否可能成功
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::SourceUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_source_errors_are_retryable() {
        let unavailable = PoolError::SourceUnavailable {
            backend: ExecutionMode::DeviceFarm,
            source: InventoryError::DuplicateUdid("d1".to_string()),
        };
        assert!(unavailable.is_retryable());
        assert!(unavailable.to_string().contains("devicefarm"));

        assert!(!PoolError::NotLoaded.is_retryable());
        assert!(!PoolError::Config(ConfigError::MissingHub).is_retryable());
    }
}
