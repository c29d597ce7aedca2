//! 设备池配置模块

mod pool_config;

pub use pool_config::{
    ConfigError, DeviceFarmPlugin, ExecutionMode, PluginSection, PoolSettings, ServerConfig,
    ServerSection, DEVICE_TO_EXECUTE_ENV,
};
