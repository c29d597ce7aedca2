//! 设备池模块
//!
//! 提供设备的懒加载缓存、忙碌状态查询以及原子的占用与释放

mod device_pool;
mod types;

pub use device_pool::DevicePool;
pub use types::{PoolEvent, PoolOptions, PoolStatus, MIN_POLL_INTERVAL};
