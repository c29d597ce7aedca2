//! 设备农场设备池
//!
//! 为并发执行的测试任务分配移动测试设备。设备清单来自本地自动化服务的
//! device-farm 接口或远程设备农场 Hub，设备池在首次使用时加载并缓存，
//! 保证同一台设备不会同时分配给两个任务。

pub mod config;
pub mod device;
pub mod error;
pub mod inventory;
pub mod logger;
pub mod pool;
pub mod sync;

// 重新导出核心类型
pub use config::{ConfigError, ExecutionMode, PoolSettings};
pub use device::Device;
pub use error::{PoolError, Result};
pub use inventory::{HttpInventory, InventoryError, InventorySource};
pub use pool::{DevicePool, PoolEvent, PoolOptions, PoolStatus};
pub use sync::{HubStatusSync, StatusSync, SyncError};
