use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use device_farm_pool::{logger, DevicePool, PoolSettings};
use reqwest::Url;
use tracing::{info, warn};

/// 配置文件路径的环境变量名
const CONFIG_ENV: &str = "DEVICE_POOL_CONFIG";
const DEFAULT_CONFIG: &str = "device-pool.toml";

/// 本地自动化服务地址的环境变量名
const LOCAL_SERVER_ENV: &str = "LOCAL_SERVER_URL";
const DEFAULT_LOCAL_SERVER: &str = "http://127.0.0.1:4723";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let config_exists = Path::new(&config_path).exists();

    let settings = if config_exists {
        PoolSettings::from_path(&config_path)
            .with_context(|| format!("加载配置文件失败: {config_path}"))?
    } else {
        PoolSettings::default()
    }
    .apply_env_overrides()?;

    // 初始化日志系统
    let _guard = logger::init_logging(settings.log_dir.as_deref())?;

    if !config_exists {
        warn!("配置文件 {} 不存在，使用默认配置", config_path);
    }
    info!("执行模式: {}", settings.device_to_execute);

    let local_server = std::env::var(LOCAL_SERVER_ENV).unwrap_or_else(|_| DEFAULT_LOCAL_SERVER.to_string());
    let local_server = Url::parse(&local_server)
        .with_context(|| format!("无效的本地服务地址: {local_server}"))?;

    let endpoint = settings.resolve_endpoint(Some(&local_server))?;
    info!("自动化服务地址: {}", endpoint);

    let pool = Arc::new(DevicePool::from_settings(&settings, Some(&local_server))?);

    for device in pool.load().await? {
        info!(
            udid = %device.udid,
            busy = device.busy,
            name = device.name().unwrap_or("-"),
            platform = device.platform().unwrap_or("-"),
            "发现设备"
        );
    }

    let status = pool.status().await?;
    info!(
        "设备总数 {}，空闲 {}，忙碌 {}",
        status.total, status.free, status.busy
    );

    Ok(())
}
