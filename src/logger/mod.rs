//! 日志初始化
//!
//! 控制台输出，配置了日志目录时同时按天滚动写入文件

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 未设置 RUST_LOG 时的默认过滤规则
pub const DEFAULT_FILTER: &str = "device_farm_pool=debug,reqwest=info";

/// 日志文件名前缀
pub const LOG_FILE_PREFIX: &str = "device-pool.log";

/// 初始化全局日志
///
/// 写文件时返回的 `WorkerGuard` 必须由调用方持有，丢弃后缓冲的日志不再写入。
pub fn init_logging<P: AsRef<Path>>(log_dir: Option<P>) -> Result<Option<WorkerGuard>, TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console = fmt::layer().with_target(true);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_ansi(false).with_writer(writer);

            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .try_init()?;

            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()?;

            Ok(None)
        }
    }
}
