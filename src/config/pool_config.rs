use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::pool::PoolOptions;

/// 执行模式的环境变量名
pub const DEVICE_TO_EXECUTE_ENV: &str = "DEVICE_TO_EXECUTE";

/// 设备来源的执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExecutionMode {
    /// 本地自动化服务发现的设备
    #[default]
    Local,
    /// 远程设备农场 Hub 管理的设备
    DeviceFarm,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Local => "local",
            ExecutionMode::DeviceFarm => "devicefarm",
        }
    }

    /// 是否使用远程 Hub
    pub fn is_remote(&self) -> bool {
        matches!(self, ExecutionMode::DeviceFarm)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case("local") {
            Ok(ExecutionMode::Local)
        } else if value.eq_ignore_ascii_case("devicefarm") {
            Ok(ExecutionMode::DeviceFarm)
        } else {
            Err(ConfigError::UnknownMode(value.to_string()))
        }
    }
}

impl TryFrom<String> for ExecutionMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExecutionMode> for String {
    fn from(mode: ExecutionMode) -> Self {
        mode.as_str().to_string()
    }
}

/// 自动化服务配置，对应 `server.plugin.device-farm.hub`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub plugin: PluginSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginSection {
    #[serde(rename = "device-farm", default, skip_serializing_if = "Option::is_none")]
    pub device_farm: Option<DeviceFarmPlugin>,
}

/// device-farm 插件配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceFarmPlugin {
    /// Hub 地址
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub: Option<String>,
}

/// 设备池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// 执行模式：local 或 devicefarm
    #[serde(default, alias = "deviceToExecute")]
    pub device_to_execute: ExecutionMode,

    /// 自动化服务配置（远程模式下从中读取 Hub 地址）
    #[serde(default, alias = "serverConfig", skip_serializing_if = "Option::is_none")]
    pub server_config: Option<ServerConfig>,

    /// HTTP 请求超时时间（秒）
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// 首次查询时是否自动加载设备列表
    #[serde(default = "default_auto_load")]
    pub auto_load: bool,

    /// 限时等待空闲设备时的轮询间隔（毫秒）
    #[serde(default = "default_wait_poll_interval_ms")]
    pub wait_poll_interval_ms: u64,

    /// 日志目录，为空时只输出到控制台
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_auto_load() -> bool {
    true
}

fn default_wait_poll_interval_ms() -> u64 {
    500
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            device_to_execute: ExecutionMode::default(),
            server_config: None,
            http_timeout_secs: default_http_timeout_secs(),
            auto_load: default_auto_load(),
            wait_poll_interval_ms: default_wait_poll_interval_ms(),
            log_dir: None,
        }
    }
}

impl PoolSettings {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从 JSON 能力文件加载配置
    ///
    /// 服务配置读取自 `serverConfig` 键，执行模式读取自可选的 `deviceToExecute` 键，
    /// 其余能力项忽略。
    pub fn from_capabilities_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 按扩展名选择加载方式，`.json` 视为能力文件，其余按 TOML 解析
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_capabilities_file(path)
        } else {
            Self::from_file(path)
        }
    }

    /// 使用环境变量覆盖配置
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides_with(|key| std::env::var(key).ok())
    }

    /// 使用给定的查找函数覆盖配置
    pub fn apply_overrides_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(DEVICE_TO_EXECUTE_ENV) {
            self.device_to_execute = mode.parse()?;
        }
        Ok(self)
    }

    /// 解析远程 Hub 地址
    pub fn hub_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .server_config
            .as_ref()
            .and_then(|config| config.server.plugin.device_farm.as_ref())
            .and_then(|plugin| plugin.hub.as_deref())
            .map(str::trim)
            .filter(|hub| !hub.is_empty())
            .ok_or(ConfigError::MissingHub)?;

        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidHub {
            value: raw.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(ConfigError::InvalidHub {
                value: raw.to_string(),
                reason: format!("不支持的协议: {}", url.scheme()),
            });
        }

        Ok(url)
    }

    /// 自动化服务地址：远程模式为 Hub 地址，本地模式为本地服务地址
    pub fn resolve_endpoint(&self, local_server: Option<&Url>) -> Result<Url, ConfigError> {
        match self.device_to_execute {
            ExecutionMode::DeviceFarm => self.hub_url(),
            ExecutionMode::Local => local_server.cloned().ok_or(ConfigError::MissingLocalServer),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// 设备池运行参数
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            auto_load: self.auto_load,
            wait_poll_interval: Duration::from_millis(self.wait_poll_interval_ms),
        }
    }
}

/// 配置错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO 错误: {0}")]
    IoError(String),

    #[error("解析错误: {0}")]
    ParseError(String),

    #[error("未知的执行模式: {0}（可选值: local, devicefarm）")]
    UnknownMode(String),

    #[error("缺少 Hub 地址: server.plugin.device-farm.hub")]
    MissingHub,

    #[error("无效的 Hub 地址 {value}: {reason}")]
    InvalidHub { value: String, reason: String },

    #[error("本地模式缺少自动化服务地址")]
    MissingLocalServer,

    #[error("无效的本地服务地址 {value}: {reason}")]
    InvalidLocalServer { value: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn farm_settings(hub: &str) -> PoolSettings {
        PoolSettings {
            device_to_execute: ExecutionMode::DeviceFarm,
            server_config: Some(ServerConfig {
                server: ServerSection {
                    plugin: PluginSection {
                        device_farm: Some(DeviceFarmPlugin {
                            hub: Some(hub.to_string()),
                        }),
                    },
                },
            }),
            ..PoolSettings::default()
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = PoolSettings::default();
        assert_eq!(settings.device_to_execute, ExecutionMode::Local);
        assert_eq!(settings.http_timeout(), Duration::from_secs(30));
        assert!(settings.pool_options().auto_load);
        assert_eq!(
            settings.pool_options().wait_poll_interval,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_mode_is_case_insensitive() {
        assert_eq!("DeviceFarm".parse::<ExecutionMode>().unwrap(), ExecutionMode::DeviceFarm);
        assert_eq!(" LOCAL ".parse::<ExecutionMode>().unwrap(), ExecutionMode::Local);
        assert!(matches!(
            "cloud".parse::<ExecutionMode>(),
            Err(ConfigError::UnknownMode(v)) if v == "cloud"
        ));
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
device_to_execute = "devicefarm"
http_timeout_secs = 5
auto_load = false

[server_config.server.plugin.device-farm]
hub = "http://hub.local:31337"
"#
        )
        .unwrap();

        let settings = PoolSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.device_to_execute, ExecutionMode::DeviceFarm);
        assert_eq!(settings.http_timeout_secs, 5);
        assert!(!settings.auto_load);
        assert_eq!(settings.hub_url().unwrap().as_str(), "http://hub.local:31337/");
    }

    #[test]
    fn test_load_capabilities_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(
            file,
            r#"{{
  "android": {{ "platformName": "Android" }},
  "deviceToExecute": "devicefarm",
  "serverConfig": {{
    "server": {{
      "port": 4723,
      "plugin": {{ "device-farm": {{ "platform": "android", "hub": "https://farm.example.com" }} }}
    }}
  }}
}}"#
        )
        .unwrap();

        let settings = PoolSettings::from_path(file.path()).unwrap();
        assert_eq!(settings.device_to_execute, ExecutionMode::DeviceFarm);
        assert_eq!(settings.hub_url().unwrap().host_str(), Some("farm.example.com"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = PoolSettings::from_file("/nonexistent/device-pool.toml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_env_override() {
        let settings = PoolSettings::default()
            .apply_overrides_with(|key| {
                (key == DEVICE_TO_EXECUTE_ENV).then(|| "devicefarm".to_string())
            })
            .unwrap();
        assert_eq!(settings.device_to_execute, ExecutionMode::DeviceFarm);

        let unchanged = farm_settings("http://hub:1").apply_overrides_with(|_| None).unwrap();
        assert_eq!(unchanged.device_to_execute, ExecutionMode::DeviceFarm);

        let invalid = PoolSettings::default().apply_overrides_with(|_| Some("grid".to_string()));
        assert!(matches!(invalid, Err(ConfigError::UnknownMode(_))));
    }

    #[test]
    fn test_hub_url_errors() {
        let mut settings = PoolSettings {
            device_to_execute: ExecutionMode::DeviceFarm,
            ..PoolSettings::default()
        };
        assert!(matches!(settings.hub_url(), Err(ConfigError::MissingHub)));

        settings.server_config = Some(ServerConfig::default());
        assert!(matches!(settings.hub_url(), Err(ConfigError::MissingHub)));

        assert!(matches!(farm_settings("   ").hub_url(), Err(ConfigError::MissingHub)));
        assert!(matches!(
            farm_settings("not a url").hub_url(),
            Err(ConfigError::InvalidHub { .. })
        ));
        assert!(matches!(
            farm_settings("ftp://hub:21").hub_url(),
            Err(ConfigError::InvalidHub { .. })
        ));
    }

    #[test]
    fn test_resolve_endpoint() {
        let local = Url::parse("http://127.0.0.1:4723/wd/hub").unwrap();

        let settings = PoolSettings::default();
        assert_eq!(settings.resolve_endpoint(Some(&local)).unwrap(), local);
        assert!(matches!(
            settings.resolve_endpoint(None),
            Err(ConfigError::MissingLocalServer)
        ));

        let remote = farm_settings("http://hub:31337");
        assert_eq!(
            remote.resolve_endpoint(Some(&local)).unwrap().as_str(),
            "http://hub:31337/"
        );
    }
}
