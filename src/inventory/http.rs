use async_trait::async_trait;
use reqwest::{Client, Url};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{device_api_url, InventoryError, InventorySource};
use crate::config::{ConfigError, ExecutionMode, PoolSettings};
use crate::device::Device;

/// 创建带超时的 HTTP 客户端
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// 基于 HTTP 的设备清单来源
pub struct HttpInventory {
    client: Client,
    backend: ExecutionMode,
    endpoint: Url,
}

impl HttpInventory {
    /// 本地模式：使用本地自动化服务的 `{scheme}://{host}:{port}`
    pub fn local(server_url: &Url, client: Client) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidLocalServer {
            value: server_url.to_string(),
            reason: reason.to_string(),
        };

        let host = server_url.host_str().ok_or_else(|| invalid("缺少主机名"))?;
        let port = server_url
            .port_or_known_default()
            .ok_or_else(|| invalid("无法确定端口"))?;

        let origin = format!("{}://{}:{}", server_url.scheme(), host, port);
        let base = Url::parse(&origin).map_err(|e| invalid(&e.to_string()))?;
        let endpoint = device_api_url(&base, None).ok_or_else(|| invalid("无法拼接设备接口地址"))?;

        Ok(Self {
            client,
            backend: ExecutionMode::Local,
            endpoint,
        })
    }

    /// 远程模式：使用 Hub 地址
    pub fn device_farm(hub: &Url, client: Client) -> Result<Self, ConfigError> {
        let endpoint = device_api_url(hub, None).ok_or_else(|| ConfigError::InvalidHub {
            value: hub.to_string(),
            reason: "无法拼接设备接口地址".to_string(),
        })?;

        Ok(Self {
            client,
            backend: ExecutionMode::DeviceFarm,
            endpoint,
        })
    }

    /// 根据执行模式创建清单来源
    pub fn from_settings(
        settings: &PoolSettings,
        local_server: Option<&Url>,
        client: Client,
    ) -> Result<Self, ConfigError> {
        match settings.device_to_execute {
            ExecutionMode::DeviceFarm => Self::device_farm(&settings.hub_url()?, client),
            ExecutionMode::Local => {
                let server_url = local_server.ok_or(ConfigError::MissingLocalServer)?;
                Self::local(server_url, client)
            }
        }
    }

    /// 设备列表接口地址
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl InventorySource for HttpInventory {
    fn backend(&self) -> ExecutionMode {
        self.backend
    }

    async fn fetch(&self) -> Result<Vec<Device>, InventoryError> {
        debug!("请求设备列表 ({}): {}", self.backend, self.endpoint);

        let response = self.client.get(self.endpoint.clone()).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("获取设备列表失败: {} - {}", status, body);
            return Err(InventoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let devices: Vec<Device> = serde_json::from_str(&body).map_err(|e| {
            error!("解析设备列表失败: {}", e);
            InventoryError::Parse(e)
        })?;

        ensure_unique(&devices)?;

        info!("获取设备列表成功 ({})，共 {} 个设备", self.backend, devices.len());
        Ok(devices)
    }
}

fn ensure_unique(devices: &[Device]) -> Result<(), InventoryError> {
    let mut seen = HashSet::with_capacity(devices.len());
    for device in devices {
        if !seen.insert(device.udid.as_str()) {
            return Err(InventoryError::DuplicateUdid(device.udid.clone()));
        }
    }
    Ok(())
}
