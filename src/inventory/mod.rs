//! 设备清单模块
//!
//! 从本地自动化服务或远程设备农场 Hub 获取设备列表

mod http;

use async_trait::async_trait;
use reqwest::Url;

use crate::config::ExecutionMode;
use crate::device::Device;

pub use http::{build_client, HttpInventory};

/// 设备列表接口路径段
const DEVICE_API_SEGMENTS: [&str; 3] = ["device-farm", "api", "device"];

/// 设备清单来源
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// 来源对应的执行模式
    fn backend(&self) -> ExecutionMode;

    /// 获取当前设备列表，每次调用发起一次请求
    async fn fetch(&self) -> Result<Vec<Device>, InventoryError>;
}

/// 设备清单错误
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),

    #[error("响应状态异常: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("解析设备列表失败: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("设备 UDID 重复: {0}")]
    DuplicateUdid(String),
}

/// 拼接 `{base}/device-farm/api/device[/{udid}]`
///
/// base 末尾的 `/` 会被忽略，udid 按路径段编码。
pub(crate) fn device_api_url(base: &Url, udid: Option<&str>) -> Option<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.pop_if_empty().extend(DEVICE_API_SEGMENTS);
        if let Some(udid) = udid {
            segments.push(udid);
        }
    }
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_api_url() {
        let hub = Url::parse("http://hub:31337").unwrap();
        assert_eq!(
            device_api_url(&hub, None).unwrap().as_str(),
            "http://hub:31337/device-farm/api/device"
        );

        let prefixed = Url::parse("https://farm.example.com/grid/").unwrap();
        assert_eq!(
            device_api_url(&prefixed, Some("emulator-5554")).unwrap().as_str(),
            "https://farm.example.com/grid/device-farm/api/device/emulator-5554"
        );
    }

    #[test]
    fn test_device_api_url_encodes_udid() {
        let hub = Url::parse("http://hub:31337/").unwrap();
        let url = device_api_url(&hub, Some("a/b c")).unwrap();
        assert_eq!(url.path(), "/device-farm/api/device/a%2Fb%20c");
    }

    #[test]
    fn test_device_api_url_rejects_non_base() {
        let mailto = Url::parse("mailto:ops@example.com").unwrap();
        assert!(device_api_url(&mailto, None).is_none());
    }
}
