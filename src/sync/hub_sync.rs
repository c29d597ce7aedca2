use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, info};

use super::{StatusSync, SyncError};
use crate::inventory::device_api_url;

/// 状态更新请求体
#[derive(Debug, Serialize)]
struct BusyUpdate {
    busy: bool,
}

/// 通过 `PUT {hub}/device-farm/api/device/{udid}` 同步设备状态
pub struct HubStatusSync {
    client: Client,
    hub: Url,
}

impl HubStatusSync {
    pub fn new(hub: Url, client: Client) -> Self {
        Self { client, hub }
    }
}

#[async_trait]
impl StatusSync for HubStatusSync {
    async fn push(&self, udid: &str, busy: bool) -> Result<(), SyncError> {
        let url = device_api_url(&self.hub, Some(udid))
            .ok_or_else(|| SyncError::InvalidUrl(self.hub.to_string()))?;

        debug!("同步设备状态到 Hub: {} busy={}", url, busy);

        let response = self
            .client
            .put(url)
            .json(&BusyUpdate { busy })
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED => {
                info!("设备 {} 的忙碌状态已同步到 Hub", udid);
                Ok(())
            }
            status => Err(SyncError::Rejected {
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, HubStatusSync) {
        let server = MockServer::start().await;
        let hub = Url::parse(&server.uri()).unwrap();
        (server, HubStatusSync::new(hub, Client::new()))
    }

    #[tokio::test]
    async fn test_push_busy() {
        let (server, sync) = setup().await;

        Mock::given(method("PUT"))
            .and(path("/device-farm/api/device/emulator-5554"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({ "busy": true })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        sync.push("emulator-5554", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_accepted() {
        let (server, sync) = setup().await;

        Mock::given(method("PUT"))
            .and(path("/device-farm/api/device/d1"))
            .and(body_json(json!({ "busy": false })))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        assert!(sync.push("d1", false).await.is_ok());
    }

    #[tokio::test]
    async fn test_push_rejected() {
        let (server, sync) = setup().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let err = sync.push("d1", true).await.unwrap_err();
        assert!(matches!(err, SyncError::Rejected { status: 204 }));
    }
}
