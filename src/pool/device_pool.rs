//! 设备池实现
//!
//! 所有对忙碌状态的读改写、影响分配决策的读取以及懒加载都在同一把锁内完成，
//! 查找空闲设备与标记占用始终是一次加锁内的原子操作。

use super::types::{PoolEvent, PoolOptions, PoolStatus};
use crate::config::{ExecutionMode, PoolSettings};
use crate::device::Device;
use crate::error::{PoolError, Result};
use crate::inventory::{build_client, HttpInventory, InventoryError, InventorySource};
use crate::sync::{HubStatusSync, StatusSync};
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, MutexGuard, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// 设备列表快照
#[derive(Default)]
struct Registry {
    /// None 表示未加载
    devices: Option<Vec<Device>>,
    loaded_at: Option<DateTime<Utc>>,
    /// 是否成功加载过，reset 后保持不变
    ever_loaded: bool,
}

/// 按 UDID 占用设备的结果
enum Claim {
    Acquired(Device),
    Busy,
    Unknown,
}

type StatusUpdates = mpsc::UnboundedReceiver<(String, bool)>;

/// 待推送的状态变更，按入队顺序逐条发送
struct StatusQueue {
    tx: mpsc::UnboundedSender<(String, bool)>,
    /// 首次入队时才启动推送任务
    worker: std::sync::Mutex<Option<(Arc<dyn StatusSync>, StatusUpdates)>>,
}

impl StatusQueue {
    fn new(status_sync: Arc<dyn StatusSync>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            worker: std::sync::Mutex::new(Some((status_sync, rx))),
        }
    }

    fn enqueue(&self, udid: &str, busy: bool) {
        let idle = self.worker.lock().ok().and_then(|mut worker| worker.take());
        if let Some((status_sync, rx)) = idle {
            tokio::spawn(run_status_sync(status_sync, rx));
        }

        if self.tx.send((udid.to_string(), busy)).is_err() {
            warn!("状态同步任务已退出，丢弃设备 {} 的状态变更", udid);
        }
    }
}

/// 逐条推送状态变更，设备池释放后退出
async fn run_status_sync(
    status_sync: Arc<dyn StatusSync>,
    mut rx: StatusUpdates,
) {
    while let Some((udid, busy)) = rx.recv().await {
        if let Err(e) = status_sync.push(&udid, busy).await {
            warn!("同步设备 {} 状态到 Hub 失败: {}", udid, e);
        }
    }
    debug!("状态同步任务结束");
}

fn find_mut<'a>(devices: &'a mut [Device], udid: &str) -> Option<&'a mut Device> {
    devices.iter_mut().find(|device| device.udid == udid)
}

/// 设备池
pub struct DevicePool {
    /// 设备列表，同时作为懒加载的闸门
    registry: Mutex<Registry>,

    /// 设备清单来源
    source: Arc<dyn InventorySource>,

    /// 远程状态同步（仅远程模式）
    status_sync: Option<StatusQueue>,

    options: PoolOptions,

    /// 事件发送器
    event_tx: broadcast::Sender<PoolEvent>,

    /// 有设备被释放时通知等待者
    released: Notify,
}

impl DevicePool {
    /// 创建新的设备池，设备列表在首次使用时加载
    pub fn new(source: Arc<dyn InventorySource>, options: PoolOptions) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            registry: Mutex::new(Registry::default()),
            source,
            status_sync: None,
            options,
            event_tx,
            released: Notify::new(),
        }
    }

    /// 设置远程状态同步
    pub fn with_status_sync(mut self, status_sync: Arc<dyn StatusSync>) -> Self {
        self.status_sync = Some(StatusQueue::new(status_sync));
        self
    }

    /// 根据配置创建设备池
    ///
    /// 本地模式需要传入本地自动化服务地址；远程模式使用 Hub 地址并启用状态同步。
    pub fn from_settings(settings: &PoolSettings, local_server: Option<&Url>) -> Result<Self> {
        let backend = settings.device_to_execute;
        let client = build_client(settings.http_timeout()).map_err(|e| {
            PoolError::SourceUnavailable {
                backend,
                source: InventoryError::Network(e),
            }
        })?;

        let source = HttpInventory::from_settings(settings, local_server, client.clone())?;
        info!("设备清单地址 ({}): {}", backend, source.endpoint());

        let pool = Self::new(Arc::new(source), settings.pool_options());

        if backend.is_remote() {
            let hub = settings.hub_url()?;
            info!("已启用 Hub 状态同步: {}", hub);
            return Ok(pool.with_status_sync(Arc::new(HubStatusSync::new(hub, client))));
        }

        Ok(pool)
    }

    pub fn backend(&self) -> ExecutionMode {
        self.source.backend()
    }

    /// 订阅事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<PoolEvent> {
        self.event_tx.subscribe()
    }

    /// 加载设备列表
    ///
    /// 已加载时直接返回缓存；并发的首次调用只会触发一次请求。
    /// 请求失败时设备池保持未加载，之后的调用会重新请求。
    pub async fn load(&self) -> Result<Vec<Device>> {
        let mut registry = self.registry.lock().await;
        if let Some(devices) = &registry.devices {
            return Ok(devices.clone());
        }
        self.install(&mut registry).await
    }

    /// 是否已加载
    pub async fn is_loaded(&self) -> bool {
        self.registry.lock().await.devices.is_some()
    }

    /// 清空设备缓存，下次使用时重新加载
    ///
    /// 已经分配出去的设备不受影响，调用方仍应在使用完毕后释放。
    pub async fn reset(&self) {
        let cleared = {
            let mut registry = self.registry.lock().await;
            registry.loaded_at = None;
            registry.devices.take().map_or(0, |devices| devices.len())
        };

        info!("设备缓存已清空（{} 个设备），下次查询时重新加载", cleared);
        self.emit(PoolEvent::Reset);
    }

    /// 占用第一个空闲设备
    ///
    /// 按设备列表顺序选择，查找与标记在同一次加锁内完成；没有空闲设备时返回 None。
    pub async fn acquire_free(&self) -> Result<Option<Device>> {
        let acquired = self
            .with_registry(|devices| {
                let device = devices.iter_mut().find(|device| !device.busy)?;
                device.busy = true;
                self.sync_status(&device.udid, true);
                Some(device.clone())
            })
            .await?;

        match &acquired {
            Some(device) => {
                info!("设备已分配: {}", device.udid);
                self.emit(PoolEvent::Acquired {
                    udid: device.udid.clone(),
                });
            }
            None => debug!("没有空闲设备"),
        }

        Ok(acquired)
    }

    /// 限时等待并占用空闲设备
    ///
    /// 每次尝试都与 [`acquire_free`](Self::acquire_free) 相同；
    /// 在有设备释放或每个轮询间隔到达时重新检查，超时返回 None。
    pub async fn acquire_free_within(&self, timeout: Duration) -> Result<Option<Device>> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(device) = self.acquire_free().await? {
                return Ok(Some(device));
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("等待空闲设备超时: {:?}", timeout);
                return Ok(None);
            }

            let wait = (deadline - now).min(self.options.poll_interval());
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    /// 按 UDID 占用设备
    ///
    /// 设备不存在或已被占用时返回 None，不会等待也不会抢占。
    pub async fn acquire_by_udid(&self, udid: &str) -> Result<Option<Device>> {
        let claim = self
            .with_registry(|devices| match find_mut(devices, udid) {
                None => Claim::Unknown,
                Some(device) if device.busy => Claim::Busy,
                Some(device) => {
                    device.busy = true;
                    self.sync_status(udid, true);
                    Claim::Acquired(device.clone())
                }
            })
            .await?;

        match claim {
            Claim::Acquired(device) => {
                info!("设备已分配: {}", udid);
                self.emit(PoolEvent::Acquired {
                    udid: udid.to_string(),
                });
                Ok(Some(device))
            }
            Claim::Busy => {
                debug!("设备 {} 正忙", udid);
                Ok(None)
            }
            Claim::Unknown => {
                warn!("设备 {} 不在设备列表中", udid);
                Ok(None)
            }
        }
    }

    /// 释放设备
    ///
    /// 设备不存在时返回 false；重复释放空闲设备返回 true。
    pub async fn release(&self, udid: &str) -> Result<bool> {
        let previous = self
            .with_registry(|devices| {
                find_mut(devices, udid).map(|device| {
                    let previous = std::mem::replace(&mut device.busy, false);
                    if previous {
                        self.sync_status(udid, false);
                    }
                    previous
                })
            })
            .await?;

        match previous {
            None => {
                warn!("设备 {} 不在设备列表中", udid);
                Ok(false)
            }
            Some(true) => {
                info!("设备已释放: {}", udid);
                self.emit(PoolEvent::Released {
                    udid: udid.to_string(),
                });
                self.released.notify_waiters();
                Ok(true)
            }
            Some(false) => {
                debug!("设备 {} 已是空闲状态", udid);
                Ok(true)
            }
        }
    }

    /// 直接设置设备忙碌状态，设备不存在时返回 false
    pub async fn set_busy(&self, udid: &str, busy: bool) -> Result<bool> {
        let previous = self
            .with_registry(|devices| {
                find_mut(devices, udid).map(|device| {
                    let previous = std::mem::replace(&mut device.busy, busy);
                    if previous != busy {
                        self.sync_status(udid, busy);
                    }
                    previous
                })
            })
            .await?;

        let Some(previous) = previous else {
            warn!("设备 {} 不在设备列表中", udid);
            return Ok(false);
        };

        info!("设备 {} 忙碌状态设置为: {}", udid, busy);

        if previous != busy {
            self.emit(PoolEvent::BusyChanged {
                udid: udid.to_string(),
                busy,
            });
            if !busy {
                self.released.notify_waiters();
            }
        }

        Ok(true)
    }

    /// 设备是否忙碌，设备不存在时返回 None
    pub async fn is_busy(&self, udid: &str) -> Result<Option<bool>> {
        self.with_registry(|devices| {
            devices
                .iter()
                .find(|device| device.udid == udid)
                .map(Device::is_busy)
        })
        .await
    }

    /// 按 UDID 获取设备
    pub async fn get_device(&self, udid: &str) -> Result<Option<Device>> {
        self.with_registry(|devices| devices.iter().find(|device| device.udid == udid).cloned())
            .await
    }

    /// 第一个空闲设备的 UDID，只读，不占用设备
    pub async fn free_udid(&self) -> Result<Option<String>> {
        self.with_registry(|devices| {
            devices
                .iter()
                .find(|device| !device.busy)
                .map(|device| device.udid.clone())
        })
        .await
    }

    pub async fn free_count(&self) -> Result<usize> {
        self.with_registry(|devices| devices.iter().filter(|device| !device.busy).count())
            .await
    }

    pub async fn busy_count(&self) -> Result<usize> {
        self.with_registry(|devices| devices.iter().filter(|device| device.busy).count())
            .await
    }

    /// 所有空闲设备
    pub async fn list_free(&self) -> Result<Vec<Device>> {
        self.with_registry(|devices| {
            devices
                .iter()
                .filter(|device| !device.busy)
                .cloned()
                .collect()
        })
        .await
    }

    /// 所有空闲设备的 UDID
    pub async fn list_free_udids(&self) -> Result<Vec<String>> {
        self.with_registry(|devices| {
            devices
                .iter()
                .filter(|device| !device.busy)
                .map(|device| device.udid.clone())
                .collect()
        })
        .await
    }

    /// 所有设备
    pub async fn list_all(&self) -> Result<Vec<Device>> {
        self.with_registry(|devices| devices.clone()).await
    }

    /// 设备池状态
    pub async fn status(&self) -> Result<PoolStatus> {
        let registry = self.lock_loaded().await?;
        let devices = registry.devices.as_deref().unwrap_or(&[]);
        let busy = devices.iter().filter(|device| device.busy).count();

        Ok(PoolStatus {
            total: devices.len(),
            free: devices.len() - busy,
            busy,
            loaded_at: registry.loaded_at,
        })
    }

    /// 加锁并确保设备列表已加载
    async fn lock_loaded(&self) -> Result<MutexGuard<'_, Registry>> {
        let mut registry = self.registry.lock().await;

        if registry.devices.is_none() {
            if !self.options.auto_load && !registry.ever_loaded {
                debug!("设备列表未加载且未开启自动加载");
                return Err(PoolError::NotLoaded);
            }
            self.install(&mut registry).await?;
        }

        Ok(registry)
    }

    /// 在锁内对设备列表执行操作
    async fn with_registry<T>(&self, op: impl FnOnce(&mut Vec<Device>) -> T) -> Result<T> {
        let mut registry = self.lock_loaded().await?;
        registry.devices.as_mut().map(op).ok_or(PoolError::NotLoaded)
    }

    /// 请求设备清单并写入缓存，调用方需持有锁
    async fn install(&self, registry: &mut Registry) -> Result<Vec<Device>> {
        let backend = self.source.backend();

        let devices = self.source.fetch().await.map_err(|source| {
            error!("加载设备列表失败 ({}): {}", backend, source);
            PoolError::SourceUnavailable { backend, source }
        })?;

        let count = devices.len();
        registry.devices = Some(devices.clone());
        registry.loaded_at = Some(Utc::now());
        registry.ever_loaded = true;

        info!("设备列表已加载 ({})，共 {} 个设备", backend, count);
        self.emit(PoolEvent::Loaded { count });

        Ok(devices)
    }

    fn emit(&self, event: PoolEvent) {
        let _ = self.event_tx.send(event);
    }

    /// 在锁内按变更顺序入队，由后台任务在锁外推送，失败只记录日志
    fn sync_status(&self, udid: &str, busy: bool) {
        if let Some(queue) = &self.status_sync {
            queue.enqueue(udid, busy);
        }
    }
}
