//! 设备条目
//!
//! 表示设备池中的单个可分配设备

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// 设备
///
/// `udid` 是设备池中的主键，`busy` 是唯一会被设备池修改的字段。
/// 设备清单返回的其他字段（平台、名称等）原样保存在 `metadata` 中。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// 设备唯一标识
    pub udid: String,

    /// 是否已被占用，清单未返回或为 null 时视为空闲
    #[serde(default, deserialize_with = "null_as_false")]
    pub busy: bool,

    /// 其他透传字段
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl Device {
    /// 创建空闲设备
    pub fn new(udid: impl Into<String>) -> Self {
        Self {
            udid: udid.into(),
            busy: false,
            metadata: Map::new(),
        }
    }

    pub fn with_busy(mut self, busy: bool) -> Self {
        self.busy = busy;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// 读取透传字段
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// 设备名称
    pub fn name(&self) -> Option<&str> {
        self.meta("name").and_then(Value::as_str)
    }

    /// 设备平台
    pub fn platform(&self) -> Option<&str> {
        self.meta("platform").and_then(Value::as_str)
    }
}
