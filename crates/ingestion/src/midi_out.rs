//! MIDI 输出端口表
//!
//! 按事件名登记输出端口，HTTP 网关通过事件名把原始字节发到设备。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use crate::codec::check_midi_out;
use crate::error::{IngestionError, Result};

/// 可写的 MIDI 输出端口
pub trait MidiOutPort: Send {
    /// 端口名
    fn port_name(&self) -> &str;

    /// 发送一条完整的 MIDI 消息
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

type SharedPort = Arc<Mutex<Box<dyn MidiOutPort>>>;

/// 事件名 -> 输出端口
///
/// 克隆共享同一张表。
#[derive(Clone, Default)]
pub struct MidiOutputs {
    ports: Arc<RwLock<HashMap<String, SharedPort>>>,
}

impl MidiOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 `event_name` 登记端口，替换同名旧端口
    pub fn insert(&self, event_name: impl Into<String>, port: Box<dyn MidiOutPort>) {
        let event_name = event_name.into();
        debug!(%event_name, port = port.port_name(), "MIDI 输出已登记");
        if let Ok(mut ports) = self.ports.write() {
            ports.insert(event_name, Arc::new(Mutex::new(port)));
        }
    }

    /// 关闭全部端口
    pub fn clear(&self) {
        if let Ok(mut ports) = self.ports.write() {
            ports.clear();
        }
    }

    /// 已登记的事件名 (排序)
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .ports
            .read()
            .map(|ports| ports.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// 发送到 `event_name` 对应的设备
    ///
    /// # Errors
    /// - 未知事件名返回 `UnknownMidiOutput`
    /// - 字节不是以状态字节开头时返回 `Malformed`
    /// - 端口写入失败返回 `MidiPort`
    pub fn send(&self, event_name: &str, bytes: &[u8]) -> Result<()> {
        check_midi_out(bytes).map_err(|e| IngestionError::Malformed {
            source_id: event_name.to_string(),
            reason: e.to_string(),
        })?;

        let port = self
            .ports
            .read()
            .ok()
            .and_then(|ports| ports.get(event_name).cloned())
            .ok_or_else(|| IngestionError::UnknownMidiOutput {
                event_name: event_name.to_string(),
            })?;

        let mut port = port.lock().map_err(|_| IngestionError::MidiPort {
            port: event_name.to_string(),
            reason: "port lock poisoned".to_string(),
        })?;
        port.send(bytes).inspect_err(|e| {
            warn!(%event_name, error = %e, "MIDI 发送失败");
        })
    }
}
