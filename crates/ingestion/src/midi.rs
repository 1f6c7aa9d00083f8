//! MIDI 桥接源
//!
//! 宿主的 MIDI 端口回调调用 `feed` 喂入原始字节，解码后的消息经
//! `MessageSource` 回调进入入站队列。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use contracts::{MessageCallback, MessageSource};
use tracing::{debug, trace, warn};

use crate::codec::decode_midi;
use crate::error::{IngestionError, Result};

struct BridgeInner {
    device: String,
    listening: AtomicBool,
    callback: Mutex<Option<MessageCallback>>,
}

/// MIDI 设备桥
///
/// 克隆开销很小，所有克隆共享同一状态，可以直接交给宿主回调线程。
#[derive(Clone)]
pub struct MidiBridge {
    inner: Arc<BridgeInner>,
}

impl MidiBridge {
    /// 为设备 `device` 创建桥
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                device: device.into(),
                listening: AtomicBool::new(false),
                callback: Mutex::new(None),
            }),
        }
    }

    /// 设备名 (地址中的 `{device}` 段)
    pub fn device(&self) -> &str {
        &self.inner.device
    }

    /// 喂入一条原始 MIDI 消息
    ///
    /// # Errors
    /// - 未在监听时返回 `SourceNotListening`
    /// - 字节无法解码时返回 `Malformed`
    pub fn feed(&self, raw: &[u8]) -> Result<()> {
        if !self.inner.listening.load(Ordering::Acquire) {
            return Err(IngestionError::SourceNotListening {
                source_id: self.inner.device.clone(),
            });
        }

        let message = decode_midi(&self.inner.device, raw).map_err(|e| {
            warn!(device = %self.inner.device, error = %e, "丢弃无法解码的 MIDI 消息");
            IngestionError::Malformed {
                source_id: self.inner.device.clone(),
                reason: e.to_string(),
            }
        })?;

        let callback = self
            .inner
            .callback
            .lock()
            .ok()
            .and_then(|guard| guard.clone());
        match callback {
            Some(callback) => {
                trace!(device = %self.inner.device, address = %message.address, "MIDI 消息已解码");
                callback(message);
                Ok(())
            }
            None => Err(IngestionError::SourceNotListening {
                source_id: self.inner.device.clone(),
            }),
        }
    }
}

impl MessageSource for MidiBridge {
    fn source_id(&self) -> &str {
        &self.inner.device
    }

    fn listen(&self, callback: MessageCallback) {
        if let Ok(mut slot) = self.inner.callback.lock() {
            *slot = Some(callback);
        }
        if !self.inner.listening.swap(true, Ordering::AcqRel) {
            debug!(device = %self.inner.device, "MIDI 桥开始监听");
        }
    }

    fn stop(&self) {
        if self.inner.listening.swap(false, Ordering::AcqRel) {
            debug!(device = %self.inner.device, "MIDI 桥停止监听");
        }
        if let Ok(mut slot) = self.inner.callback.lock() {
            slot.take();
        }
    }

    fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::Acquire)
    }
}
