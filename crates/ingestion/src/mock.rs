//! Mock 消息源
//!
//! 按固定频率循环发送预设消息，用于无外部设备的测试与演示。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use contracts::{Message, MessageCallback, MessageSource, OscArg};
use tracing::{debug, trace};

/// Mock 消息源配置
#[derive(Debug, Clone)]
pub struct MockSourceConfig {
    /// 来源 ID
    pub source_id: String,

    /// 发送频率 (Hz)
    pub frequency_hz: f64,

    /// 循环发送的消息脚本
    pub script: Vec<Message>,

    /// 最多发送条数 (None 表示直到 stop)
    pub limit: Option<u64>,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            source_id: "mock_source".to_string(),
            frequency_hz: 100.0,
            script: vec![Message::new("/mock/tick", vec![OscArg::Int(0)])],
            limit: None,
        }
    }
}

/// Mock 消息源
pub struct MockMessageSource {
    config: MockSourceConfig,
    listening: Arc<AtomicBool>,
    sent: Arc<AtomicU64>,
}

impl MockMessageSource {
    /// 创建新的 Mock 源
    pub fn new(config: MockSourceConfig) -> Self {
        Self {
            config,
            listening: Arc::new(AtomicBool::new(false)),
            sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 按脚本发送，发完 `script.len()` 条即停止
    pub fn scripted(source_id: &str, script: Vec<Message>) -> Self {
        let limit = Some(script.len() as u64);
        Self::new(MockSourceConfig {
            source_id: source_id.to_string(),
            script,
            limit,
            ..Default::default()
        })
    }

    /// 模拟 TouchOSC 开关：`/4/toggle{n}` 交替发送 1.0 / 0.0
    pub fn toggles(source_id: &str, frequency_hz: f64, count: usize) -> Self {
        let script = (1..=count.max(1))
            .flat_map(|n| {
                let address = format!("/4/toggle{n}");
                [
                    Message::new(address.clone(), vec![OscArg::Float(1.0)]),
                    Message::new(address, vec![OscArg::Float(0.0)]),
                ]
            })
            .collect();
        Self::new(MockSourceConfig {
            source_id: source_id.to_string(),
            frequency_hz,
            script,
            limit: None,
        })
    }

    /// 已发送条数
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl MessageSource for MockMessageSource {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    fn listen(&self, callback: MessageCallback) {
        if self.listening.swap(true, Ordering::SeqCst) || self.config.script.is_empty() {
            return;
        }

        let config = self.config.clone();
        let listening = Arc::clone(&self.listening);
        let sent = Arc::clone(&self.sent);

        thread::spawn(move || {
            let interval = Duration::from_secs_f64(1.0 / config.frequency_hz.max(0.001));
            debug!(
                source_id = %config.source_id,
                frequency_hz = config.frequency_hz,
                "mock source started"
            );

            for message in config.script.iter().cycle() {
                if !listening.load(Ordering::Relaxed) {
                    break;
                }
                if config.limit.is_some_and(|limit| sent.load(Ordering::Relaxed) >= limit) {
                    break;
                }

                trace!(source_id = %config.source_id, address = %message.address, "mock message sent");
                callback(message.clone());
                sent.fetch_add(1, Ordering::Relaxed);
                thread::sleep(interval);
            }

            listening.store(false, Ordering::SeqCst);
            debug!(source_id = %config.source_id, "mock source stopped");
        });
    }

    fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_scripted_source_sends_each_message_once() {
        let script = vec![Message::bare("/a"), Message::bare("/b")];
        let source = MockMessageSource::scripted("mock", script);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        source.listen(Arc::new(move |m: Message| sink.lock().unwrap().push(m.address)));

        for _ in 0..200 {
            if !source.is_listening() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(*seen.lock().unwrap(), vec!["/a", "/b"]);
        assert_eq!(source.sent_count(), 2);
    }

    #[test]
    fn test_toggles_script() {
        let source = MockMessageSource::toggles("touchosc", 10.0, 2);
        let addresses: Vec<_> = source.config.script.iter().map(|m| m.address.as_str()).collect();
        assert_eq!(addresses, vec!["/4/toggle1", "/4/toggle1", "/4/toggle2", "/4/toggle2"]);
    }
}
