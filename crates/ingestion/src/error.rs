//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 监听端口绑定失败
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        /// 绑定地址
        addr: String,
        /// 底层 IO 错误
        #[source]
        source: std::io::Error,
    },

    /// 入站消息解码失败
    #[error("malformed message from {source_id}: {reason}")]
    Malformed {
        /// 来源 ID (对端地址或设备名)
        source_id: String,
        /// 错误原因
        reason: String,
    },

    /// 入站队列已关闭
    #[error("inbound queue closed")]
    QueueClosed,

    /// 来源未在监听
    #[error("source {source_id} is not listening")]
    SourceNotListening {
        /// 来源 ID
        source_id: String,
    },

    /// 没有以该事件名注册的 MIDI 输出
    #[error("MIDI device with event_name '{event_name}' not found")]
    UnknownMidiOutput {
        /// 事件名
        event_name: String,
    },

    /// MIDI 端口打开或发送失败
    #[error("MIDI port {port}: {reason}")]
    MidiPort {
        /// 端口名
        port: String,
        /// 错误原因
        reason: String,
    },

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
