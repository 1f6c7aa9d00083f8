//! RelayBlueprint - Config Loader 输出
//!
//! 描述完整的中继配置：入站监听、分发参数、HTTP 控制面、目的地绑定、MIDI 设备。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::{Binding, RelayError, Transform};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的中继配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 入站 UDP 监听
    #[serde(default)]
    pub listener: ListenerConfig,

    /// 分发参数
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// HTTP 控制面 (可选，缺省即禁用)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,

    /// 目的地列表 (插入顺序即分发顺序)
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,

    /// MIDI 设备 (由宿主喂入原始字节)
    #[serde(default)]
    pub midi_devices: Vec<MidiDeviceConfig>,
}

/// 入站监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// 绑定地址
    #[serde(default = "default_listener_host")]
    pub host: String,

    /// 绑定端口
    #[serde(default = "default_listener_port")]
    pub port: u16,

    /// 入站队列容量
    #[serde(default = "default_inbound_capacity")]
    pub queue_capacity: usize,

    /// 队列满时的丢弃策略
    #[serde(default)]
    pub drop_policy: DropPolicy,

    /// 单个数据报最大字节数
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_listener_host(),
            port: default_listener_port(),
            queue_capacity: default_inbound_capacity(),
            drop_policy: DropPolicy::default(),
            max_datagram_size: default_max_datagram_size(),
        }
    }
}

impl ListenerConfig {
    /// `host:port` 形式的绑定地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_listener_host() -> String {
    "127.0.0.1".to_string()
}

fn default_listener_port() -> u16 {
    12345
}

fn default_inbound_capacity() -> usize {
    1024
}

fn default_max_datagram_size() -> usize {
    65507
}

/// 分发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// 单次 sink 写入超时 (毫秒)
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    /// 每个目的地的默认队列容量
    #[serde(default = "default_queue_capacity")]
    pub default_queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: default_delivery_timeout_ms(),
            default_queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_delivery_timeout_ms() -> u64 {
    250
}

fn default_queue_capacity() -> usize {
    128
}

/// HTTP 控制面配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// 绑定地址
    #[serde(default = "default_http_host")]
    pub host: String,

    /// 绑定端口
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// 是否允许跨域 (浏览器叠加页需要)
    #[serde(default = "default_cors")]
    pub cors: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            cors: default_cors(),
        }
    }
}

impl HttpConfig {
    /// `host:port` 形式的绑定地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_cors() -> bool {
    true
}

/// 目的地配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// 唯一标识符
    pub id: String,

    /// 地址过滤器 (`*`、`/a/b`、`/a/*`)
    pub filter: String,

    /// 投递前变换
    #[serde(default)]
    pub transform: Transform,

    /// 出站 OSC 回发地址
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<SocketAddr>,

    /// 输出 sink
    #[serde(default)]
    pub sink: SinkConfig,
}

impl DestinationConfig {
    /// 构造对应的 Binding
    ///
    /// # Errors
    /// 过滤器语法错误时返回 `InvalidFilter`
    pub fn to_binding(&self) -> Result<Binding, RelayError> {
        Ok(Binding::parse(self.id.as_str(), &self.filter, self.transform)?
            .with_reply_to(self.reply_to))
    }

    /// 浏览器事件名，缺省为目的地 ID
    pub fn event_name(&self) -> &str {
        self.sink
            .params
            .get("event_name")
            .map(String::as_str)
            .unwrap_or(&self.id)
    }
}

/// 丢包策略 (背压满时)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// 丢弃最旧的包
    #[default]
    DropOldest,
    /// 丢弃最新的包
    DropNewest,
}

/// Sink 输出配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 类型
    #[serde(default)]
    pub sink_type: SinkType,

    /// 队列容量 (缺省使用 dispatch.default_queue_capacity)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            sink_type: SinkType::Log,
            queue_capacity: None,
            params: HashMap::new(),
        }
    }
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// tracing 日志
    #[default]
    Log,
    /// UDP 转发
    Network,
    /// JSON Lines 文件
    File,
    /// 浏览器事件流 (SSE)
    EventStream,
}

/// MIDI 设备配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MidiDeviceConfig {
    /// 设备名，用作地址段 `/midi/{name}/...`
    pub name: String,

    /// 要打开的硬件端口名 (输入与输出同名)；缺省时只接受宿主喂入的字节
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    /// `/api/midi/send` 使用的事件名，缺省为设备名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
}

impl MidiDeviceConfig {
    /// 按名称构造，无硬件端口
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 出站事件名，缺省为设备名
    pub fn event_name(&self) -> &str {
        self.event_name.as_deref().unwrap_or(&self.name)
    }
}
