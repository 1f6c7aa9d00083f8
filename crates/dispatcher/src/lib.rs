//! # Dispatcher
//!
//! 消息分发模块。
//!
//! 负责：
//! - 维护目的地绑定注册表 (写时复制快照)
//! - 按过滤器 fan-out 到所有匹配的目的地
//! - 每个目的地独立队列与 worker，隔离慢 sink，不阻塞主链路
//! - 出站 OSC 发送与目的地增删 (`RelayControl`)

pub mod control;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod sinks;

pub use contracts::{Binding, EventSink, SinkAdapter};
pub use control::RelayControl;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use registry::Registry;
pub use router::SinkRouter;
pub use sinks::{
    create_sink_handle, BrowserEvent, EventHub, EventStreamSink, FileSink, LogSink, NetworkSink,
};
