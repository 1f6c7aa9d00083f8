//! 中继指标收集模块
//!
//! 入站、分发与投递三个阶段的 Prometheus 指标，以及用于运行摘要的内存聚合器。

use std::collections::HashMap;

use metrics::{counter, gauge, histogram};

/// 投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// 写入成功
    Success,
    /// 写入失败
    Failure,
    /// 写入超时
    Timeout,
    /// 队列已满被拒绝
    Rejected,
}

impl DeliveryStatus {
    /// 指标标签值
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
        }
    }
}

/// 记录入站消息
pub fn record_message_received(source: &str) {
    counter!(
        "osc_relay_messages_received_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// 记录无法解码的入站消息
pub fn record_message_malformed(source: &str) {
    counter!(
        "osc_relay_messages_malformed_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// 记录因背压或停止而丢弃的消息
pub fn record_message_dropped(reason: &str) {
    counter!(
        "osc_relay_messages_dropped_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录入站队列深度
pub fn record_inbound_queue_depth(depth: usize) {
    gauge!("osc_relay_inbound_queue_depth").set(depth as f64);
}

/// 记录一次分发
pub fn record_dispatch(matched: usize, delivered: usize) {
    counter!("osc_relay_dispatch_total").increment(1);
    histogram!("osc_relay_dispatch_matched").record(matched as f64);
    if matched == 0 {
        counter!("osc_relay_dispatch_unmatched_total").increment(1);
    }
    if delivered < matched {
        counter!("osc_relay_dispatch_partial_total").increment(1);
    }
}

/// 记录单个目的地的投递结果
pub fn record_delivery(destination: &str, status: DeliveryStatus) {
    counter!(
        "osc_relay_deliveries_total",
        "destination" => destination.to_string(),
        "status" => status.as_str()
    )
    .increment(1);
}

/// 记录 sink 写入耗时
pub fn record_delivery_latency_ms(destination: &str, latency_ms: f64) {
    histogram!(
        "osc_relay_delivery_latency_ms",
        "destination" => destination.to_string()
    )
    .record(latency_ms);
}

/// 记录目的地队列深度
pub fn record_sink_queue_depth(destination: &str, depth: usize) {
    gauge!(
        "osc_relay_sink_queue_depth",
        "destination" => destination.to_string()
    )
    .set(depth as f64);
}

/// 记录注册表大小
pub fn record_registry_size(bindings: usize) {
    gauge!("osc_relay_registry_bindings").set(bindings as f64);
}

/// 中继指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct RelayMetricsAggregator {
    /// 分发的消息总数
    pub total_messages: u64,

    /// 没有任何匹配的消息数
    pub unmatched_messages: u64,

    /// 成功投递总数
    pub total_delivered: u64,

    /// 投递失败总数
    pub total_failed: u64,

    /// 每条消息匹配的目的地数
    pub fanout_stats: RunningStats,

    /// 分发耗时 (毫秒)
    pub dispatch_latency_stats: RunningStats,

    /// 各目的地投递次数
    pub delivery_counts: HashMap<String, u64>,
}

impl RelayMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    ///
    /// `delivered` 为成功到达的目的地，`failed` 为失败次数。
    pub fn update<'a>(
        &mut self,
        delivered: impl IntoIterator<Item = &'a str>,
        failed: usize,
        latency_ms: f64,
    ) {
        self.total_messages += 1;

        let mut reached = 0u64;
        for destination in delivered {
            reached += 1;
            *self
                .delivery_counts
                .entry(destination.to_string())
                .or_insert(0) += 1;
        }

        let matched = reached + failed as u64;
        if matched == 0 {
            self.unmatched_messages += 1;
        }
        self.total_delivered += reached;
        self.total_failed += failed as u64;
        self.fanout_stats.push(matched as f64);
        self.dispatch_latency_stats.push(latency_ms);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let attempts = self.total_delivered + self.total_failed;
        MetricsSummary {
            total_messages: self.total_messages,
            unmatched_messages: self.unmatched_messages,
            total_delivered: self.total_delivered,
            total_failed: self.total_failed,
            failure_rate: if attempts > 0 {
                self.total_failed as f64 / attempts as f64 * 100.0
            } else {
                0.0
            },
            unmatched_rate: if self.total_messages > 0 {
                self.unmatched_messages as f64 / self.total_messages as f64 * 100.0
            } else {
                0.0
            },
            fanout: StatsSummary::from(&self.fanout_stats),
            dispatch_latency_ms: StatsSummary::from(&self.dispatch_latency_stats),
            delivery_counts: self.delivery_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_messages: u64,
    pub unmatched_messages: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub failure_rate: f64,
    pub unmatched_rate: f64,
    pub fanout: StatsSummary,
    pub dispatch_latency_ms: StatsSummary,
    pub delivery_counts: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Relay Metrics Summary ===")?;
        writeln!(f, "Messages dispatched: {}", self.total_messages)?;
        writeln!(
            f,
            "Unmatched messages: {} ({:.2}%)",
            self.unmatched_messages, self.unmatched_rate
        )?;
        writeln!(f, "Deliveries: {}", self.total_delivered)?;
        writeln!(
            f,
            "Failed deliveries: {} ({:.2}%)",
            self.total_failed, self.failure_rate
        )?;
        writeln!(f, "Fan-out: {}", self.fanout)?;
        writeln!(f, "Dispatch latency (ms): {}", self.dispatch_latency_ms)?;

        if !self.delivery_counts.is_empty() {
            writeln!(f, "Per-destination deliveries:")?;
            let mut counts: Vec<_> = self.delivery_counts.iter().collect();
            counts.sort();
            for (destination, count) in counts {
                writeln!(f, "  {}: {}", destination, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 8);
        assert!((stats.mean() - 5.0).abs() < 1e-10);
        assert!((stats.min() - 2.0).abs() < 1e-10);
        assert!((stats.max() - 9.0).abs() < 1e-10);
        assert!((stats.variance() - 32.0 / 7.0).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = RelayMetricsAggregator::new();

        aggregator.update(["A", "B"], 0, 0.2);
        aggregator.update(["B"], 1, 0.4);
        aggregator.update(std::iter::empty(), 0, 0.1);

        assert_eq!(aggregator.total_messages, 3);
        assert_eq!(aggregator.unmatched_messages, 1);
        assert_eq!(aggregator.total_delivered, 3);
        assert_eq!(aggregator.total_failed, 1);
        assert_eq!(aggregator.delivery_counts.get("B"), Some(&2));
        assert_eq!(aggregator.fanout_stats.max(), 2.0);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = RelayMetricsAggregator::new();
        aggregator.update(["A"], 1, 0.5);
        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Messages dispatched: 1"));
        assert!(output.contains("Failed deliveries: 1 (50.00%)"));
        assert!(output.contains("  A: 1"));
    }

    #[test]
    fn test_recorders_without_exporter() {
        // 未安装 recorder 时为空操作
        record_message_received("test");
        record_dispatch(0, 0);
        record_delivery("A", DeliveryStatus::Timeout);
    }
}
