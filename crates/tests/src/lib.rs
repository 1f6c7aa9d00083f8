//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - UDP -> 监听器 -> 分发器 -> sink 的端到端测试
//! - 注册表并发变更测试

#[cfg(test)]
mod contract_tests {
    use contracts::{Message, OscArg};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_message_json_shape() {
        let message = Message::new(
            "/4/toggle1",
            vec![OscArg::Float(1.0), OscArg::String("on".into()), OscArg::Bool(true)],
        );
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({ "address": "/4/toggle1", "arguments": [1.0, "on", true] })
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use contracts::{
        DestinationConfig, DestinationId, DispatchConfig, ListenerConfig, Message, OscArg,
        RelayError, SinkAdapter, SinkConfig, SinkType, Transform,
    };
    use dispatcher::{Dispatcher, EventHub, Registry, RelayControl};
    use ingestion::{
        codec, BackpressureConfig, IngestionPipeline, InboundQueue, MockMessageSource,
        OscUdpListener,
    };
    use tokio::net::UdpSocket;
    use tokio::sync::watch;

    /// Adapter recording (destination, address, args) per delivery
    #[derive(Default)]
    struct RecordingAdapter {
        deliveries: Mutex<Vec<(String, String, Vec<OscArg>)>>,
    }

    impl RecordingAdapter {
        fn recorded(&self) -> Vec<(String, String, Vec<OscArg>)> {
            self.deliveries.lock().unwrap().clone()
        }
    }

    impl SinkAdapter for RecordingAdapter {
        fn deliver(&self, destination: &DestinationId, message: Arc<Message>) -> Result<(), RelayError> {
            self.deliveries.lock().unwrap().push((
                destination.to_string(),
                message.address.clone(),
                message.args.clone(),
            ));
            Ok(())
        }
    }

    fn ab_registry() -> Arc<Registry> {
        let registry = Arc::new(Registry::new());
        registry
            .register_raw("A", "/4/toggle1", Transform::PassThrough, None)
            .unwrap();
        registry
            .register_raw("B", "/4/*", Transform::PassThrough, None)
            .unwrap();
        registry
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(3), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// End-to-end test: UDP datagram -> OscUdpListener -> InboundQueue -> Dispatcher
    ///
    /// 验证完整的数据流：
    /// 1. 监听器解码 OSC 数据报，跳过损坏的数据报
    /// 2. 分发器按注册顺序扇出到所有匹配的目的地
    /// 3. 不匹配的消息不产生任何投递
    #[tokio::test]
    async fn test_e2e_udp_to_destinations() {
        let listener = OscUdpListener::bind(&ListenerConfig {
            port: 0,
            ..ListenerConfig::default()
        })
        .await
        .unwrap();
        let addr = listener.local_addr();

        let (queue, rx) = InboundQueue::new(&BackpressureConfig::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let listener_task = listener.spawn(queue.clone(), stop_rx.clone());

        let adapter = Arc::new(RecordingAdapter::default());
        let dispatcher = Dispatcher::new(ab_registry(), adapter.clone());
        let dispatcher_task = dispatcher.spawn(rx, stop_rx);

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"garbage", addr).await.unwrap();
        for message in [
            Message::new("/4/toggle1", vec![OscArg::Float(1.0)]),
            Message::new("/5/toggle1", vec![OscArg::Float(1.0)]),
            Message::new("/4/fader2", vec![OscArg::Float(0.25)]),
        ] {
            sender
                .send_to(&codec::encode_message(&message), addr)
                .await
                .unwrap();
        }

        wait_for(|| adapter.recorded().len() == 3).await;
        assert_eq!(
            adapter.recorded(),
            vec![
                ("A".into(), "/4/toggle1".into(), vec![OscArg::Float(1.0)]),
                ("B".into(), "/4/toggle1".into(), vec![OscArg::Float(1.0)]),
                ("B".into(), "/4/fader2".into(), vec![OscArg::Float(0.25)]),
            ]
        );

        stop_tx.send(true).unwrap();
        listener_task.await.unwrap();
        let aggregator = dispatcher_task.await.unwrap();
        assert_eq!(aggregator.total_messages, 3);
        assert_eq!(aggregator.unmatched_messages, 1);

        let snapshot = queue.metrics().snapshot();
        assert_eq!(snapshot.messages_received, 3);
        assert_eq!(snapshot.malformed, 1);
    }

    /// Mock source -> IngestionPipeline -> Dispatcher
    #[tokio::test]
    async fn test_e2e_mock_source_pipeline() {
        let script: Vec<Message> = (1..=10)
            .map(|n| Message::new(format!("/4/toggle{n}"), vec![OscArg::Float(1.0)]))
            .collect();
        let mut pipeline = IngestionPipeline::new(BackpressureConfig::default());
        pipeline.register_source(Box::new(MockMessageSource::scripted("mock", script)));
        let rx = pipeline.take_receiver().unwrap();

        let adapter = Arc::new(RecordingAdapter::default());
        let registry = Arc::new(Registry::new());
        registry
            .register_raw("stripped", "/4/*", Transform::StripPrefix, None)
            .unwrap();
        let dispatcher = Dispatcher::new(registry, adapter.clone());
        let (_stop_tx, stop_rx) = watch::channel(false);
        let task = dispatcher.spawn(rx, stop_rx);

        pipeline.start_all();
        wait_for(|| adapter.recorded().len() == 10).await;
        pipeline.stop_all();
        pipeline.queue().close();

        let aggregator = task.await.unwrap();
        assert_eq!(aggregator.total_delivered, 10);
        let addresses: Vec<_> = adapter.recorded().into_iter().map(|(_, a, _)| a).collect();
        assert_eq!(addresses[0], "/toggle1");
        assert_eq!(addresses[9], "/toggle10");
    }

    /// 并发注册/注销期间分发始终看到一致快照
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_and_dispatch() {
        let adapter = Arc::new(RecordingAdapter::default());
        let registry = ab_registry();
        let dispatcher = Dispatcher::new(registry.clone(), adapter.clone());

        let mutator = {
            let registry = registry.clone();
            tokio::task::spawn_blocking(move || {
                for i in 0..200 {
                    let id = format!("dyn{}", i % 5);
                    registry
                        .register_raw(id.as_str(), "/4/*", Transform::PassThrough, None)
                        .unwrap();
                    if i % 3 == 0 {
                        registry.unregister(&id).unwrap();
                    }
                }
            })
        };

        let dispatching = {
            let dispatcher = dispatcher.clone();
            tokio::task::spawn_blocking(move || {
                let mut total = 0usize;
                for _ in 0..500 {
                    let report = dispatcher.dispatch(Message::bare("/4/toggle1")).unwrap();
                    // A and B are never touched by the mutator
                    assert!(report.delivered.iter().any(|d| d == "A"));
                    assert!(report.delivered.iter().any(|d| d == "B"));
                    assert_eq!(report.matched, report.delivered());
                    total += report.delivered();
                }
                total
            })
        };

        mutator.await.unwrap();
        let total = dispatching.await.unwrap();
        assert_eq!(adapter.recorded().len(), total);

        let ids: Vec<_> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|b| b.destination.to_string())
            .collect();
        assert_eq!(&ids[..2], &["A".to_string(), "B".to_string()]);
    }

    /// Config file -> RelayControl -> file sink + event stream
    #[tokio::test]
    async fn test_e2e_config_to_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.jsonl");
        let config = format!(
            r#"
[[destinations]]
id = "A"
filter = "/4/toggle1"
sink = {{ sink_type = "file", params = {{ path = "{}" }} }}

[[destinations]]
id = "B"
filter = "/4/*"
transform = "strip_prefix"
sink = {{ sink_type = "event_stream", params = {{ event_name = "osc_event_b" }} }}
"#,
            out.display()
        );
        let blueprint =
            config_loader::ConfigLoader::load_from_str(&config, config_loader::ConfigFormat::Toml)
                .unwrap();

        let hub = EventHub::new(16);
        let mut events = hub.subscribe();
        let control = RelayControl::build(blueprint.dispatch.clone(), hub, &blueprint.destinations)
            .await
            .unwrap();

        let report = control
            .dispatcher()
            .dispatch(Message::new("/4/toggle1", vec![OscArg::Float(1.0)]))
            .unwrap();
        assert_eq!(report.delivered(), 2);

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_name, "osc_event_b");
        assert_eq!(
            event.detail,
            serde_json::json!({ "address": "/toggle1", "arguments": [1.0] })
        );

        control.shutdown().await;
        let written = std::fs::read_to_string(&out).unwrap();
        let line: serde_json::Value = serde_json::from_str(written.lines().next().unwrap()).unwrap();
        assert_eq!(line["destination"], "A");
        assert_eq!(line["address"], "/4/toggle1");
    }

    /// 注册失败 (非法过滤器) 不改变注册表
    #[tokio::test]
    async fn test_invalid_registration_leaves_registry_intact() {
        let control = RelayControl::new(DispatchConfig::default(), EventHub::default());
        let good = DestinationConfig {
            id: "A".into(),
            filter: "/a".into(),
            transform: Transform::PassThrough,
            reply_to: None,
            sink: SinkConfig::default(),
        };
        control.register_destination(&good).await.unwrap();

        let bad = DestinationConfig {
            filter: "/a/*/b".into(),
            sink: SinkConfig {
                sink_type: SinkType::Log,
                queue_capacity: None,
                params: HashMap::new(),
            },
            ..good.clone()
        };
        assert!(control.register_destination(&bad).await.is_err());

        let bindings = control.list().unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].filter.to_string(), "/a");
        control.shutdown().await;
    }

    /// 并发替换/注销同一目的地后，绑定与 sink 始终成对存在
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reregister_and_unregister() {
        let control = RelayControl::new(DispatchConfig::default(), EventHub::default());
        let config = DestinationConfig {
            id: "A".into(),
            filter: "/4/*".into(),
            transform: Transform::PassThrough,
            reply_to: None,
            sink: SinkConfig::default(),
        };

        let dispatching = {
            let dispatcher = control.dispatcher();
            tokio::task::spawn_blocking(move || {
                // 快照可能早于注销，单条消息失败可以接受，但分发本身不能出错
                for _ in 0..2_000 {
                    let report = dispatcher.dispatch(Message::bare("/4/toggle1")).unwrap();
                    assert!(report.matched <= 1);
                }
            })
        };

        for _ in 0..300 {
            control.register_destination(&config).await.unwrap();
            let put = {
                let control = control.clone();
                let config = config.clone();
                tokio::spawn(async move { control.register_destination(&config).await })
            };
            let delete = {
                let control = control.clone();
                tokio::spawn(async move { control.unregister_destination("A").await })
            };
            put.await.unwrap().unwrap();
            delete.await.unwrap().unwrap();

            let bound = control.registry().get("A").unwrap().is_some();
            assert_eq!(bound, control.has_sink("A"), "binding and sink out of step");
        }

        dispatching.await.unwrap();
        control.shutdown().await;
    }
}
