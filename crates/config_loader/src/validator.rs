//! 配置校验模块
//!
//! 校验规则：
//! - destination id 非空且唯一，事件名在目的地之间唯一
//! - filter 语法合法，strip_prefix 仅配合前缀过滤器
//! - 队列容量 > 0，投递超时 > 0，监听端口 > 0
//! - network sink 需要可解析的 `addr`，file sink 需要 `path`
//! - MIDI 设备名非空、唯一、可作为地址段；MIDI 事件名唯一

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{RelayBlueprint, RelayError, SinkType};

/// 校验 RelayBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    validate_listener(blueprint)?;
    validate_dispatch(blueprint)?;
    validate_destination_ids(blueprint)?;
    validate_event_names(blueprint)?;
    validate_filters(blueprint)?;
    validate_sinks(blueprint)?;
    validate_midi_devices(blueprint)?;
    Ok(())
}

/// 校验监听配置
fn validate_listener(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    let listener = &blueprint.listener;
    if listener.port == 0 {
        return Err(RelayError::config_validation(
            "listener.port",
            "listener port must be > 0",
        ));
    }
    if listener.queue_capacity == 0 {
        return Err(RelayError::config_validation(
            "listener.queue_capacity",
            "queue_capacity must be > 0",
        ));
    }
    if listener.max_datagram_size == 0 {
        return Err(RelayError::config_validation(
            "listener.max_datagram_size",
            "max_datagram_size must be > 0",
        ));
    }
    Ok(())
}

/// 校验分发配置
fn validate_dispatch(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    let dispatch = &blueprint.dispatch;
    if dispatch.delivery_timeout_ms == 0 {
        return Err(RelayError::config_validation(
            "dispatch.delivery_timeout_ms",
            "delivery_timeout_ms must be > 0",
        ));
    }
    if dispatch.default_queue_capacity == 0 {
        return Err(RelayError::config_validation(
            "dispatch.default_queue_capacity",
            "default_queue_capacity must be > 0",
        ));
    }
    Ok(())
}

/// 校验 destination id 唯一性
fn validate_destination_ids(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    let mut seen = HashSet::new();
    for (idx, dest) in blueprint.destinations.iter().enumerate() {
        if dest.id.trim().is_empty() {
            return Err(RelayError::config_validation(
                format!("destinations[{idx}].id"),
                "destination id cannot be empty",
            ));
        }
        if !seen.insert(dest.id.as_str()) {
            return Err(RelayError::config_validation(
                format!("destinations[id={}]", dest.id),
                "duplicate destination id",
            ));
        }
    }
    Ok(())
}

/// 校验事件名唯一 (出站发送按事件名查找目的地)
fn validate_event_names(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    let mut seen = HashSet::new();
    for dest in &blueprint.destinations {
        let event_name = dest.event_name();
        if event_name.is_empty() {
            return Err(RelayError::config_validation(
                format!("destinations[{}].sink.params.event_name", dest.id),
                "event_name cannot be empty",
            ));
        }
        if !seen.insert(event_name) {
            return Err(RelayError::config_validation(
                format!("destinations[{}].sink.params.event_name", dest.id),
                format!("event name '{event_name}' is used by another destination"),
            ));
        }
    }
    Ok(())
}

/// 校验过滤器与变换
fn validate_filters(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    for dest in &blueprint.destinations {
        dest.to_binding().map_err(|e| {
            RelayError::config_validation(format!("destinations[{}].filter", dest.id), e.to_string())
        })?;
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    for dest in &blueprint.destinations {
        let sink = &dest.sink;
        if sink.queue_capacity == Some(0) {
            return Err(RelayError::config_validation(
                format!("destinations[{}].sink.queue_capacity", dest.id),
                "queue_capacity must be > 0",
            ));
        }

        match sink.sink_type {
            SinkType::Network => {
                let addr = sink.params.get("addr").ok_or_else(|| {
                    RelayError::config_validation(
                        format!("destinations[{}].sink.params.addr", dest.id),
                        "network sink requires 'addr'",
                    )
                })?;
                addr.parse::<SocketAddr>().map_err(|e| {
                    RelayError::config_validation(
                        format!("destinations[{}].sink.params.addr", dest.id),
                        format!("invalid address '{addr}': {e}"),
                    )
                })?;
            }
            SinkType::File => {
                if sink.params.get("path").is_none_or(|p| p.is_empty()) {
                    return Err(RelayError::config_validation(
                        format!("destinations[{}].sink.params.path", dest.id),
                        "file sink requires 'path'",
                    ));
                }
            }
            SinkType::Log | SinkType::EventStream => {}
        }
    }
    Ok(())
}

/// 校验 MIDI 设备
fn validate_midi_devices(blueprint: &RelayBlueprint) -> Result<(), RelayError> {
    let mut seen = HashSet::new();
    for (idx, device) in blueprint.midi_devices.iter().enumerate() {
        let name = device.name.as_str();
        let address_safe = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !address_safe {
            return Err(RelayError::config_validation(
                format!("midi_devices[{idx}].name"),
                format!("'{name}' must be non-empty and use [A-Za-z0-9_.-] only"),
            ));
        }
        if !seen.insert(name) {
            return Err(RelayError::config_validation(
                format!("midi_devices[name={name}]"),
                "duplicate midi device name",
            ));
        }
        if device.port.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(RelayError::config_validation(
                format!("midi_devices[name={name}].port"),
                "port name cannot be empty",
            ));
        }
    }

    let mut event_names = HashSet::new();
    for device in &blueprint.midi_devices {
        if !event_names.insert(device.event_name()) {
            return Err(RelayError::config_validation(
                format!("midi_devices[name={}].event_name", device.name),
                format!("midi event name '{}' is used twice", device.event_name()),
            ));
        }
    }
    Ok(())
}
