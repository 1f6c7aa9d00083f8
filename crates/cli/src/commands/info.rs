//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::RelayBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    listener: ListenerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    http: Option<String>,
    destinations: Vec<DestinationInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    midi_devices: Vec<String>,
}

#[derive(Serialize)]
struct ListenerInfo {
    bind_addr: String,
    queue_capacity: usize,
    drop_policy: String,
}

#[derive(Serialize)]
struct DestinationInfo {
    id: String,
    filter: String,
    transform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sink: Option<SinkInfo>,
}

#[derive(Serialize)]
struct SinkInfo {
    sink_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_capacity: Option<usize>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &RelayBlueprint, args: &InfoArgs) -> ConfigInfo {
    let destinations = blueprint
        .destinations
        .iter()
        .map(|d| DestinationInfo {
            id: d.id.clone(),
            filter: d.filter.clone(),
            transform: format!("{:?}", d.transform),
            reply_to: d.reply_to.map(|a| a.to_string()),
            sink: args.sinks.then(|| SinkInfo {
                sink_type: format!("{:?}", d.sink.sink_type),
                queue_capacity: d.sink.queue_capacity,
                params: d.sink.params.clone(),
            }),
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        listener: ListenerInfo {
            bind_addr: blueprint.listener.bind_addr(),
            queue_capacity: blueprint.listener.queue_capacity,
            drop_policy: format!("{:?}", blueprint.listener.drop_policy),
        },
        http: blueprint.http.as_ref().map(|h| h.bind_addr()),
        destinations,
        midi_devices: blueprint.midi_devices.iter().map(|m| m.name.clone()).collect(),
    }
}

fn print_config_info(blueprint: &RelayBlueprint, args: &InfoArgs) {
    println!("=== OSC Relay Configuration ===\n");

    println!("Listener");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Address: udp://{}", blueprint.listener.bind_addr());
    println!(
        "   └─ Queue: {} ({:?})",
        blueprint.listener.queue_capacity, blueprint.listener.drop_policy
    );

    println!("\nDispatch");
    println!(
        "   ├─ Delivery timeout: {} ms",
        blueprint.dispatch.delivery_timeout_ms
    );
    println!(
        "   └─ Default sink queue: {}",
        blueprint.dispatch.default_queue_capacity
    );

    match &blueprint.http {
        Some(http) => println!("\nHTTP API: http://{} (cors: {})", http.bind_addr(), http.cors),
        None => println!("\nHTTP API: disabled"),
    }

    println!("\nDestinations ({})", blueprint.destinations.len());
    for (i, dest) in blueprint.destinations.iter().enumerate() {
        let is_last = i == blueprint.destinations.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {} {} ({:?})", prefix, dest.id, dest.filter, dest.transform);
        if let Some(reply_to) = dest.reply_to {
            println!("   {}  ├─ reply_to: {}", child_prefix, reply_to);
        }
        if args.sinks {
            println!("   {}  └─ sink: {:?}", child_prefix, dest.sink.sink_type);
            let mut params: Vec<_> = dest.sink.params.iter().collect();
            params.sort();
            for (key, value) in params {
                println!("   {}        {} = {}", child_prefix, key, value);
            }
        }
    }

    if !blueprint.midi_devices.is_empty() {
        println!("\nMIDI devices ({})", blueprint.midi_devices.len());
        for device in &blueprint.midi_devices {
            println!("   - {}", device.name);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_details_only_when_requested() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            r#"
[[destinations]]
id = "A"
filter = "/4/*"
reply_to = "127.0.0.1:9000"
sink = { sink_type = "network", params = { addr = "127.0.0.1:9001" } }
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let mut args = InfoArgs {
            config: "relay.toml".into(),
            json: true,
            sinks: false,
        };
        let info = build_config_info(&blueprint, &args);
        assert!(info.destinations[0].sink.is_none());
        assert_eq!(info.destinations[0].reply_to.as_deref(), Some("127.0.0.1:9000"));

        args.sinks = true;
        let info = build_config_info(&blueprint, &args);
        let sink = info.destinations[0].sink.as_ref().unwrap();
        assert_eq!(sink.sink_type, "Network");
        assert_eq!(sink.params["addr"], "127.0.0.1:9001");
    }
}
