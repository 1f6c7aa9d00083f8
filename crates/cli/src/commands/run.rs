//! `run` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use contracts::{HttpConfig, Lifecycle, RelayBlueprint};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::Relay;

/// Execute the `run` command
pub async fn run_relay(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    apply_overrides(&mut blueprint, args);
    config_loader::ConfigLoader::validate(&blueprint).context("Invalid configuration after CLI overrides")?;

    info!(
        listener = %blueprint.listener.bind_addr(),
        http = ?blueprint.http.as_ref().map(|h| h.bind_addr()),
        destinations = blueprint.destinations.len(),
        midi_devices = blueprint.midi_devices.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let mut relay = Relay::new(blueprint);
    relay.start().await.context("Failed to start relay")?;

    if let Some(addr) = relay.osc_addr() {
        println!("Listening for OSC on udp://{addr}");
    }
    if let Some(addr) = relay.http_addr() {
        println!("HTTP API on http://{addr}/api");
    }

    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    tokio::select! {
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping relay...");
        }
        _ = sleep_or_forever(timeout) => {
            info!(timeout_secs = args.timeout, "Run timeout reached, stopping relay...");
        }
    }

    let stats = relay.shutdown().await.context("Failed to stop relay")?;
    stats.print_summary();

    info!("OSC Relay finished");
    Ok(())
}

/// CLI flags win over the file
fn apply_overrides(blueprint: &mut RelayBlueprint, args: &RunArgs) {
    if let Some(ref host) = args.host {
        info!(host = %host, "Overriding listener host from CLI");
        blueprint.listener.host = host.clone();
    }
    if let Some(port) = args.port {
        info!(port, "Overriding listener port from CLI");
        blueprint.listener.port = port;
    }
    if let Some(port) = args.http_port {
        info!(port, "Overriding HTTP port from CLI");
        blueprint.http.get_or_insert_with(HttpConfig::default).port = port;
    }
    if args.no_http {
        info!("HTTP API disabled from CLI");
        blueprint.http = None;
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &RelayBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Listener: udp://{}", blueprint.listener.bind_addr());
    println!(
        "  Queue: {} ({:?})",
        blueprint.listener.queue_capacity, blueprint.listener.drop_policy
    );
    match &blueprint.http {
        Some(http) => println!("HTTP API: http://{} (cors: {})", http.bind_addr(), http.cors),
        None => println!("HTTP API: disabled"),
    }

    println!("\nDestinations ({}):", blueprint.destinations.len());
    for dest in &blueprint.destinations {
        println!(
            "  - {} {} -> {:?} ({:?})",
            dest.id, dest.filter, dest.sink.sink_type, dest.transform
        );
    }

    if !blueprint.midi_devices.is_empty() {
        println!("\nMIDI devices ({}):", blueprint.midi_devices.len());
        for device in &blueprint.midi_devices {
            println!("  - {}", device.name);
        }
    }

    println!();
}
