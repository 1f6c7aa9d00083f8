//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{RelayBlueprint, SinkType};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    listener: String,
    http: Option<String>,
    destination_count: usize,
    midi_device_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    listener: blueprint.listener.bind_addr(),
                    http: blueprint.http.as_ref().map(|h| h.bind_addr()),
                    destination_count: blueprint.destinations.len(),
                    midi_device_count: blueprint.midi_devices.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &RelayBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.destinations.is_empty() && blueprint.http.is_none() {
        warnings.push(
            "No destinations and no HTTP API - every message will be unmatched".to_string(),
        );
    }

    let has_event_stream = blueprint
        .destinations
        .iter()
        .any(|d| d.sink.sink_type == SinkType::EventStream);
    if has_event_stream && blueprint.http.is_none() {
        warnings.push(
            "event_stream sinks configured without [http] - browser events have no subscribers"
                .to_string(),
        );
    }

    for dest in &blueprint.destinations {
        if dest.filter == "*" || dest.filter == "/*" {
            warnings.push(format!("Destination '{}' receives every message", dest.id));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Listener: {}", summary.listener);
            println!(
                "  HTTP API: {}",
                summary.http.as_deref().unwrap_or("disabled")
            );
            println!("  Destinations: {}", summary.destination_count);
            println!("  MIDI devices: {}", summary.midi_device_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
