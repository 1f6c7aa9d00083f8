//! # OSC Relay CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 中继编排与生命周期管理
//! - 优雅关闭处理

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_relay, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Prometheus 只在 run 命令下启用
    let metrics_port = match &cli.command {
        Commands::Run(args) if !args.dry_run => args.metrics_port,
        _ => 0,
    };
    observability::init_with_config(
        ObservabilityConfig {
            log_format: cli.log_format.into(),
            ..ObservabilityConfig::default()
        }
        .with_verbosity(cli.verbose, cli.quiet)
        .with_metrics_port(metrics_port),
    )?;

    info!(version = env!("CARGO_PKG_VERSION"), "OSC Relay CLI starting");

    let result = match &cli.command {
        Commands::Run(args) => run_relay(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
