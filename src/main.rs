//! StepManiaX Stage Driver CLI
//!
//! A command-line interface for StepManiaX dance stages: identity,
//! configuration, calibration, lights and sensor diagnostics over HID.

use clap::Parser;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers (split from main.rs)
mod commands;

#[tokio::main]
async fn main() -> commands::CommandResult {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("smx_stage=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let serial = cli.serial.as_deref();

    match cli.command {
        None => {
            // Default: show device info
            commands::query::info(serial).await?;
        }

        // === Query Commands ===
        Some(Commands::List { json }) => {
            commands::query::list(json)?;
        }
        Some(Commands::Info) => {
            commands::query::info(serial).await?;
        }
        Some(Commands::Config { hex }) => {
            commands::query::config(serial, hex).await?;
        }
        Some(Commands::TestData { mode }) => {
            commands::query::test_data(serial, mode.into()).await?;
        }
        Some(Commands::Watch) => {
            commands::query::watch(serial).await?;
        }

        // === Set Commands ===
        Some(Commands::WriteDefaults) => {
            commands::set::write_defaults(serial).await?;
        }
        Some(Commands::FactoryReset) => {
            commands::set::factory_reset(serial).await?;
        }
        Some(Commands::Recalibrate) => {
            commands::set::recalibrate(serial).await?;
        }
        Some(Commands::SetStrip { red, green, blue }) => {
            commands::set::set_strip(serial, red, green, blue).await?;
        }
    }

    Ok(())
}
