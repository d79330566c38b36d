//! Command handlers for the CLI application.
//!
//! - `query`: read-only commands (list, info, config, test-data, watch)
//! - `set`: commands that change stage state (write-defaults, factory-reset,
//!   recalibrate, set-strip)

pub mod query;
pub mod set;

use smx_stage::StageInterface;

/// Result type for command handlers
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Open the selected stage: by serial when given, otherwise the first found.
pub async fn open_selected(
    serial: Option<&str>,
) -> Result<StageInterface, Box<dyn std::error::Error>> {
    match serial {
        Some(serial) => {
            let stages = StageInterface::list()?;
            let descriptor = stages
                .iter()
                .find(|d| d.serial.as_deref() == Some(serial))
                .ok_or_else(|| format!("no stage with serial {serial}"))?;
            Ok(StageInterface::open(descriptor).await?)
        }
        None => Ok(StageInterface::open_any().await?),
    }
}
