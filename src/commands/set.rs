//! Setting command handlers.

use smx_stage::{Rgb, StageConfig, StageError};

use super::{open_selected, CommandResult};

/// Write the default configuration record
pub async fn write_defaults(serial: Option<&str>) -> CommandResult {
    let stage = open_selected(serial).await?;
    match stage.write_config(&StageConfig::default()).await {
        Ok(()) => {
            println!("Default configuration written.");
            Ok(())
        }
        Err(StageError::RateLimited { retry_in }) => {
            Err(format!("config was written recently, retry in {}ms", retry_in.as_millis()).into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Restore firmware defaults
pub async fn factory_reset(serial: Option<&str>) -> CommandResult {
    let stage = open_selected(serial).await?;
    let config = stage.factory_reset().await?;
    println!(
        "Factory reset done (record version {}, strip color {}).",
        config.config_version, config.platform_strip_color
    );
    Ok(())
}

/// Discard calibration and re-tare all sensors
pub async fn recalibrate(serial: Option<&str>) -> CommandResult {
    let stage = open_selected(serial).await?;
    stage.force_recalibration().await?;
    println!("Recalibration started. Keep off the panels for a few seconds.");
    Ok(())
}

/// Set the platform light strip to a solid color
pub async fn set_strip(serial: Option<&str>, red: u8, green: u8, blue: u8) -> CommandResult {
    let stage = open_selected(serial).await?;
    let color = Rgb::new(red, green, blue);
    stage.set_light_strip(color).await?;
    println!("Strip set to {color}.");
    Ok(())
}
