//! Query (read-only) command handlers.

use smx_stage::{Panel, PanelInputs, SensorTestMode, StageEvent, StageInterface};
use tokio::sync::broadcast::error::RecvError;

use super::{open_selected, CommandResult};

/// List connected stages
pub fn list(json: bool) -> CommandResult {
    let stages = StageInterface::list()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stages)?);
        return Ok(());
    }
    if stages.is_empty() {
        println!("No stages found.");
        return Ok(());
    }
    for (i, stage) in stages.iter().enumerate() {
        println!(
            "{i}: {:04X}:{:04X} serial={} path={}",
            stage.vendor_id,
            stage.product_id,
            stage.serial.as_deref().unwrap_or("-"),
            stage.path
        );
    }
    Ok(())
}

/// Show device identity
pub async fn info(serial: Option<&str>) -> CommandResult {
    let stage = open_selected(serial).await?;
    let info = stage.device_info();
    println!("Serial:   {}", info.serial);
    println!("Firmware: {}", info.firmware_version);
    println!("Player:   {}", info.player);
    Ok(())
}

/// Show the stage configuration
pub async fn config(serial: Option<&str>, hex: bool) -> CommandResult {
    let stage = open_selected(serial).await?;
    let config = stage.config().await?;

    if hex {
        for (i, chunk) in config.encode().chunks(16).enumerate() {
            print!("{:04X}:", i * 16);
            for byte in chunk {
                print!(" {byte:02X}");
            }
            println!();
        }
        return Ok(());
    }

    println!("Config:");
    println!(
        "  Record version:   {} (master firmware {})",
        config.config_version, config.master_version
    );
    println!("  Flags:            {:#04X}", config.flags);
    println!(
        "  Debounce:         no-delay {} ms, delay {} ms, panel {} us",
        config.debounce_no_delay_ms, config.debounce_delay_ms, config.panel_debounce_us
    );
    println!(
        "  Auto-calibration: max deviation {}, max tare {}, {} avg/update, {} samples/avg",
        config.auto_calibration_max_deviation,
        config.auto_calibration_max_tare,
        config.auto_calibration_averages_per_update,
        config.auto_calibration_samples_per_average
    );
    println!(
        "  Auto-lights:      timeout {:.1} s, panel mask {:#05X}",
        config.auto_lights_timeout as f32 * 0.128,
        config.auto_light_panel_mask
    );
    println!("  Strip color:      {}", config.platform_strip_color);
    println!("  Rotation:         {}", config.panel_rotation);
    println!("  Panel thresholds (combined low/high):");
    for (i, settings) in config.panel_settings.iter().enumerate() {
        let name = Panel::from_bit(i as u8).map(Panel::name).unwrap_or("?");
        println!(
            "    {i} {name:<10} {} / {}   color {}",
            settings.combined_low_threshold, settings.combined_high_threshold, config.step_color[i]
        );
    }
    Ok(())
}

/// Read one sensor diagnostic frame
pub async fn test_data(serial: Option<&str>, mode: SensorTestMode) -> CommandResult {
    let stage = open_selected(serial).await?;
    let data = stage.sensor_test_data(mode).await?;

    println!("Sensor readings ({}):", data.mode.name());
    for (i, panel) in data.panels.iter().enumerate() {
        let name = Panel::from_bit(i as u8).map(Panel::name).unwrap_or("?");
        if !panel.present {
            println!("  {i} {name:<10} absent");
            continue;
        }
        print!("  {i} {name:<10}");
        for (slot, value) in panel.sensors.iter().enumerate() {
            let mark = if panel.bad_sensors[slot] { "!" } else { " " };
            print!(" {value:>6}{mark}");
        }
        println!(" dip={}", panel.dip_switch);
    }
    Ok(())
}

/// Stream panel input events until interrupted
pub async fn watch(serial: Option<&str>) -> CommandResult {
    let stage = open_selected(serial).await?;
    let mut events = stage.subscribe_inputs();
    println!("Watching panel inputs, Ctrl-C to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(StageEvent::InputState { mask }) => {
                    println!("{}", PanelInputs::from_mask(mask));
                }
                Err(RecvError::Lagged(n)) => eprintln!("(dropped {n} events)"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
