// CLI definitions using clap

use clap::{Parser, Subcommand, ValueEnum};

use smx_stage::SensorTestMode;

#[derive(Parser)]
#[command(name = "smx_driver")]
#[command(author, version, about = "StepManiaX stage driver and diagnostics")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Select a stage by serial number (default: first stage found)
    #[arg(long, global = true, value_name = "SERIAL")]
    pub serial: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Query Commands ===
    /// List connected stages
    #[command(visible_alias = "ls")]
    List {
        /// Machine-readable JSON output
        #[arg(long)]
        json: bool,
    },

    /// Show device identity (serial, firmware, player slot)
    #[command(visible_alias = "i")]
    Info,

    /// Show the stage configuration
    #[command(visible_aliases = ["cfg", "c"])]
    Config {
        /// Dump the raw 250-byte record as hex
        #[arg(long)]
        hex: bool,
    },

    /// Read one sensor diagnostic frame
    #[command(visible_alias = "test")]
    TestData {
        /// Which measurement to sample
        #[arg(long, value_enum, default_value = "calibrated")]
        mode: TestMode,
    },

    /// Stream panel input events until interrupted
    #[command(visible_alias = "w")]
    Watch,

    // === Set Commands ===
    /// Write the default configuration record
    WriteDefaults,

    /// Restore firmware defaults (also re-applies the strip color)
    FactoryReset,

    /// Discard calibration and re-tare all sensors
    #[command(visible_alias = "recal")]
    Recalibrate,

    /// Set the platform light strip to a solid color
    #[command(visible_alias = "strip")]
    SetStrip {
        red: u8,
        green: u8,
        blue: u8,
    },
}

/// Diagnostic measurement selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TestMode {
    Uncalibrated,
    Calibrated,
    Noise,
    Tare,
}

impl From<TestMode> for SensorTestMode {
    fn from(mode: TestMode) -> Self {
        match mode {
            TestMode::Uncalibrated => SensorTestMode::UncalibratedValues,
            TestMode::Calibrated => SensorTestMode::CalibratedValues,
            TestMode::Noise => SensorTestMode::Noise,
            TestMode::Tare => SensorTestMode::Tare,
        }
    }
}
