use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "acpifan")]
#[command(about = "Control an ACPI fan through its _FIF/_FPS/_FSL/_FST objects")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Device description file (JSON)
    #[arg(short, long, global = true, default_value = "fan.json")]
    pub device: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PowerArg {
    On,
    Off,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the discovered control mode and performance states
    Probe,

    /// Read the current fan status from firmware
    Status {
        /// Show the last known status without querying firmware
        #[arg(long)]
        cached: bool,
    },

    /// Set the fan level (discrete), percentage (fine grain) or 0/1 (legacy)
    Set {
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },

    /// Turn the fan on or off
    Power {
        #[arg(value_enum)]
        state: PowerArg,
    },

    /// List the published control endpoints with their current values
    Endpoints,

    /// Read one control endpoint
    Read {
        /// Endpoint name (use 'endpoints' to see available names)
        name: String,
    },

    /// Write one control endpoint
    Write {
        /// Endpoint name (use 'endpoints' to see available names)
        name: String,

        #[arg(allow_negative_numbers = true)]
        value: i64,
    },

    /// Suspend and resume the fan, showing the status before and after
    Cycle,

    /// Monitor the fan status
    Monitor {
        /// Refresh interval in seconds
        #[arg(short, long, default_value = "1")]
        interval: u64,

        /// Stop after this many samples
        #[arg(short, long)]
        count: Option<u64>,
    },
}
