mod cli;
mod config;
mod control;
mod control_tree;
mod device;
mod discovery;
mod errors;
mod fan;
mod firmware;
mod power;
mod status;

use std::thread;
use std::time::Duration;

use std::fs::File;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::Serialize;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

use cli::{Cli, Commands, PowerArg};
use config::load_config;
use control_tree::ControlTree;
use device::DeviceContext;
use fan::{FanCapability, FanStatus, PowerState};
use firmware::EmulatedNamespace;

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log to acpifan.log next to the executable.
    let log_path = std::env::current_exe()
        .unwrap_or_default()
        .parent()
        .unwrap_or(std::path::Path::new("."))
        .join("acpifan.log");
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let log_level = level_from_verbosity(cli.verbose);
    if let Ok(file) = File::create(&log_path) {
        let _ = WriteLogger::init(log_level, log_config, file);
    }
    info!("acpifan started (log level: {})", log_level);

    let config = load_config(&cli.device)
        .with_context(|| format!("loading device description {}", cli.device.display()))?;
    let gateway = EmulatedNamespace::new(config.device);
    let device = DeviceContext::attach(Box::new(gateway), config.policy)
        .context("attaching fan device")?;

    let result = match cli.command {
        Commands::Probe => cmd_probe(&device, cli.json),
        Commands::Status { cached } => cmd_status(&device, cached, cli.json),
        Commands::Set { value } => cmd_set(&device, value),
        Commands::Power { state } => cmd_power(&device, state),
        Commands::Endpoints => cmd_endpoints(&device, cli.json),
        Commands::Read { name } => cmd_read(&device, &name),
        Commands::Write { name, value } => cmd_write(&device, &name, value),
        Commands::Cycle => cmd_cycle(&device, cli.json),
        Commands::Monitor { interval, count } => cmd_monitor(&device, interval, count),
    };
    device.detach();
    result
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_probe(device: &DeviceContext, json: bool) -> Result<()> {
    let capability = device.capability();
    if json {
        return print_json(capability);
    }

    println!("{} - {}", discovery::DEVICE_DESCRIPTION, capability);
    if let Some(info) = capability.info() {
        println!(
            "fine grain: {}  step size: {}  low speed notify: {}",
            info.fine_grain, info.step_size, info.low_speed_notify
        );
    }
    if let Some(table) = capability.table() {
        println!("\nperformance states (revision {})", table.revision());
        println!(
            "{:<8} {:>8} {:>8} {:>8} {:>6} {:>8}",
            "STATE", "CONTROL", "TRIP", "RPM", "NOISE", "POWER"
        );
        println!("{}", "-".repeat(52));
        for state in table.states() {
            println!(
                "{:<8} {:>8} {:>8} {:>8} {:>6} {:>8}",
                state.label,
                state.control_value,
                state.trip_point,
                state.rated_speed_rpm,
                state.noise_level,
                state.power_mw
            );
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    power: PowerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<FanStatus>,
}

fn read_report(device: &DeviceContext) -> Result<StatusReport> {
    let power = device.probe_power()?;
    let status = match device.capability() {
        FanCapability::Legacy => None,
        _ => Some(device.refresh()?),
    };
    Ok(StatusReport { power, status })
}

fn print_report(report: &StatusReport) {
    match &report.status {
        Some(status) => println!("power {}, {}", report.power, status),
        None => println!("power {}", report.power),
    }
}

fn cached_report(device: &DeviceContext) -> StatusReport {
    let status = match device.capability() {
        FanCapability::Legacy => None,
        _ => Some(device.read_cached()),
    };
    StatusReport {
        power: device.power_state(),
        status,
    }
}

fn cmd_status(device: &DeviceContext, cached: bool, json: bool) -> Result<()> {
    let report = if cached {
        cached_report(device)
    } else {
        read_report(device)?
    };
    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn cmd_set(device: &DeviceContext, value: i64) -> Result<()> {
    let applied = device.set_control(value)?;
    println!("Set fan control to {}", applied);
    Ok(())
}

fn cmd_power(device: &DeviceContext, state: PowerArg) -> Result<()> {
    let on = matches!(state, PowerArg::On);
    device.set_power(on)?;
    println!("Fan turned {}", if on { "on" } else { "off" });
    Ok(())
}

#[derive(Serialize)]
struct EndpointReport {
    #[serde(flatten)]
    endpoint: control_tree::Endpoint,
    value: Option<control_tree::EndpointValue>,
    error: Option<String>,
}

fn cmd_endpoints(device: &DeviceContext, json: bool) -> Result<()> {
    let tree = ControlTree::new(device);
    let reports: Vec<EndpointReport> = tree
        .endpoints()
        .into_iter()
        .map(|endpoint| {
            let (value, error) = match tree.read(endpoint.name) {
                Ok(value) => (Some(value), None),
                Err(error) => (None, Some(error.to_string())),
            };
            EndpointReport {
                endpoint,
                value,
                error,
            }
        })
        .collect();

    if json {
        return print_json(&reports);
    }

    println!("{:<18} {:<4} {:<12} DESCRIPTION", "ENDPOINT", "RW", "VALUE");
    println!("{}", "-".repeat(70));
    for report in &reports {
        let access = match report.endpoint.access {
            control_tree::Access::ReadOnly => "r",
            control_tree::Access::ReadWrite => "rw",
        };
        let value = match (&report.value, &report.error) {
            (Some(value), _) => value.to_string(),
            (None, Some(_)) => "error".into(),
            (None, None) => "\u{2014}".into(),
        };
        println!(
            "{:<18} {:<4} {:<12} {}",
            report.endpoint.name, access, value, report.endpoint.description
        );
    }
    Ok(())
}

fn cmd_read(device: &DeviceContext, name: &str) -> Result<()> {
    let value = ControlTree::new(device).read(name)?;
    println!("{}", value);
    Ok(())
}

fn cmd_write(device: &DeviceContext, name: &str, value: i64) -> Result<()> {
    let applied = ControlTree::new(device).write(name, value)?;
    println!("{}: {}", name, applied);
    Ok(())
}

#[derive(Serialize)]
struct CycleReport {
    before: StatusReport,
    suspended: PowerState,
    after: StatusReport,
}

fn cmd_cycle(device: &DeviceContext, json: bool) -> Result<()> {
    let before = read_report(device)?;
    device.suspend()?;
    let suspended = device.power_state();
    device.resume()?;
    let after = read_report(device)?;

    let report = CycleReport {
        before,
        suspended,
        after,
    };
    if json {
        return print_json(&report);
    }
    print!("before:    ");
    print_report(&report.before);
    println!("suspended: power {}", report.suspended);
    print!("resumed:   ");
    print_report(&report.after);
    Ok(())
}

fn cmd_monitor(device: &DeviceContext, interval_secs: u64, count: Option<u64>) -> Result<()> {
    println!("Monitoring fan (Ctrl+C to stop)...\n");
    println!("{:<8} {:>8} {:>8}", "POWER", "CONTROL", "RPM");
    println!("{}", "-".repeat(26));

    let mut samples = 0;
    loop {
        let report = read_report(device)?;
        match report.status {
            Some(status) => println!(
                "{:<8} {:>8} {:>8}",
                report.power.to_string(),
                status.control_value,
                status.current_speed_rpm
            ),
            None => println!("{:<8} {:>8} {:>8}", report.power.to_string(), "\u{2014}", "\u{2014}"),
        }

        samples += 1;
        if count.is_some_and(|limit| samples >= limit) {
            return Ok(());
        }
        thread::sleep(Duration::from_secs(interval_secs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DevicePolicy;
    use crate::firmware::{NamespaceFixture, FST};

    #[test]
    fn status_accepts_cached_flag() {
        let cli = Cli::try_parse_from(["acpifan", "status", "--cached"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { cached: true }));
    }

    #[test]
    fn cached_report_skips_firmware() {
        let fixture: NamespaceFixture = serde_json::from_str(
            r#"{ "hardware_id": "INTC1063", "fif": [0, 1, 5, 0],
                 "fps": [0, [100, 0, 5000, 40, 3000]], "initial_control": 40 }"#,
        )
        .unwrap();
        let namespace = EmulatedNamespace::new(fixture);
        let device = DeviceContext::attach(Box::new(namespace.clone()), DevicePolicy::default()).unwrap();
        device.set_control(70).unwrap();
        let reads = namespace.evaluations(FST);

        let report = cached_report(&device);
        assert_eq!(report.power, PowerState::On);
        assert_eq!(report.status.map(|status| status.control_value), Some(70));
        assert_eq!(namespace.evaluations(FST), reads);
    }
}
