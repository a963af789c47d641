//! Command-line interface for one Whatsminer.
//!
//! Talks to the device directly using the same environment configuration as
//! the daemon.

use std::env;
use std::process;

use anyhow::{Context, Result, bail};

use whatsminer_monitor::config::MonitorConfig;
use whatsminer_monitor::control::{ControlHandle, ControlKey};
use whatsminer_monitor::coordinator::{Coordinator, MinerData};
use whatsminer_monitor::detect::{self, ClientSlot};
use whatsminer_monitor::setup;

fn usage() {
    eprintln!("Usage: whatsminer-cli <command> [arg]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  detect               Show API version and dialect");
    eprintln!("  validate             Run the setup validation");
    eprintln!("  status               Poll once and print the snapshot");
    eprintln!("  power-on             Start hashing");
    eprintln!("  power-off            Stop hashing");
    eprintln!("  restart              Restart the mining process");
    eprintln!("  reload               Reload the miner configuration");
    eprintln!("  reboot               Reboot the control board");
    eprintln!("  low-power            Switch to low-power mode");
    eprintln!("  frequency <pct>      Set target frequency offset (-10..100)");
    eprintln!("  power-limit <pct>    Set power limit (0..100)");
    eprintln!("  fast-boot <on|off>   Toggle fast boot");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  WHATSMINER_HOST       Miner address (required)");
    eprintln!("  WHATSMINER_PORT       API port (default: 4028)");
    eprintln!("  WHATSMINER_PASSWORD   Admin password (default: admin)");
    eprintln!("  WHATSMINER_MAC        Device MAC (default: read from the miner)");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        usage();
        process::exit(1);
    }

    let config = MonitorConfig::from_env().context("WHATSMINER_HOST is not set")?;
    let command = args[1].as_str();
    let arg = args.get(2).map(String::as_str);

    match command {
        "detect" => cmd_detect(&config).await?,
        "validate" => cmd_validate(&config).await?,
        "status" => cmd_status(&config).await?,
        "power-on" => cmd_control(&config, ControlKey::Power, true).await?,
        "power-off" => cmd_control(&config, ControlKey::Power, false).await?,
        "restart" => cmd_control(&config, ControlKey::RestartMiner, true).await?,
        "reload" => cmd_control(&config, ControlKey::ReloadConfiguration, true).await?,
        "reboot" | "low-power" | "frequency" | "power-limit" | "fast-boot" => {
            cmd_tune(&config, command, arg).await?
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            process::exit(1);
        }
    }

    Ok(())
}

fn slot(config: &MonitorConfig) -> ClientSlot {
    ClientSlot::for_descriptor(&config.descriptor, config.coordinator.call_timeout)
}

async fn cmd_detect(config: &MonitorConfig) -> Result<()> {
    let detected =
        detect::detect_descriptor(&config.descriptor, config.coordinator.call_timeout).await?;

    println!("API:      {}", detected.version.api_version);
    println!("Firmware: {}", detected.version.firmware_version);
    println!("Dialect:  {}", detected.dialect());
    Ok(())
}

async fn cmd_validate(config: &MonitorConfig) -> Result<()> {
    match setup::validate(&config.descriptor, config.coordinator.call_timeout).await {
        Ok(validated) => {
            println!("Title:   {}", validated.title);
            println!("MAC:     {}", validated.mac);
            println!("API:     {}", validated.version.api_version);
            println!("Dialect: {}", validated.dialect);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", e.key(), e);
            process::exit(2);
        }
    }
}

async fn cmd_status(config: &MonitorConfig) -> Result<()> {
    let mut coordinator = Coordinator::new(&config.descriptor, config.coordinator);
    let data = coordinator.refresh().await?;

    println!("Model:    {}", data.model_or_unknown());
    match &data {
        MinerData::Online {
            summary,
            power_unit,
            version,
            ..
        } => {
            println!("State:    online");
            println!("Firmware: {}", version.firmware_version);
            println!("Hashrate: {} GH/s (avg {})", summary.hash_rate_5s, summary.average_hash_rate);
            println!("Power:    {} W ({} J/TH)", summary.power, summary.power_rate);
            println!("Temp:     {} C (env {} C)", summary.temperature, summary.environment_temperature);
            println!("Fans:     in {} / out {} rpm", summary.fan_speed_in, summary.fan_speed_out);
            println!("Shares:   {} accepted, {} rejected", summary.accepted, summary.rejected);
            println!("PSU:      {} ({})", power_unit.model, power_unit.software_version);
            println!("MAC:      {}", summary.mac);
        }
        MinerData::Base { .. } => println!("State:    not mining"),
    }
    Ok(())
}

async fn cmd_control(config: &MonitorConfig, key: ControlKey, on: bool) -> Result<()> {
    let control = ControlHandle::resolve(slot(config), config.device_mac.as_deref()).await?;
    control.trigger(key, on).await?;
    println!("{} ({}): ok", key.label(), control.unique_id(key));
    Ok(())
}

async fn cmd_tune(config: &MonitorConfig, command: &str, arg: Option<&str>) -> Result<()> {
    let api = slot(config).acquire().await?.api;

    match (command, arg) {
        ("reboot", _) => api.reboot().await?,
        ("low-power", _) => api.set_power_mode().await?,
        ("frequency", Some(pct)) => {
            let pct = pct.parse().context("frequency offset must be an integer")?;
            api.set_target_frequency(pct).await?
        }
        ("power-limit", Some(pct)) => {
            let pct = pct.parse().context("power limit must be 0..100")?;
            api.set_power_percent(pct).await?
        }
        ("fast-boot", Some("on")) => api.set_fast_boot(true).await?,
        ("fast-boot", Some("off")) => api.set_fast_boot(false).await?,
        _ => bail!("{command}: missing or invalid argument"),
    }

    println!("{command}: ok");
    Ok(())
}
