//! `capwatch` - CLI for the screen-capture detection engine.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use capwatch::cli::{Cli, Command, ConfigCommand, ScanCommand, WatchCommand};
use capwatch::{init_logging, Classifier, Config, DetectionEngine, RiskLevel, SystemProbe};

#[cfg(target_os = "windows")]
fn build_probe() -> Arc<dyn SystemProbe> {
    Arc::new(capwatch::probe::native::NativeProbe::new())
}

#[cfg(not(target_os = "windows"))]
fn build_probe() -> Arc<dyn SystemProbe> {
    // Process scanning only; clipboard and window observation need Win32.
    Arc::new(capwatch::PortableProbe::new())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity(), cli.log_dir.as_deref())
        .context("failed to initialize logging")?;

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Watch(cmd) => handle_watch(config, &cmd).await,
        Command::Scan(cmd) => handle_scan(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn handle_watch(mut config: Config, cmd: &WatchCommand) -> anyhow::Result<()> {
    if cmd.log_safe {
        config.engine.log_safe_processes = true;
    }

    let engine = DetectionEngine::new(&config, build_probe());
    engine.register_callback(|event| {
        println!(
            "[{}] {:9} {} (pid {}) via {} - {}",
            event.timestamp.format("%H:%M:%S"),
            event.risk.to_string(),
            event.process_name,
            event.pid,
            event.method,
            event.window_title,
        );
    });

    engine.start().context("detection engine failed to start")?;
    println!("Watching for screen-capture activity. Press Ctrl-C to stop.");

    match cmd.duration_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
        }
    }
    engine.stop().await;

    let stats = engine.get_statistics();
    println!();
    println!("Detections:      {}", stats.total);
    println!("  critical/high: {}", stats.critical_or_high);
    println!("  medium:        {}", stats.medium);
    println!("  low:           {}", stats.low);
    println!("  safe (logged): {}", stats.safe_logged);

    if let Some(path) = &cmd.export {
        let format = cmd.format.map_or(config.export.format, Into::into);
        let events = engine.get_recent(config.engine.event_log_capacity);
        let rendered = capwatch::export::render(&events, format, config.export.include_headers)?;
        std::fs::write(path, rendered)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Exported {} events to {}", events.len(), path.display());
    }

    Ok(())
}

fn handle_scan(config: &Config, cmd: &ScanCommand) -> anyhow::Result<()> {
    let probe = build_probe();
    probe
        .ensure_available()
        .context("platform probe unavailable")?;

    let classifier = Classifier::new(&config.policy);
    let mut verdicts: Vec<(capwatch::ObservedProcess, RiskLevel)> = probe
        .process_snapshot()
        .context("process enumeration failed")?
        .into_iter()
        .filter_map(|observed| {
            let risk = classifier.classify(&observed);
            (risk != RiskLevel::NotRelevant).then_some((observed, risk))
        })
        .collect();
    verdicts.sort_by(|a, b| b.1.cmp(&a.1));

    if cmd.json {
        let rows: Vec<serde_json::Value> = verdicts
            .iter()
            .map(|(observed, risk)| {
                serde_json::json!({
                    "pid": observed.pid,
                    "name": observed.name,
                    "exe_path": observed.exe_path,
                    "risk": risk.to_string(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{} capture-relevant processes:", verdicts.len());
        for (observed, risk) in &verdicts {
            println!("{:9} {:7} {}", risk.to_string(), observed.pid, observed.name);
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Engine]");
                println!("  Tick interval (ms): {}", config.engine.tick_interval_ms);
                println!("  Error backoff (ms): {}", config.engine.error_backoff_ms);
                println!("  Stop timeout (ms):  {}", config.engine.stop_timeout_ms);
                println!("  Event capacity:     {}", config.engine.event_log_capacity);
                println!("  Log safe processes: {}", config.engine.log_safe_processes);
                println!();
                println!("[Policy]");
                println!("  Whitelist entries:  {}", config.policy.whitelist.len());
                println!("  Blacklist patterns: {}", config.policy.blacklist.len());
                println!(
                    "  Capture indicators: {}",
                    config.policy.capture_indicators.len()
                );
                println!("  Window keywords:    {}", config.policy.window_keywords.len());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
