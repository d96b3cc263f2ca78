// Relays JSON events read from stdin to a monitoring server using metricbridge

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use metricbridge::config::{BridgeConfig, ConfigSource, LogLevel};
use metricbridge::emitter::{Emitter, StreamEmitter};
use metricbridge::event::Event;
use metricbridge::util::logging;
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Command line arguments for the relay example
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Forward JSON events from stdin to a monitoring server")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host, overrides the configuration file
    #[arg(long)]
    host: Option<String>,

    /// Server port, overrides the configuration file
    #[arg(short, long)]
    port: Option<u16>,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long)]
    log_level: Option<LogLevel>,
}

fn load_config(args: &Args) -> Result<BridgeConfig> {
    let mut sources = Vec::new();
    if let Some(path) = &args.config {
        sources.push(ConfigSource::File(path.clone()));
    }
    sources.push(ConfigSource::Environment("METRICBRIDGE".to_string()));
    if let Some(host) = &args.host {
        sources.push(ConfigSource::Toml(format!(
            "[emitter]\nhost = {}",
            serde_json::to_string(host)?
        )));
    }
    if let Some(port) = args.port {
        sources.push(ConfigSource::Toml(format!("[emitter]\nport = {}", port)));
    }

    BridgeConfig::load_from_sources(sources).context("Failed to load configuration")
}

/// Decode one input line, filling in the local host name when missing
fn parse_line(line: &str, local_host: &str) -> Result<Event> {
    let mut value: Value = serde_json::from_str(line).context("Invalid JSON")?;
    if let Value::Object(fields) = &mut value {
        fields
            .entry("host")
            .or_insert_with(|| Value::from(local_host));
    }
    Ok(Event::from_json(value)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    logging::init(args.log_level.as_ref().unwrap_or(&config.log_level));

    let local_host = hostname::get()
        .context("Failed to read the local hostname")?
        .to_string_lossy()
        .into_owned();

    let emitter = StreamEmitter::tcp(config.emitter)?;
    emitter.start().await?;
    info!(
        "Relaying events from stdin to {}:{}",
        emitter.config().host,
        emitter.config().port
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sent = 0usize;
    let mut failed = 0usize;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let result = match parse_line(&line, &local_host) {
            Ok(event) => emitter.emit(&event).await.map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                sent += 1;
                debug!("Relayed event {}", sent);
            }
            Err(e) => {
                failed += 1;
                warn!("Skipping event: {:#}", e);
            }
        }
    }

    emitter.close().await?;
    info!("Relay finished: {} sent, {} failed", sent, failed);
    Ok(())
}
