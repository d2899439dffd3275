//! Command-line host for the Pressing offline agent.
//!
//! Installs and activates one agent version, then replays events from a
//! JSON-lines file (or stdin) and prints one JSON line per outcome.
//!
//! ## Usage
//!
//! ```bash
//! # Live network, events from a file
//! sw-harness --config agent.toml --events events.jsonl
//!
//! # Canned network, events from stdin
//! echo '{"kind":"message","type":"GET_VERSION"}' | sw-harness --fixtures fixtures.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use pressing_common::{init_logging, LogConfig, LogFormat};
use pressing_net::{Fetcher, FixtureFetcher, HttpFetcher, LoaderConfig};
use pressing_sw::{Agent, AgentConfig, AgentHost, AgentSignal, Registration};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

mod events;
mod report;

use events::HarnessEvent;

#[derive(Parser)]
#[command(name = "sw-harness")]
#[command(about = "Drive the Pressing offline agent from the command line")]
struct Cli {
    /// Agent configuration (TOML); defaults when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON-lines event file; stdin when absent
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// Answer network requests from a fixture file instead of HTTP
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Log format: pretty, compact or json
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,

    /// Tracing filter directives, e.g. "pressing_sw=debug"
    #[arg(long)]
    log_filter: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut log = if cli.verbose {
        LogConfig::debug()
    } else {
        LogConfig::default()
    };
    if let Some(filter) = &cli.log_filter {
        log = log.with_filter(filter.clone());
    }
    init_logging(log.with_format(cli.log_format));

    let config = match &cli.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };

    let fetcher: Arc<dyn Fetcher> = match &cli.fixtures {
        Some(path) => Arc::new(FixtureFetcher::load(path)?),
        None => Arc::new(HttpFetcher::new(LoaderConfig::default())?),
    };

    let caches = AgentHost::open_storage(&config).await?;
    let (agent, mut signals) = Agent::new(config.clone(), AgentHost::new(fetcher, caches))?;

    let mut registration = Registration::new(config.origin.clone());
    if let Err(e) = registration.update(Arc::new(agent)).await {
        println!("{}", json!({"event": "update", "status": "failed", "reason": e.to_string()}));
        std::process::exit(1);
    }
    println!(
        "{}",
        json!({"event": "update", "status": "completed", "version": config.version_tag})
    );

    let input = open_events(cli.events.as_deref()).await?;
    let (handled, failed) = replay(input, &config, &mut registration, &mut signals).await?;

    info!(handled, failed, "Replay finished");
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn open_events(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncBufRead + Unpin + Send>, std::io::Error> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    })
}

/// Dispatch every line to the controlling version. Returns how many events
/// were handled and how many failed.
async fn replay(
    input: Box<dyn AsyncBufRead + Unpin + Send>,
    config: &AgentConfig,
    registration: &mut Registration,
    signals: &mut tokio::sync::mpsc::UnboundedReceiver<AgentSignal>,
) -> Result<(usize, usize), std::io::Error> {
    let mut lines = input.lines();
    let (mut handled, mut failed) = (0, 0);
    let mut number = 0;

    while let Some(line) = lines.next_line().await? {
        number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event = match HarnessEvent::parse(line).and_then(|e| e.into_agent_event(config)) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = number, error = %e, "Skipping event");
                println!("{}", json!({"line": number, "status": "skipped", "reason": e.to_string()}));
                failed += 1;
                continue;
            }
        };

        let Some(agent) = registration.controller().cloned() else {
            warn!(line = number, "No active version");
            failed += 1;
            continue;
        };

        let name = event.name();
        let outcome = agent.dispatch(event).await;
        if !outcome.is_completed() {
            failed += 1;
        }
        handled += 1;
        println!("{}", report::outcome_line(name, &outcome));

        while let Ok(signal) = signals.try_recv() {
            info!(?signal, "Agent signal");
        }
        match registration.promote_if_requested().await {
            Ok(true) => info!("Waiting version promoted"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Promotion failed"),
        }
    }

    Ok((handled, failed))
}
