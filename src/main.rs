// ABOUTME: Main entry point: load config, start logging, run one catalog scenario to completion
// ABOUTME: Any unrecovered failure goes through convoy_core::terminate (exit status 1)

use anyhow::{Context, Result};
use clap::Parser;
use convoy::{logging, scenarios};
use convoy_core::config::{Config, LoggingConfig, ServiceKind};
use convoy_core::{terminate, RunnerConfig, SessionConnector};
use convoy_sim::LoopbackService;
use std::path::PathBuf;
use std::sync::Arc;

/// Run a scripted multi-actor scenario against a messaging service
#[derive(Parser, Debug)]
#[command(name = "convoy")]
#[command(about = "Run a scripted multi-actor scenario against a messaging service")]
struct Args {
    /// Config file (default: CONVOY_CONFIG_PATH, ./convoy.toml, then ~/.config/convoy/convoy.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scenario to run, overriding scenario.name
    #[arg(short, long)]
    scenario: Option<String>,
}

#[tokio::main]
async fn main() {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\nPANIC! convoy crashed with the following error:\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not configured yet; fall back to defaults so the failure is visible
            let _ = logging::init(&LoggingConfig::default());
            terminate(&e);
        }
    };
    if let Err(e) = logging::init(&config.logging) {
        eprintln!("{:#}", e);
    }

    if let Err(e) = run(config).await {
        terminate(&e);
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load_from(args.config.as_deref())?;
    if let Some(name) = &args.scenario {
        config.scenario.name = name.clone();
        config.validate()?;
    }
    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(
        service = ?config.service.kind,
        domain = %config.service.domain,
        scenario = %config.scenario.name,
        actors = config.actors.len(),
        min_logon_interval_ms = config.reconnect.min_logon_interval_ms,
        "Configuration loaded"
    );

    let connector: Arc<dyn SessionConnector> = match config.service.kind {
        ServiceKind::Loopback => {
            let service = LoopbackService::new();
            service.seed(&config.actors, &config.service.domain);
            Arc::new(service.connector())
        }
    };

    let scenario = scenarios::build(&config.scenario.name, &config.scenario, &config.actors)?;
    let state = scenario
        .run(connector, RunnerConfig::from_config(&config), &config.actors)
        .await
        .with_context(|| format!("scenario '{}' failed", scenario.name))?;

    tracing::info!(scenario = scenario.name, keys = ?state.keys().collect::<Vec<_>>(), "Scenario finished");
    println!(
        "{}",
        serde_json::to_string_pretty(&state.to_json()).context("Failed to encode final state")?
    );
    Ok(())
}
