//! api-worker main entry point
//!
//! This binary drives a worker with synthetic requests, which is handy for
//! watching the queue and shutdown behaviour with real logging. It handles
//! CLI parsing, logging setup and configuration loading.

use api_worker::{
    ApiWorker, CallRequest, ControlCommand, Priority, RequestError, WorkerConfig, WorkerError,
    APP_NAME, VERSION,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Background worker for outbound API calls
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version = VERSION, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push synthetic requests through a worker, then stop it
    Run {
        /// Number of requests to send
        #[arg(short, long, default_value_t = 20)]
        requests: usize,

        /// Simulated call latency in milliseconds
        #[arg(long, default_value_t = 10)]
        latency_ms: u64,

        /// Make every Nth request fail (0 disables failures)
        #[arg(long, default_value_t = 0)]
        fail_every: usize,

        /// Stop with STOP_IMMEDIATE instead of draining the queue
        #[arg(long)]
        immediate: bool,
    },

    /// Validate the configuration and print it
    CheckConfig,

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize structured logging with tracing
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<WorkerConfig> {
    match path {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Ok(WorkerConfig::from_file(path)?)
        }
        None => Ok(WorkerConfig::default()),
    }
}

/// Run the CLI command
fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run {
            requests,
            latency_ms,
            fail_every,
            immediate,
        } => {
            let config = load_config(cli.config.as_ref())?;
            info!("Starting {} v{} as '{}'", APP_NAME, VERSION, config.name);
            drive(config, requests, Duration::from_millis(latency_ms), fail_every, immediate)
        }
        Commands::CheckConfig => {
            let config = load_config(cli.config.as_ref())?;
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Version => {
            println!("{} v{}", APP_NAME, VERSION);
            Ok(())
        }
    }
}

fn drive(
    config: WorkerConfig,
    requests: usize,
    latency: Duration,
    fail_every: usize,
    immediate: bool,
) -> anyhow::Result<()> {
    let worker = ApiWorker::from_config(config)?;
    worker.start()?;

    let mut handles = Vec::with_capacity(requests);
    for index in 1..=requests {
        let fails = fail_every > 0 && index % fail_every == 0;
        let (request, handle) = CallRequest::new(format!("request-{}", index), move || {
            thread::sleep(latency);
            if fails {
                return Err(RequestError::Failed(format!("simulated failure of #{}", index)));
            }
            Ok(index)
        });

        // Every fifth call stands in for a bulk log upload.
        let priority = if index % 5 == 0 { Priority::Low } else { Priority::Medium };
        worker.send_request(request.with_priority(priority))?;
        handles.push(handle);
    }

    worker.send(ControlCommand::ReportStatus)?;

    let stopped = if immediate {
        worker.stop_immediate()
    } else {
        worker.stop()
    };
    match stopped {
        Ok(()) => {}
        Err(WorkerError::Timeout(reason)) => warn!("Shutdown incomplete: {}", reason),
        Err(e) => return Err(e.into()),
    }

    let (mut ok, mut failed, mut discarded) = (0usize, 0usize, 0usize);
    for mut handle in handles {
        match handle.try_take() {
            Some(Ok(_)) => ok += 1,
            Some(Err(RequestError::Discarded)) => discarded += 1,
            Some(Err(_)) => failed += 1,
            None => {}
        }
    }
    info!(
        "Requests: {} succeeded, {} failed, {} discarded",
        ok, failed, discarded
    );

    println!("{}", worker.status().to_json()?);
    Ok(())
}
