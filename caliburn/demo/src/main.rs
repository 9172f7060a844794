//! Caliburn Demo - Headless Sample Host
//!
//! Runs the framework's sample scenarios without a UI toolkit. A dedicated
//! thread plays the UI thread; view models run on it through the
//! [`UiContext`].
//!
//! # Usage
//!
//! ```bash
//! # Tabbed shell with five tabs
//! caliburn-demo mdi --tabs 5
//!
//! # Fault routing (sync, UI-posted, background and async failures)
//! caliburn-demo faults
//!
//! # With config file
//! caliburn-demo --config ./caliburn.toml mdi
//!
//! # Verbose logging
//! RUST_LOG=debug caliburn-demo mdi
//! ```

mod faults;
mod mdi;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use caliburn_core::{
    load_config, load_config_from_path, ConfigOverrides, EventAggregator, Fault, FaultSink,
    FrameworkConfig, NullViewAdapter, ThreadPool, UiContext, UiThread,
};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info};

/// Caliburn Demo - headless host for the sample view models
#[derive(Parser, Debug)]
#[command(name = "caliburn-demo")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CALIBURN_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pretend to run inside a design tool
    #[arg(long)]
    design_time: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CALIBURN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Scenario to run
    #[command(subcommand)]
    scenario: Scenario,
}

#[derive(Subcommand, Debug)]
enum Scenario {
    /// Tabbed shell: open, switch and close tabs, then close the shell
    Mdi {
        /// Number of tabs to open
        #[arg(short = 't', long, default_value_t = 3)]
        tabs: usize,
    },
    /// Fault routing for every way work can fail
    Faults,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("caliburn_demo={level},caliburn_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .init();
}

/// Load the configuration file and apply CLI overrides
fn resolve_config(args: &Args) -> Result<FrameworkConfig> {
    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if args.design_time {
        overrides = overrides.with_design_time(true);
    }
    overrides.apply(&mut config)?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Caliburn demo starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;
    info!(
        source = %config.source(),
        ui_thread = %config.ui_thread_name,
        design_time = config.design_time,
        workers = config.background_workers,
        "Configuration loaded"
    );

    let (fault_tx, fault_rx) = mpsc::unbounded_channel();
    let sink: Arc<dyn FaultSink> = Arc::new(move |fault: Fault| {
        error!(fault = %fault, "Unobserved fault");
        // Scenarios that do not count faults dropped the receiver
        let _ = fault_tx.send(fault);
    });

    let context = UiContext::with_fault_sink(sink);
    let ui = UiThread::start(
        &context,
        &config.ui_thread_name,
        config.design_time,
        Arc::new(NullViewAdapter),
    )
    .context("Failed to start UI thread")?;
    let pool = Arc::new(ThreadPool::new(config.background_workers)?);
    let events = Arc::new(EventAggregator::with_background(
        context.clone(),
        pool.clone(),
    ));

    let outcome = match args.scenario {
        Scenario::Mdi { tabs } => {
            drop(fault_rx);
            context
                .spawn(mdi::run(events, tabs, config.default_thread_option))
                .wait()
        }
        Scenario::Faults => context
            .spawn(faults::run(context.clone(), pool, events, fault_rx))
            .wait(),
    };

    ui.shutdown();

    match outcome {
        Ok(()) => {
            info!("Scenario finished");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Scenario failed");
            Err(e).context("Scenario failed")
        }
    }
}
