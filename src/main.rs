//! Jitter Health CLI
//!
//! Drives a simulated timing-jitter source through the continuous health
//! tests and reports what they detect.

use clap::{Parser, ValueEnum};
use jitter_health::{
    health::{FileConfig, InitType},
    metrics::{MetricsRegistry, MetricsSnapshot},
    registry,
    source::{JitterProfile, MonitoredSource, SimulatedTimer, SourceError},
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "jitter-health", version, about = "Continuous health tests for a simulated jitter source")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Oversampling rate (overrides the config file).
    #[arg(long)]
    osr: Option<u32>,
    /// Delta profile of the simulated timer (overrides the config file).
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,
    /// Health test initialization policy.
    #[arg(long, value_enum, default_value_t = InitArg::Ntg1Startup)]
    init: InitArg,
    /// Number of samples to collect.
    #[arg(short = 'n', long, default_value_t = 10_000)]
    samples: u64,
    /// Collect until interrupted.
    #[arg(long)]
    continuous: bool,
    /// Print Prometheus metrics when done.
    #[arg(long)]
    metrics: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProfileArg {
    Jitter,
    Constant,
    Frozen,
    Linear,
}

impl From<ProfileArg> for JitterProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Jitter => JitterProfile::default(),
            ProfileArg::Constant => JitterProfile::Constant { step: 1_200 },
            ProfileArg::Frozen => JitterProfile::Frozen,
            ProfileArg::Linear => JitterProfile::Linear { start: 1_000, slope: 3 },
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InitArg {
    Common,
    Ntg1Startup,
    Ntg1Runtime,
}

impl From<InitArg> for InitType {
    fn from(arg: InitArg) -> Self {
        match arg {
            InitArg::Common => InitType::Common,
            InitArg::Ntg1Startup => InitType::Ntg1Startup,
            InitArg::Ntg1Runtime => InitType::Ntg1Runtime,
        }
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Jitter Health v{}", jitter_health::VERSION);

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    if let Some(osr) = args.osr {
        config.health.osr = osr;
    }
    if let Some(profile) = args.profile {
        config.simulation.profile = profile.into();
    }

    let registry = registry::init();
    if let Err(e) = registry.set_failure_callback(|event| {
        warn!(
            source = %event.source,
            flags = %event.new_flags,
            status = ?event.status,
            sample = event.sample,
            "Health failure reported"
        );
    }) {
        warn!("Failure callback not installed: {}", e);
    }

    let timer = SimulatedTimer::new(&config.simulation);
    let mut source = match MonitoredSource::new(
        "simulated",
        timer,
        config.health.clone(),
        registry.clone(),
        args.init.into(),
    ) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Invalid health configuration: {}", e);
            std::process::exit(1);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    if args.continuous {
        let flag = running.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)) {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    info!(profile = ?config.simulation.profile, osr = config.health.osr, "Collecting samples...");

    let mut produced: u64 = 0;
    let mut stuck: u64 = 0;
    let mut refusal: Option<SourceError> = None;

    while running.load(Ordering::SeqCst) && (args.continuous || produced < args.samples) {
        match source.next_sample() {
            Ok(sample) => {
                produced += 1;
                if sample.stuck {
                    stuck += 1;
                }
            }
            Err(e) => {
                refusal = Some(e);
                break;
            }
        }
    }

    let health = source.health();
    info!(
        "Collected {} samples: {} stuck, status {:?}, flags {}",
        produced,
        stuck,
        health.status(),
        health.health_failure()
    );
    if let Some(e) = refusal {
        warn!("Source stopped producing output: {}", e);
    }

    if args.metrics {
        match MetricsRegistry::new() {
            Ok(metrics) => {
                metrics.update(&MetricsSnapshot::from_health(health));
                match metrics.encode() {
                    Ok(text) => print!("{}", text),
                    Err(e) => warn!("Failed to encode metrics: {}", e),
                }
            }
            Err(e) => warn!("Failed to create metrics registry: {}", e),
        }
    }

    let failed = health.is_fatal();
    registry::teardown();
    if failed {
        std::process::exit(2);
    }
}
