use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::info;

use vpnmon::capture::{FileSource, LiveSource, PacketSource, Sniffer};
use vpnmon::config::Config;
use vpnmon::core::PacketMeta;
use vpnmon::detect::{DetectWorker, DetectorStats};
use vpnmon::export;
use vpnmon::model::{GuardedModel, LinearModel};

#[derive(Parser)]
#[command(name = "vpnmon")]
#[command(author, version, about = "Real-time VPN tunnel detection from flow statistics")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch a live interface
    Run {
        /// Interface to listen on
        #[arg(short, long)]
        interface: String,

        /// Model description file (JSON); overrides the config
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Packets a flow accumulates before the first evaluation
        #[arg(long)]
        start_threshold: Option<u64>,

        /// Packets after which a flow is force-expired
        #[arg(long)]
        end_threshold: Option<u64>,

        /// Flow cache capacity
        #[arg(long)]
        capacity: Option<usize>,
    },

    /// Replay a recorded capture through the detector
    Replay {
        /// Capture file to replay
        #[arg(short, long)]
        file: PathBuf,

        /// Model description file (JSON); overrides the config
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Dump per-flow feature rows from a capture to CSV
    Export {
        /// Capture file to read
        #[arg(short, long)]
        file: PathBuf,

        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Generate default configuration file
    GenConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn run_command(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Run {
            interface,
            model,
            start_threshold,
            end_threshold,
            capacity,
        } => {
            config.capture.interface = Some(interface);
            if let Some(v) = start_threshold {
                config.detector.start_threshold = v;
            }
            if let Some(v) = end_threshold {
                config.detector.end_threshold = v;
            }
            if let Some(v) = capacity {
                config.detector.cache_capacity = v;
            }

            let model_path = resolve_model_path(model, &config)?;
            let source = LiveSource::open(&config.capture)?;
            run_pipeline(config, Box::new(source), &model_path)
        }

        Commands::Replay { file, model } => {
            let model_path = resolve_model_path(model, &config)?;
            let source = FileSource::open(&file)?;
            run_pipeline(config, Box::new(source), &model_path)
        }

        Commands::Export { file, output } => {
            let mut source = FileSource::open(&file)?;
            let cache = export::collect_flows(&mut source, config.detector.cache_capacity)?;
            let rows = export::write_features_csv(&cache, &output)?;
            println!("wrote {} flow rows to {}", rows, output.display());
            Ok(())
        }

        Commands::GenConfig { output } => {
            let toml = config.to_toml()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, toml)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    println!("wrote {}", path.display());
                }
                None => print!("{toml}"),
            }
            Ok(())
        }
    }
}

fn resolve_model_path(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    flag.or_else(|| config.model.config_path.clone())
        .ok_or_else(|| anyhow!("no model given: pass --model or set model.config_path"))
}

/// Wire the two threads together and run until shutdown or source end
fn run_pipeline(config: Config, source: Box<dyn PacketSource>, model_path: &PathBuf) -> Result<()> {
    // A broken model description is fatal at startup, not at first packet.
    let model = LinearModel::from_config(model_path).context("model initialization failed")?;
    let guarded = GuardedModel::new(Box::new(model), config.model.guard.clone());

    let (tx, rx): (Sender<PacketMeta>, Receiver<PacketMeta>) =
        if config.capture.channel_bound > 0 {
            bounded(config.capture.channel_bound)
        } else {
            unbounded()
        };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("shutdown requested");
            flag.store(true, Ordering::Relaxed);
        })
        .context("cannot install signal handler")?;
    }

    let shared = Arc::new(RwLock::new(DetectorStats::default()));
    let worker = DetectWorker::new(
        config.detector.clone(),
        guarded,
        rx,
        Arc::clone(&shutdown),
        Arc::clone(&shared),
    );
    let sniffer = Sniffer::new(source, tx, Arc::clone(&shutdown));

    let worker_handle = thread::Builder::new()
        .name("detect-worker".into())
        .spawn(move || worker.run())
        .context("cannot spawn detect worker")?;
    let sniffer_handle = thread::Builder::new()
        .name("sniffer".into())
        .spawn(move || sniffer.run())
        .context("cannot spawn sniffer")?;

    // The sniffer drops the channel sender when it stops, which lets the
    // worker drain remaining packets and exit on its own.
    let sniffer_stats = sniffer_handle
        .join()
        .map_err(|_| anyhow!("sniffer thread panicked"))?;
    let stats = worker_handle
        .join()
        .map_err(|_| anyhow!("detect worker thread panicked"))?;

    info!(
        packets = stats.packets,
        flows = stats.flows_created,
        detections = stats.detections,
        dropped = sniffer_stats.dropped,
        "pipeline finished"
    );
    Ok(())
}
