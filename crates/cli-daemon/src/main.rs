use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::{Context, Result};
use clap::Parser;
use daemon::{
    config::{CpuDirective, EncoderConfig, EncoderSettings},
    JsonLinesObserver, LogObserver, Pipeline, ProcessRunner, RunExit,
};
use log::{error, info, warn};

/// Invalid or unloadable configuration
const EXIT_CONFIG_ERROR: u8 = 2;
/// Input directory held no media files at startup
const EXIT_NO_INPUT: u8 = 3;

/// Watch-directory video encoder
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input directory to watch (overrides the config file)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory (overrides the config file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let cfg = match load_config(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match run(cfg).await {
        Ok(RunExit::NoInput) => {
            warn!("No media files to encode, exiting");
            ExitCode::from(EXIT_NO_INPUT)
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<EncoderConfig> {
    let mut settings = EncoderSettings::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(input) = &args.input {
        settings.input_dir = input.clone();
    }
    if let Some(output) = &args.output {
        settings.output_dir = output.clone();
    }
    let cfg = settings.validate().context("Invalid configuration")?;
    Ok(cfg)
}

async fn run(cfg: EncoderConfig) -> Result<RunExit> {
    info!("Media encoder starting");
    info!("Configuration loaded:");
    info!("  Input dir: {}", cfg.input_dir.display());
    info!("  Output dir: {}", cfg.output_dir.display());
    info!(
        "  Codec: {} ({}), speed {}, crf {}",
        cfg.codec,
        cfg.codec.profile().encoder,
        cfg.speed,
        cfg.quality_arg()
    );
    if let Some(tune) = &cfg.tune {
        info!("  Tune: {}", tune);
    }
    info!("  Geometry: {:?}", cfg.geometry);
    match cfg.cpu {
        CpuDirective::Automatic => info!("  Threads: automatic"),
        CpuDirective::Threads(n) => info!("  Threads: {}", n),
    }
    if !cfg.extra_args.is_empty() {
        info!("  Extra args: {}", cfg.extra_args.join(" "));
    }
    info!(
        "  Settle interval: {}ms, {} probe worker(s), poll every {}s",
        cfg.watch.settle_interval.as_millis(),
        cfg.watch.probe_workers,
        cfg.watch.poll_interval.as_secs()
    );

    let mut pipeline = Pipeline::new(cfg, ProcessRunner).with_observer(Box::new(LogObserver));
    if let Some(path) = pipeline.config().status_file.clone() {
        let observer = JsonLinesObserver::create(&path)?;
        info!("  Status file: {}", path.display());
        pipeline = pipeline.with_observer(Box::new(observer));
    }

    pipeline.run().await
}
