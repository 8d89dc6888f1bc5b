use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use timeline_stitcher::{
    composition::StitchEngine,
    config::Config,
    media::{FfmpegBackend, MediaBackend},
    timeline::load_timeline,
};

#[derive(Parser)]
#[command(
    name = "timeline-stitcher",
    version,
    about = "Stitch clips into one video from a declarative timeline",
    long_about = "Timeline-Stitcher reads a timeline of source clips with frame markers, playback speeds and optional pan/zoom endpoints, transforms every clip with ffmpeg and joins them into a single output."
)]
struct Cli {
    /// Timeline description file
    #[arg(short, long, default_value = "./timeline.txt")]
    timeline: PathBuf,

    /// Output video file path
    #[arg(short, long, default_value = "./Data/output.mp4")]
    output: PathBuf,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of clips processed at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Resolve and plan the timeline without transcoding anything
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Write the default configuration to this path and exit
    #[arg(long, value_name = "PATH")]
    init_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose when set
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = &cli.init_config {
        Config::default().save_to_file(path)?;
        info!("Default configuration written to {:?}", path);
        return Ok(());
    }

    info!("Starting Timeline-Stitcher v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    if let Some(jobs) = cli.jobs {
        config.pipeline.max_concurrent_clips = jobs;
        config.validate()?;
    }

    let backend = Arc::new(FfmpegBackend::new(config.tools.clone(), config.encoding.clone()));
    if !backend.is_available() {
        bail!(
            "{:?} or {:?} is not available. Install ffmpeg or point [tools] at the executables.",
            config.tools.ffmpeg,
            config.tools.ffprobe
        );
    }

    let engine = StitchEngine::new(config, backend);

    if cli.dry_run {
        info!("Dry run: planning only");
        let timeline = load_timeline(&cli.timeline).map_err(report)?;
        let compiled = engine.compile(&timeline).await.map_err(report)?;
        info!(
            "{} clips planned, {} dropped, ~{:.2}s of output",
            compiled.plans.len(),
            compiled.resolved.dropped.len(),
            compiled.summary.total_duration
        );
        return Ok(());
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    engine
        .compose_with_shutdown(&cli.timeline, &cli.output, shutdown)
        .await
        .map_err(report)?;

    Ok(())
}

fn report(e: timeline_stitcher::StitchError) -> anyhow::Error {
    error!("{}", e.user_message());
    e.into()
}
