use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use media_frame::config::Configuration;
use media_frame::events::{LibraryEvent, NavCommand, PlayerEvent};
use media_frame::player::{CommandEngine, VideoEngine};
use media_frame::processing::tiler::Tiler;
use media_frame::processing::timestamp::TimestampOverlay;
use media_frame::tasks::batch::BatchLoader;
use media_frame::tasks::sequencer::{Sequencer, SequencerSettings};
use media_frame::tasks::{files, input, queue, sequencer};
use media_frame::{plan, presenter, scan};

#[derive(Debug, Parser)]
#[command(
    name = "media-frame",
    version,
    about = "Kiosk slideshow of tiled photos and video clips"
)]
struct Args {
    /// Directory holding the photos (videos live in its `converted` subdirectory)
    #[arg(value_name = "MEDIA_DIR")]
    media_dir: Option<PathBuf>,
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Canvas width in pixels
    #[arg(long, value_name = "PIXELS")]
    width: Option<u32>,
    /// Canvas height in pixels
    #[arg(long, value_name = "PIXELS")]
    height: Option<u32>,
    /// Milliseconds each photo canvas stays on screen
    #[arg(long, value_name = "MILLIS")]
    delay: Option<u64>,
    /// Print the queues of the first N batches without decoding pixels, then exit
    #[arg(long, value_name = "BATCHES")]
    plan: Option<usize>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("media_frame={level},warn")))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

fn load_configuration(args: &Args) -> Result<Configuration> {
    let mut cfg = match &args.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(dir) = &args.media_dir {
        cfg.media_directory = dir.clone();
    }
    if let Some(width) = args.width {
        cfg.canvas.width = width;
    }
    if let Some(height) = args.height {
        cfg.canvas.height = height;
    }
    if let Some(ms) = args.delay {
        cfg.photo_delay = Duration::from_millis(ms);
    }
    cfg.validated().context("invalid configuration values")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let cfg = load_configuration(&args)?;
    tracing::debug!("configuration:\n{:#?}", cfg);

    let library = scan::scan_library(&cfg).context("failed to scan media library")?;
    tracing::info!(
        photos = library.photos.len(),
        videos = library.videos.len(),
        root = %cfg.media_directory.display(),
        "scanned media library"
    );

    if let Some(batches) = args.plan {
        print!("{}", plan::render(&plan::plan_batches(&cfg, &library, batches)));
        return Ok(());
    }

    let (nav_tx, nav_rx) = mpsc::channel::<NavCommand>(16); // Inputs -> Sequencer
    let (player_tx, player_rx) = mpsc::channel::<PlayerEvent>(8); // Engine -> Sequencer
    let (library_tx, library_rx) = mpsc::channel::<LibraryEvent>(4); // Files -> Sequencer

    let cancel = CancellationToken::new();
    input::spawn_ctrl_c(cancel.clone());
    input::spawn_stdin(nav_tx.clone(), cancel.clone());
    input::spawn_signals(nav_tx.clone(), cancel.clone());

    let mut tiler = Tiler::new(cfg.tile_spec(), cfg.decode_errors);
    if cfg.timestamp_overlay.enabled {
        match TimestampOverlay::load(&cfg.timestamp_overlay, cfg.canvas.height) {
            Ok(overlay) => tiler = tiler.with_overlay(overlay),
            Err(err) => tracing::warn!("timestamp overlay disabled: {err:#}"),
        }
    }
    let loader = BatchLoader::new(
        library.photos.clone(),
        cfg.batch_size,
        cfg.max_cached_canvases(),
        Arc::new(tiler),
    );
    let engine: Option<Box<dyn VideoEngine>> = if cfg.video.enabled {
        Some(Box::new(CommandEngine::new(&cfg.video, cfg.canvas, player_tx)))
    } else {
        tracing::info!("video playback disabled");
        None
    };
    tracing::info!(
        photo_delay = %humantime::format_duration(cfg.photo_delay),
        batch_size = cfg.batch_size,
        policy = ?cfg.queue_policy,
        "starting playback"
    );
    let presenter =
        presenter::from_config(&cfg.presenter).context("failed to start presenter")?;
    let sequencer = Sequencer::new(
        loader,
        library.videos.clone(),
        queue::policy_for(cfg.queue_policy),
        engine,
        presenter,
        SequencerSettings {
            photo_delay: cfg.photo_delay,
            skip_delay: cfg.skip_delay,
            key_debounce: cfg.key_debounce,
        },
    );

    let mut tasks = JoinSet::new();

    // LibraryRefresh
    tasks.spawn({
        let cfg = cfg.clone();
        let cancel = cancel.clone();
        async move {
            files::run(cfg, library, library_tx, cancel)
                .await
                .context("files task failed")
        }
    });

    // Sequencer
    tasks.spawn({
        let cancel = cancel.clone();
        async move {
            let result = sequencer::run(sequencer, nav_rx, player_rx, library_rx, cancel.clone())
                .await
                .context("sequencer task failed");
            cancel.cancel();
            result
        }
    });
    drop(nav_tx);

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!("{err:#}");
                cancel.cancel();
                first_error.get_or_insert(err);
            }
            Err(err) => {
                tracing::error!("task panicked: {err}");
                cancel.cancel();
                first_error.get_or_insert(err.into());
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
