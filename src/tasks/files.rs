use std::path::Path;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use tokio::select;
use tokio::sync::mpsc::{self, Sender};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Configuration;
use crate::events::LibraryEvent;
use crate::scan::{MediaLibrary, scan_library};

/// Watches the media directories and forwards the library whenever it differs
/// from the last one seen. Filesystem events are debounced into one rescan;
/// `refresh-interval` rescans regardless, in case events were missed.
#[instrument(
    skip(cfg, initial, to_sequencer, cancel),
    fields(root = %cfg.media_directory.display())
)]
pub async fn run(
    cfg: Configuration,
    initial: MediaLibrary,
    to_sequencer: Sender<LibraryEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut current = initial;

    // Bridge notify callback -> async channel
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(128);
    let _watcher = match start_watcher(&cfg, watch_tx) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            warn!("filesystem watcher unavailable, polling only: {err:#}");
            None
        }
    };

    let mut ticker = interval(cfg.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the startup scan already ran.
    ticker.tick().await;
    let mut rescan_at: Option<Instant> = None;

    loop {
        let debounce = async move {
            match rescan_at {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting files task");
                break;
            }

            Some(res) = watch_rx.recv() => match res {
                Ok(event) if touches_library(&event.kind) => {
                    debug!(kind = ?event.kind, paths = ?event.paths, "fs change");
                    rescan_at = Some(Instant::now() + cfg.watch_debounce);
                }
                Ok(event) => debug!(kind = ?event.kind, "fs: ignored"),
                Err(err) => warn!("watch error: {err}"),
            },

            _ = debounce => {
                rescan_at = None;
                if !refresh(&cfg, &mut current, &to_sequencer).await? {
                    break;
                }
            }

            _ = ticker.tick() => {
                if !refresh(&cfg, &mut current, &to_sequencer).await? {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn start_watcher(
    cfg: &Configuration,
    watch_tx: Sender<notify::Result<Event>>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })?;
    watcher.watch(&cfg.media_directory, RecursiveMode::Recursive)?;
    let video_dir = cfg.video_directory();
    if !video_dir.starts_with(&cfg.media_directory) && video_dir.is_dir() {
        watcher.watch(&video_dir, RecursiveMode::NonRecursive)?;
    }
    info!(watching = %display_root(&cfg.media_directory), "notify watcher initialized");
    Ok(watcher)
}

fn display_root(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn touches_library(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Rescans and forwards a changed library. Returns `false` once the
/// sequencer has gone away.
async fn refresh(
    cfg: &Configuration,
    current: &mut MediaLibrary,
    to_sequencer: &Sender<LibraryEvent>,
) -> Result<bool> {
    let scan_cfg = cfg.clone();
    let scanned = tokio::task::spawn_blocking(move || scan_library(&scan_cfg))
        .await
        .context("rescan worker panicked")?;
    match scanned {
        Ok(library) if library != *current => {
            info!(
                photos = library.photos.len(),
                videos = library.videos.len(),
                "library changed on disk"
            );
            *current = library.clone();
            if to_sequencer.send(LibraryEvent::Rescanned(library)).await.is_err() {
                debug!("sequencer gone; exiting files task");
                return Ok(false);
            }
        }
        Ok(_) => debug!("library unchanged"),
        Err(err) => warn!(error = %err, "rescan failed"),
    }
    Ok(true)
}
