use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use image::ImageFormat;
use tracing::{debug, info, warn};

use crate::config::{PresenterConfig, PresenterKind};
use crate::processing::tiler::Canvas;

/// Receives every canvas the sequencer puts on screen. Implementations must
/// return quickly; slow output belongs on a worker.
pub trait Presenter: Send {
    fn present(&mut self, canvas: &Canvas) -> Result<()>;
}

pub fn from_config(cfg: &PresenterConfig) -> Result<Box<dyn Presenter>> {
    Ok(match cfg.kind {
        PresenterKind::Snapshot => Box::new(SnapshotPresenter::spawn(cfg.path.clone())?),
        PresenterKind::Log => Box::new(LogPresenter),
    })
}

/// Writes the current frame to a PNG, replacing the previous one atomically.
///
/// Encoding runs on a dedicated writer thread; when frames arrive faster than
/// they can be written, only the newest one is encoded.
#[derive(Debug)]
pub struct SnapshotPresenter {
    frames: Option<Sender<Canvas>>,
    writer: Option<JoinHandle<()>>,
}

impl SnapshotPresenter {
    pub fn spawn(path: PathBuf) -> Result<Self> {
        let (tx, rx) = unbounded::<Canvas>();
        let writer = thread::Builder::new()
            .name("snapshot-writer".into())
            .spawn(move || write_frames(&path, rx))
            .context("failed to start snapshot writer")?;
        Ok(Self {
            frames: Some(tx),
            writer: Some(writer),
        })
    }
}

impl Presenter for SnapshotPresenter {
    fn present(&mut self, canvas: &Canvas) -> Result<()> {
        let frames = self
            .frames
            .as_ref()
            .context("snapshot writer already stopped")?;
        frames
            .send(canvas.clone())
            .context("snapshot writer exited")?;
        Ok(())
    }
}

impl Drop for SnapshotPresenter {
    fn drop(&mut self) {
        // Closing the channel lets the writer finish the last frame and exit.
        self.frames.take();
        if let Some(writer) = self.writer.take()
            && writer.join().is_err()
        {
            warn!("snapshot writer panicked");
        }
    }
}

fn write_frames(path: &Path, rx: Receiver<Canvas>) {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    while let Ok(mut canvas) = rx.recv() {
        while let Ok(newer) = rx.try_recv() {
            canvas = newer;
        }
        match write_frame(path, &staging, &canvas) {
            Ok(()) => {
                debug!(path = %path.display(), photos = canvas.sources().len(), "frame written");
            }
            Err(err) => warn!("failed to write frame: {err:#}"),
        }
    }
    debug!("snapshot writer stopped");
}

fn write_frame(path: &Path, staging: &Path, canvas: &Canvas) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    canvas
        .image()
        .save_with_format(staging, ImageFormat::Png)
        .with_context(|| format!("failed to write frame to {}", staging.display()))?;
    fs::rename(staging, path)
        .with_context(|| format!("failed to publish frame at {}", path.display()))?;
    Ok(())
}

/// Headless presenter; only logs which photos would be shown.
#[derive(Debug, Default)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn present(&mut self, canvas: &Canvas) -> Result<()> {
        let names: Vec<String> = canvas
            .sources()
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        info!(photos = ?names, "showing canvas");
        Ok(())
    }
}
