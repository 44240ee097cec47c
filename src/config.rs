use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::processing::tiler::TileSpec;

const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];
const DEFAULT_VIDEO_EXTENSIONS: &[&str] =
    &["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v"];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Directory scanned (non-recursively) for photos.
    pub media_directory: PathBuf,
    /// Subdirectory of `media_directory` holding playable videos.
    pub video_subdirectory: PathBuf,
    /// Size of every composite canvas, normally the screen size.
    pub canvas: CanvasSize,
    /// How long each photo canvas stays on screen.
    #[serde(with = "humantime_serde")]
    pub photo_delay: Duration,
    /// Delay before skipping an entry that cannot be shown.
    #[serde(with = "humantime_serde")]
    pub skip_delay: Duration,
    /// Navigation inputs closer together than this are coalesced.
    #[serde(with = "humantime_serde")]
    pub key_debounce: Duration,
    /// Interval between library rescans.
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    /// Quiet period after a filesystem change before the library is rescanned.
    #[serde(with = "humantime_serde")]
    pub watch_debounce: Duration,
    /// Number of photos tiled together per batch.
    pub batch_size: usize,
    /// Minimum horizontal gap between photos while packing a row.
    pub border_size: u32,
    /// Border kept above and below every photo.
    pub border_height: u32,
    /// Added to `border_height` to get the painting offset from the top.
    pub top_offset_extra: u32,
    /// Canvas fill color.
    pub background_color: [u8; 3],
    /// Batches worth of canvases (three per batch) kept in memory.
    pub max_cached_batches: usize,
    /// What to do when a photo in a batch cannot be decoded.
    pub decode_errors: DecodeErrorPolicy,
    /// How photo canvases and videos are interleaved.
    pub queue_policy: QueuePolicyKind,
    /// Photo extensions (case-insensitive, without dot).
    pub image_extensions: Vec<String>,
    /// Video extensions (case-insensitive, without dot).
    pub video_extensions: Vec<String>,
    pub timestamp_overlay: TimestampOverlayConfig,
    pub video: VideoConfig,
    pub presenter: PresenterConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecodeErrorPolicy {
    /// Log the broken photo and tile the rest of the batch.
    #[default]
    Skip,
    /// Fail the whole batch.
    AbortBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueuePolicyKind {
    /// Every canvas of the batch, then one rotating video.
    #[default]
    PhotosThenVideo,
    /// Canvas and video strictly one after another.
    Alternate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TimestampOverlayConfig {
    pub enabled: bool,
    /// Font pixel size as a fraction of the canvas height.
    pub font_scale: f32,
    /// Alpha of the backing box, 0.0 to 1.0.
    pub box_opacity: f32,
}

impl Default for TimestampOverlayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            font_scale: 0.025,
            box_opacity: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct VideoConfig {
    pub enabled: bool,
    /// External player executable.
    pub command: String,
    /// Arguments placed before the video path. `{width}` and `{height}` are
    /// replaced with the scaled canvas size.
    pub args: Vec<String>,
    /// Fraction of the canvas the video is allowed to cover.
    pub scale_factor: f32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "cvlc".to_string(),
            args: vec![
                "--play-and-exit".to_string(),
                "--no-osd".to_string(),
                "--width={width}".to_string(),
                "--height={height}".to_string(),
            ],
            scale_factor: 0.9,
        }
    }
}

impl VideoConfig {
    pub fn output_size(&self, canvas: CanvasSize) -> (u32, u32) {
        let scale = self.scale_factor.clamp(0.0, 1.0);
        let w = (canvas.width as f32 * scale).round().max(1.0);
        let h = (canvas.height as f32 * scale).round().max(1.0);
        (w as u32, h as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresenterKind {
    /// Write the current frame as a PNG picked up by the kiosk compositor.
    #[default]
    Snapshot,
    /// Only log what would be shown.
    Log,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PresenterConfig {
    pub kind: PresenterKind,
    pub path: PathBuf,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            kind: PresenterKind::default(),
            path: PathBuf::from("/tmp/media-frame/current.png"),
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(mut self) -> Result<Self> {
        ensure!(
            !self.media_directory.as_os_str().is_empty(),
            "media-directory must be set"
        );
        ensure!(
            self.canvas.width > 0 && self.canvas.height > 0,
            "canvas dimensions must be positive"
        );
        ensure!(
            self.canvas.height > self.border_height.saturating_mul(2),
            "canvas.height must exceed twice border-height"
        );
        ensure!(self.batch_size > 0, "batch-size must be greater than zero");
        ensure!(
            self.max_cached_batches > 0,
            "max-cached-batches must be greater than zero"
        );
        ensure!(
            self.photo_delay > Duration::ZERO,
            "photo-delay must be positive"
        );
        ensure!(
            self.refresh_interval > Duration::ZERO,
            "refresh-interval must be positive"
        );
        ensure!(
            self.video.scale_factor > 0.0 && self.video.scale_factor <= 1.0,
            "video.scale-factor must be within (0, 1]"
        );
        ensure!(
            !self.video.enabled || !self.video.command.trim().is_empty(),
            "video.command must not be empty when video is enabled"
        );
        ensure!(
            (0.0..=1.0).contains(&self.timestamp_overlay.box_opacity),
            "timestamp-overlay.box-opacity must be within [0, 1]"
        );
        ensure!(
            self.timestamp_overlay.font_scale > 0.0 && self.timestamp_overlay.font_scale < 1.0,
            "timestamp-overlay.font-scale must be within (0, 1)"
        );
        self.image_extensions = normalize_extensions(&self.image_extensions)
            .context("invalid image-extensions")?;
        self.video_extensions = normalize_extensions(&self.video_extensions)
            .context("invalid video-extensions")?;
        Ok(self)
    }

    /// Directory scanned for videos.
    pub fn video_directory(&self) -> PathBuf {
        self.media_directory.join(&self.video_subdirectory)
    }

    /// Vertical painting offset of photos on a canvas.
    pub fn top_offset(&self) -> u32 {
        self.border_height + self.top_offset_extra
    }

    /// Canvases retained by the batch cache before eviction starts.
    pub fn max_cached_canvases(&self) -> usize {
        self.max_cached_batches * 3
    }

    pub fn tile_spec(&self) -> TileSpec {
        TileSpec {
            canvas_width: self.canvas.width,
            canvas_height: self.canvas.height,
            border_size: self.border_size,
            border_height: self.border_height,
            top_offset: self.top_offset(),
            background: self.background_color,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            media_directory: PathBuf::new(),
            video_subdirectory: PathBuf::from("converted"),
            canvas: CanvasSize::default(),
            photo_delay: Duration::from_secs(5),
            skip_delay: Duration::from_millis(100),
            key_debounce: Duration::from_millis(500),
            refresh_interval: Duration::from_secs(5 * 60),
            watch_debounce: Duration::from_secs(1),
            batch_size: 10,
            border_size: 30,
            border_height: 50,
            top_offset_extra: 10,
            background_color: [255, 255, 255],
            max_cached_batches: 3,
            decode_errors: DecodeErrorPolicy::default(),
            queue_policy: QueuePolicyKind::default(),
            image_extensions: owned(DEFAULT_IMAGE_EXTENSIONS),
            video_extensions: owned(DEFAULT_VIDEO_EXTENSIONS),
            timestamp_overlay: TimestampOverlayConfig::default(),
            video: VideoConfig::default(),
            presenter: PresenterConfig::default(),
        }
    }
}

fn owned(exts: &[&str]) -> Vec<String> {
    exts.iter().map(|e| (*e).to_string()).collect()
}

fn normalize_extensions(exts: &[String]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(exts.len());
    for ext in exts {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        ensure!(!ext.is_empty(), "extensions must not be empty");
        if !out.contains(&ext) {
            out.push(ext);
        }
    }
    Ok(out)
}
