use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgba, RgbaImage, imageops};
use tracing::{debug, warn};

use crate::config::DecodeErrorPolicy;
use crate::error::MediaError;
use crate::meta::display_dimensions;
use crate::processing::decode::load_scaled;
use crate::processing::layout::{pack_rows, row_offsets, scale_to_height};
use crate::processing::timestamp::TimestampOverlay;

/// Geometry shared by every canvas of a slideshow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpec {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Minimum gap between neighbouring photos while packing.
    pub border_size: u32,
    /// Border kept above and below every photo.
    pub border_height: u32,
    /// Distance from the top edge at which photos are painted.
    pub top_offset: u32,
    pub background: [u8; 3],
}

impl TileSpec {
    /// Height every photo is scaled to.
    pub fn photo_height(&self) -> u32 {
        self.canvas_height
            .saturating_sub(self.border_height.saturating_mul(2))
            .max(1)
    }
}

/// A fixed-size composite of one row of photos.
///
/// The bitmap is shared: the batch cache owns it, queue entries and the
/// presenter only hold handles to it.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: Arc<RgbaImage>,
    sources: Arc<[PathBuf]>,
}

impl Canvas {
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Photos painted on this canvas, left to right.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Whether two handles point at the same bitmap.
    pub fn same_bitmap(&self, other: &Canvas) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

struct ScaledPhoto {
    path: PathBuf,
    image: RgbaImage,
}

/// Turns an ordered list of photos into row canvases.
#[derive(Debug)]
pub struct Tiler {
    spec: TileSpec,
    on_decode_error: DecodeErrorPolicy,
    overlay: Option<TimestampOverlay>,
}

impl Tiler {
    pub fn new(spec: TileSpec, on_decode_error: DecodeErrorPolicy) -> Self {
        Self {
            spec,
            on_decode_error,
            overlay: None,
        }
    }

    pub fn with_overlay(mut self, overlay: TimestampOverlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Decodes, scales and packs `paths` into canvases, preserving order.
    ///
    /// # Errors
    /// Returns [`MediaError::ImageDecode`] for the first unreadable photo when
    /// the policy is [`DecodeErrorPolicy::AbortBatch`]; with
    /// [`DecodeErrorPolicy::Skip`] unreadable photos are logged and left out.
    pub fn tile(&self, paths: &[PathBuf]) -> Result<Vec<Canvas>, MediaError> {
        let mut photos = Vec::with_capacity(paths.len());
        for path in paths {
            match self.prepare(path) {
                Ok(photo) => photos.push(photo),
                Err(err) => match self.on_decode_error {
                    DecodeErrorPolicy::Skip => {
                        warn!(path = %path.display(), error = %err, "skipping unreadable photo");
                    }
                    DecodeErrorPolicy::AbortBatch => return Err(err),
                },
            }
        }

        let widths: Vec<u32> = photos.iter().map(|p| p.image.width()).collect();
        let rows = pack_rows(&widths, self.spec.canvas_width, self.spec.border_size);
        let canvases: Vec<Canvas> = rows
            .iter()
            .map(|row| self.compose(&photos[row.members.clone()]))
            .collect();
        debug!(
            photos = photos.len(),
            canvases = canvases.len(),
            "tiled photo batch"
        );
        Ok(canvases)
    }

    fn prepare(&self, path: &Path) -> Result<ScaledPhoto, MediaError> {
        let target_h = self.spec.photo_height();
        // Width comes from the header so reduced JPEG decoding cannot skew it.
        let dims = display_dimensions(path).map_err(|e| MediaError::decode(path, e))?;
        let target_w = scale_to_height(dims.width, dims.height, target_h);
        let mut image = load_scaled(path, target_w, target_h, dims.orientation)
            .map_err(|e| MediaError::decode(path, e))?;
        if let Some(overlay) = &self.overlay {
            overlay.apply(&mut image, path);
        }
        Ok(ScaledPhoto {
            path: path.to_path_buf(),
            image,
        })
    }

    fn compose(&self, row: &[ScaledPhoto]) -> Canvas {
        let [r, g, b] = self.spec.background;
        let mut canvas = RgbaImage::from_pixel(
            self.spec.canvas_width,
            self.spec.canvas_height,
            Rgba([r, g, b, 255]),
        );
        let widths: Vec<u32> = row.iter().map(|p| p.image.width()).collect();
        let offsets = row_offsets(self.spec.canvas_width, &widths);
        for (photo, x) in row.iter().zip(offsets) {
            imageops::overlay(
                &mut canvas,
                &photo.image,
                i64::from(x),
                i64::from(self.spec.top_offset),
            );
        }
        Canvas {
            image: Arc::new(canvas),
            sources: row.iter().map(|p| p.path.clone()).collect(),
        }
    }
}
