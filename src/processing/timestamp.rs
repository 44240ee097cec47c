use std::fmt;
use std::fs;
use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow, ensure};
use chrono::NaiveDateTime;
use fontdb::{Database, Family, Query, Source};
use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::config::TimestampOverlayConfig;
use crate::meta::read_capture_time;

const LABEL_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Draws the capture time of a photo in its bottom-right corner.
#[derive(Clone)]
pub struct TimestampOverlay {
    font: FontArc,
    px: f32,
    box_alpha: f32,
}

impl fmt::Debug for TimestampOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampOverlay")
            .field("px", &self.px)
            .field("box_alpha", &self.box_alpha)
            .finish_non_exhaustive()
    }
}

impl TimestampOverlay {
    /// Loads a system font; the font size follows the canvas height.
    pub fn load(cfg: &TimestampOverlayConfig, canvas_height: u32) -> Result<Self> {
        let font = load_font()?;
        Ok(Self::with_font(font, cfg, canvas_height))
    }

    pub fn with_font(font: FontArc, cfg: &TimestampOverlayConfig, canvas_height: u32) -> Self {
        Self {
            font,
            px: (canvas_height as f32 * cfg.font_scale).max(8.0),
            box_alpha: cfg.box_opacity.clamp(0.0, 1.0),
        }
    }

    /// Stamps `image` in place when `path` carries a capture time. Any
    /// failure leaves the image untouched.
    pub fn apply(&self, image: &mut RgbaImage, path: &Path) {
        let Some(taken) = read_capture_time(path) else {
            debug!(path = %path.display(), "no capture time; skipping timestamp");
            return;
        };
        match self.render(image, &format_label(taken)) {
            Ok(stamped) => *image = stamped,
            Err(err) => warn!(path = %path.display(), "timestamp overlay failed: {err:#}"),
        }
    }

    fn render(&self, image: &RgbaImage, text: &str) -> Result<RgbaImage> {
        let scale = PxScale::from(self.px);
        let scaled = self.font.as_scaled(scale);
        let text_w = text_width(&self.font, scale, text);
        let text_h = scaled.ascent() - scaled.descent();
        let pad = self.px * 0.3;
        let margin = self.px * 0.5;

        let box_w = text_w + 2.0 * pad;
        let box_h = text_h + 2.0 * pad;
        let right = image.width() as f32 - margin;
        let bottom = image.height() as f32 - margin;
        let left = right - box_w;
        let top = bottom - box_h;
        ensure!(
            left >= 0.0 && top >= 0.0,
            "label {box_w:.0}x{box_h:.0} does not fit a {}x{} photo",
            image.width(),
            image.height()
        );

        let mut out = image.clone();
        fill_rect(&mut out, left, top, right, bottom, [0, 0, 0], self.box_alpha);
        let baseline = top + pad + scaled.ascent();
        draw_text(&mut out, &self.font, scale, text, left + pad, baseline, [255, 255, 255]);
        Ok(out)
    }
}

pub fn format_label(taken: NaiveDateTime) -> String {
    taken.format(LABEL_FORMAT).to_string()
}

fn load_font() -> Result<FontArc> {
    let mut db = Database::new();
    db.load_system_fonts();

    let preferred_families = [
        Family::Name("DejaVu Sans"),
        Family::Name("Noto Sans"),
        Family::SansSerif,
    ];

    for family in preferred_families {
        if let Some(id) = db.query(&Query {
            families: &[family],
            ..Default::default()
        }) && let Some(font) = load_face(&db, id)?
        {
            return Ok(font);
        }
    }

    for face in db.faces() {
        if let Some(font) = load_face(&db, face.id)? {
            return Ok(font);
        }
    }

    Err(anyhow!("failed to load a system font for timestamps"))
}

fn load_face(db: &Database, id: fontdb::ID) -> Result<Option<FontArc>> {
    let face = db.face(id).context("missing font face in database")?;
    let data = match &face.source {
        Source::Binary(data) => data.as_ref().as_ref().to_vec(),
        Source::File(path) => fs::read(path)
            .with_context(|| format!("failed to read font at {}", path.display()))?,
        Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
    };
    Ok(FontArc::try_from_vec(data).ok())
}

fn text_width(font: &FontArc, scale: PxScale, text: &str) -> f32 {
    let scaled = font.as_scaled(scale);
    let mut width = 0.0;
    let mut previous = None;
    for ch in text.chars().filter(|c| !c.is_control()) {
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled.kern(prev, glyph);
        }
        width += scaled.h_advance(glyph);
        previous = Some(glyph);
    }
    width
}

fn draw_text(
    image: &mut RgbaImage,
    font: &FontArc,
    scale: PxScale,
    text: &str,
    left: f32,
    baseline: f32,
    color: [u8; 3],
) {
    let scaled = font.as_scaled(scale);
    let mut cursor_x = left;
    let mut previous = None;
    for ch in text.chars().filter(|c| !c.is_control()) {
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            cursor_x += scaled.kern(prev, glyph);
        }
        let mut positioned = scaled.scaled_glyph(ch);
        positioned.position = point(cursor_x, baseline);
        if let Some(outline) = font.outline_glyph(positioned) {
            let bounds = outline.px_bounds();
            outline.draw(|x, y, coverage| {
                blend_pixel(
                    image,
                    bounds.min.x + x as f32,
                    bounds.min.y + y as f32,
                    color,
                    coverage,
                );
            });
        }
        cursor_x += scaled.h_advance(glyph);
        previous = Some(glyph);
    }
}

fn fill_rect(
    image: &mut RgbaImage,
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
    color: [u8; 3],
    alpha: f32,
) {
    let x0 = left.max(0.0).floor() as u32;
    let y0 = top.max(0.0).floor() as u32;
    let x1 = (right.ceil() as u32).min(image.width());
    let y1 = (bottom.ceil() as u32).min(image.height());
    for y in y0..y1 {
        for x in x0..x1 {
            blend_pixel(image, x as f32, y as f32, color, alpha);
        }
    }
}

fn blend_pixel(image: &mut RgbaImage, x: f32, y: f32, color: [u8; 3], coverage: f32) {
    if coverage <= 0.0 {
        return;
    }
    let xi = x.floor() as i64;
    let yi = y.floor() as i64;
    if xi < 0 || yi < 0 || xi >= i64::from(image.width()) || yi >= i64::from(image.height()) {
        return;
    }
    let alpha = coverage.clamp(0.0, 1.0);
    let Rgba(dst) = *image.get_pixel(xi as u32, yi as u32);
    let mix = |s: u8, d: u8| (f32::from(s) * alpha + f32::from(d) * (1.0 - alpha)).round() as u8;
    image.put_pixel(
        xi as u32,
        yi as u32,
        Rgba([
            mix(color[0], dst[0]),
            mix(color[1], dst[1]),
            mix(color[2], dst[2]),
            dst[3],
        ]),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn label_drops_seconds() {
        let taken = NaiveDate::from_ymd_opt(2019, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap();
        assert_eq!(format_label(taken), "2019-12-31 23:59");
    }

    #[test]
    fn backing_box_blends_toward_black() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([200, 100, 50, 255]));
        fill_rect(&mut img, 2.0, 2.0, 4.0, 4.0, [0, 0, 0], 0.5);
        assert_eq!(img.get_pixel(2, 2), &Rgba([100, 50, 25, 255]));
        assert_eq!(img.get_pixel(5, 5), &Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn out_of_bounds_pixels_are_ignored() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        blend_pixel(&mut img, -1.0, 0.0, [255, 255, 255], 1.0);
        blend_pixel(&mut img, 0.0, 5.0, [255, 255, 255], 1.0);
        assert!(img.pixels().all(|p| *p == Rgba([0, 0, 0, 255])));
    }
}
