use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, anyhow, ensure};
use fast_image_resize as fir;
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage, imageops};
use jpeg_decoder::PixelFormat;
use tracing::debug;

use crate::meta::rotates_quarter_turn;

/// Decodes `path`, applies the EXIF `orientation` and scales the result to
/// exactly `width` x `height`, both given in display orientation.
pub fn load_scaled(path: &Path, width: u32, height: u32, orientation: u16) -> Result<RgbaImage> {
    ensure!(width > 0 && height > 0, "target size {width}x{height} is empty");
    // Reduced JPEG decoding happens before rotation, on stored pixels.
    let (stored_w, stored_h) = if rotates_quarter_turn(orientation) {
        (height, width)
    } else {
        (width, height)
    };
    let stored = decode_rgba8(path, stored_w, stored_h)?;
    resize_exact(apply_orientation(stored, orientation), width, height)
}

/// Only the rotations are honoured; mirrored variants are shown as stored.
pub fn apply_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    match orientation {
        3 => imageops::rotate180(&img),
        6 => imageops::rotate90(&img),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

fn decode_rgba8(path: &Path, min_w: u32, min_h: u32) -> Result<RgbaImage> {
    let reader = ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()
        .context("failed to guess image format")?;

    if reader.format() == Some(ImageFormat::Jpeg) {
        match decode_jpeg_reduced(path, min_w, min_h) {
            Ok(Some(img)) => return Ok(img),
            Ok(None) => {}
            Err(err) => debug!(path = %path.display(), "reduced JPEG decode failed: {err:#}"),
        }
    }

    Ok(reader
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?
        .into_rgba8())
}

/// Decodes at the smallest DCT scale that still covers `min_w` x `min_h`.
/// Returns `None` for pixel formats left to the generic decoder.
fn decode_jpeg_reduced(path: &Path, min_w: u32, min_h: u32) -> Result<Option<RgbaImage>> {
    let file = File::open(path)?;
    let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(file));
    let side = |v: u32| u16::try_from(v).unwrap_or(u16::MAX);
    decoder.scale(side(min_w), side(min_h))?;
    let pixels = decoder.decode()?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("JPEG header unavailable after decode"))?;
    let (w, h) = (u32::from(info.width), u32::from(info.height));

    let decoded = match info.pixel_format {
        PixelFormat::RGB24 => RgbImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
        PixelFormat::L8 => GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
        PixelFormat::L16 | PixelFormat::CMYK32 => return Ok(None),
    };
    decoded
        .map(|img| Some(img.into_rgba8()))
        .ok_or_else(|| anyhow!("JPEG buffer does not match {w}x{h}"))
}

fn resize_exact(img: RgbaImage, width: u32, height: u32) -> Result<RgbaImage> {
    if img.dimensions() == (width, height) {
        return Ok(img);
    }
    let (src_w, src_h) = img.dimensions();
    let src = fir::images::Image::from_vec_u8(src_w, src_h, img.into_raw(), fir::PixelType::U8x4)
        .context("photo buffer rejected by resizer")?;
    let mut dst = fir::images::Image::new(width, height, fir::PixelType::U8x4);
    let catmull_rom = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    fir::Resizer::new()
        .resize(&src, &mut dst, &catmull_rom)
        .context("photo resize failed")?;
    RgbaImage::from_raw(width, height, dst.into_vec())
        .ok_or_else(|| anyhow!("resized buffer does not match {width}x{height}"))
}
