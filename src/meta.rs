use std::{fs, io::BufReader, path::Path};

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use exif::{Exif, In, Tag, Value};
use tracing::debug;

/// Photo dimensions as they appear once orientation is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayDimensions {
    pub width: u32,
    pub height: u32,
    pub orientation: u16,
}

/// FAST: read only the header for dimensions, plus EXIF orientation.
pub fn display_dimensions(path: &Path) -> Result<DisplayDimensions> {
    let (raw_w, raw_h) = image::image_dimensions(path)?;
    let orientation = read_orientation(path).unwrap_or(1);
    let (width, height) = if rotates_quarter_turn(orientation) {
        (raw_h, raw_w)
    } else {
        (raw_w, raw_h)
    };
    Ok(DisplayDimensions {
        width,
        height,
        orientation,
    })
}

/// Orientations that are applied as a 90° or 270° rotation.
#[inline]
pub fn rotates_quarter_turn(orientation: u16) -> bool {
    matches!(orientation, 6 | 8)
}

pub fn read_orientation(path: &Path) -> Option<u16> {
    let exif = read_exif(path)?;
    let field = exif.get_field(Tag::Orientation, In::PRIMARY)?;
    let o = match &field.value {
        Value::Short(arr) if !arr.is_empty() => arr[0],
        Value::Long(arr) if !arr.is_empty() => arr[0] as u16,
        _ => 1,
    };
    debug!(path = %path.display(), orientation = o, "exif orientation");
    Some(o)
}

/// Capture time from `DateTimeOriginal`, falling back to `DateTime`.
pub fn read_capture_time(path: &Path) -> Option<NaiveDateTime> {
    let exif = read_exif(path)?;
    [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif.get_field(tag, In::PRIMARY))
        .find_map(|field| match &field.value {
            Value::Ascii(parts) => parts.first().and_then(|raw| parse_exif_datetime(raw)),
            _ => None,
        })
}

fn parse_exif_datetime(raw: &[u8]) -> Option<NaiveDateTime> {
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    NaiveDate::from_ymd_opt(i32::from(dt.year), u32::from(dt.month), u32::from(dt.day))?
        .and_hms_opt(
            u32::from(dt.hour),
            u32::from(dt.minute),
            u32::from(dt.second),
        )
}

fn read_exif(path: &Path) -> Option<Exif> {
    let f = fs::File::open(path).ok()?;
    let mut buf = BufReader::new(f);
    exif::Reader::new().read_from_container(&mut buf).ok()
}
