//! Dry-run planning: the queues the frame would build, computed from image
//! headers only.

use std::fmt::Write as _;
use std::ops::Range;
use std::path::PathBuf;

use tracing::warn;

use crate::config::Configuration;
use crate::meta::display_dimensions;
use crate::processing::layout::{pack_rows, scale_to_height};
use crate::scan::MediaLibrary;
use crate::tasks::batch::next_batch_index;
use crate::tasks::queue::{Slot, policy_for};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedEntry {
    /// Photos sharing one canvas, left to right.
    Canvas(Vec<PathBuf>),
    Video(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedBatch {
    pub index: usize,
    pub photos: Range<usize>,
    pub entries: Vec<PlannedEntry>,
    /// Photos whose header could not be read.
    pub unreadable: Vec<PathBuf>,
}

/// Plans `count` consecutive batches starting at batch 0, wrapping like the
/// sequencer does.
pub fn plan_batches(cfg: &Configuration, library: &MediaLibrary, count: usize) -> Vec<PlannedBatch> {
    let policy = policy_for(cfg.queue_policy);
    let videos: &[PathBuf] = if cfg.video.enabled {
        &library.videos
    } else {
        &[]
    };
    let spec = cfg.tile_spec();
    let target_h = spec.photo_height();
    let total = library.photos.len();

    let mut plans = Vec::with_capacity(count);
    let mut index = 0usize;
    for _ in 0..count {
        let start = index.saturating_mul(cfg.batch_size).min(total);
        let end = start.saturating_add(cfg.batch_size).min(total);

        let mut paths = Vec::new();
        let mut widths = Vec::new();
        let mut unreadable = Vec::new();
        for path in &library.photos[start..end] {
            match display_dimensions(path) {
                Ok(dims) => {
                    widths.push(scale_to_height(dims.width, dims.height, target_h));
                    paths.push(path.clone());
                }
                Err(err) => {
                    warn!(path = %path.display(), "cannot read image header: {err:#}");
                    unreadable.push(path.clone());
                }
            }
        }

        let rows: Vec<Vec<PathBuf>> = pack_rows(&widths, spec.canvas_width, spec.border_size)
            .into_iter()
            .map(|row| paths[row.members].to_vec())
            .collect();
        let entries = policy
            .order(rows.len(), videos.len(), index)
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Photo(i) => rows.get(i).cloned().map(PlannedEntry::Canvas),
                Slot::Video(i) => videos.get(i).cloned().map(PlannedEntry::Video),
            })
            .collect();

        plans.push(PlannedBatch {
            index,
            photos: start..end,
            entries,
            unreadable,
        });
        index = next_batch_index(index, cfg.batch_size, total);
    }
    plans
}

/// Human-readable listing printed by `--plan`.
pub fn render(plans: &[PlannedBatch]) -> String {
    let mut out = String::new();
    for plan in plans {
        let _ = writeln!(
            out,
            "batch {} (photos {}..{}): {} entries",
            plan.index,
            plan.photos.start,
            plan.photos.end,
            plan.entries.len()
        );
        for (pos, entry) in plan.entries.iter().enumerate() {
            match entry {
                PlannedEntry::Canvas(paths) => {
                    let names: Vec<String> = paths
                        .iter()
                        .filter_map(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                        .collect();
                    let _ = writeln!(out, "  {pos:>3}  photo  {}", names.join(", "));
                }
                PlannedEntry::Video(path) => {
                    let _ = writeln!(out, "  {pos:>3}  video  {}", path.display());
                }
            }
        }
        for path in &plan.unreadable {
            let _ = writeln!(out, "       skip   {}", path.display());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::path::Path;

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn plans_rows_from_headers_and_rotates_videos() {
        let dir = tempfile::tempdir().unwrap();
        // Canvas 1920x1080 with 50px borders: photos scale to 980px high.
        // 4:3 landscape -> 1306 wide, portrait 3:4 -> 735 wide.
        let a = write_png(dir.path(), "a.png", 40, 30);
        let b = write_png(dir.path(), "b.png", 30, 40);
        let c = write_png(dir.path(), "c.png", 30, 40);
        let d = write_png(dir.path(), "d.png", 40, 30);
        let library = MediaLibrary {
            photos: vec![a.clone(), b.clone(), c.clone(), d.clone()],
            videos: vec![PathBuf::from("v0.mp4"), PathBuf::from("v1.mp4")],
        };
        let cfg = Configuration {
            batch_size: 3,
            ..Configuration::default()
        };

        let plans = plan_batches(&cfg, &library, 3);
        assert_eq!(plans.len(), 3);
        assert_eq!(
            plans[0].entries,
            vec![
                PlannedEntry::Canvas(vec![a.clone()]),
                PlannedEntry::Canvas(vec![b, c]),
                PlannedEntry::Video(PathBuf::from("v0.mp4")),
            ]
        );
        assert_eq!(plans[1].photos, 3..4);
        assert_eq!(
            plans[1].entries,
            vec![
                PlannedEntry::Canvas(vec![d]),
                PlannedEntry::Video(PathBuf::from("v1.mp4")),
            ]
        );
        assert_eq!(plans[2].index, 0);

        let text = render(&plans);
        assert!(text.contains("batch 1 (photos 3..4): 2 entries"));
    }

    #[test]
    fn unreadable_headers_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.jpg");
        std::fs::write(&broken, b"nope").unwrap();
        let library = MediaLibrary {
            photos: vec![broken.clone()],
            videos: Vec::new(),
        };
        let plans = plan_batches(&Configuration::default(), &library, 1);
        assert!(plans[0].entries.is_empty());
        assert_eq!(plans[0].unreadable, vec![broken]);
    }
}
