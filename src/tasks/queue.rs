use std::fmt;
use std::path::PathBuf;

use crate::config::QueuePolicyKind;
use crate::processing::tiler::Canvas;
use crate::scan::MediaKind;

/// One playable item of the queue.
#[derive(Debug, Clone)]
pub enum MediaQueueEntry {
    Photo(Canvas),
    Video(PathBuf),
}

impl MediaQueueEntry {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Photo(_) => MediaKind::Photo,
            Self::Video(_) => MediaKind::Video,
        }
    }
}

/// Position in the inputs of [`build`]: a canvas index or a video index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Photo(usize),
    Video(usize),
}

/// Decides how the canvases of one batch and the video list interleave.
///
/// Implementations return indices only; they must stay deterministic for a
/// given `(photos, videos, batch_index)`.
pub trait QueuePolicy: Send + Sync + fmt::Debug {
    fn order(&self, photos: usize, videos: usize, batch_index: usize) -> Vec<Slot>;
}

/// Every canvas in order, then one video chosen by batch index.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhotosThenVideo;

impl QueuePolicy for PhotosThenVideo {
    fn order(&self, photos: usize, videos: usize, batch_index: usize) -> Vec<Slot> {
        let mut slots: Vec<Slot> = (0..photos).map(Slot::Photo).collect();
        if videos > 0 {
            slots.push(Slot::Video(batch_index % videos));
        }
        slots
    }
}

/// Canvas, video, canvas, video; leftovers of the longer list at the end.
#[derive(Debug, Default, Clone, Copy)]
pub struct Alternate;

impl QueuePolicy for Alternate {
    fn order(&self, photos: usize, videos: usize, _batch_index: usize) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(photos + videos);
        for i in 0..photos.max(videos) {
            if i < photos {
                slots.push(Slot::Photo(i));
            }
            if i < videos {
                slots.push(Slot::Video(i));
            }
        }
        slots
    }
}

pub fn policy_for(kind: QueuePolicyKind) -> Box<dyn QueuePolicy> {
    match kind {
        QueuePolicyKind::PhotosThenVideo => Box::new(PhotosThenVideo),
        QueuePolicyKind::Alternate => Box::new(Alternate),
    }
}

/// Builds a fresh queue for the active batch.
pub fn build(
    policy: &dyn QueuePolicy,
    canvases: &[Canvas],
    videos: &[PathBuf],
    batch_index: usize,
) -> Vec<MediaQueueEntry> {
    policy
        .order(canvases.len(), videos.len(), batch_index)
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Photo(i) => canvases.get(i).cloned().map(MediaQueueEntry::Photo),
            Slot::Video(i) => videos.get(i).cloned().map(MediaQueueEntry::Video),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn videos() -> Vec<PathBuf> {
        vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]
    }

    #[test]
    fn photos_then_video_rotates_by_batch() {
        let policy = PhotosThenVideo;
        let first = policy.order(10, 2, 0);
        assert_eq!(first.len(), 11);
        let photos: Vec<Slot> = (0..10).map(Slot::Photo).collect();
        assert_eq!(&first[..10], photos.as_slice());
        assert_eq!(first[10], Slot::Video(0));
        assert_eq!(policy.order(10, 2, 1)[10], Slot::Video(1));
        assert_eq!(policy.order(5, 2, 2).last(), Some(&Slot::Video(0)));
    }

    #[test]
    fn no_videos_means_photos_only() {
        let slots = PhotosThenVideo.order(3, 0, 7);
        assert_eq!(slots, vec![Slot::Photo(0), Slot::Photo(1), Slot::Photo(2)]);
    }

    #[test]
    fn alternate_appends_leftovers() {
        let slots = Alternate.order(3, 1, 0);
        assert_eq!(
            slots,
            vec![Slot::Photo(0), Slot::Video(0), Slot::Photo(1), Slot::Photo(2)]
        );
        let slots = Alternate.order(1, 2, 0);
        assert_eq!(slots, vec![Slot::Photo(0), Slot::Video(0), Slot::Video(1)]);
    }

    #[test]
    fn build_maps_slots_to_entries() {
        let queue = build(&PhotosThenVideo, &[], &videos(), 3);
        assert_eq!(queue.len(), 1);
        assert!(matches!(&queue[0], MediaQueueEntry::Video(p) if p == &PathBuf::from("b.mp4")));
        assert!(build(&Alternate, &[], &[], 0).is_empty());
    }
}
