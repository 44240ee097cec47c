use std::collections::VecDeque;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::MediaError;
use crate::processing::tiler::{Canvas, Tiler};

#[derive(Debug)]
struct CachedBatch {
    index: usize,
    canvases: Vec<Canvas>,
}

/// Result of [`BatchLoader::load_batch`].
#[derive(Debug)]
pub enum BatchLoad {
    /// The batch was cached and is ready to show.
    Ready(Vec<Canvas>),
    /// The requested slice of the library is empty; there is nothing more.
    Exhausted,
    /// The batch has to be tiled first. Carries the job to run unless one for
    /// the same batch is already running; either way the canvases come back
    /// as a [`TiledBatch`].
    Tiling(Option<TileJob>),
}

/// Tiling work for one batch. Holds only read-only inputs so it can run on a
/// blocking worker.
#[derive(Debug)]
pub struct TileJob {
    generation: u64,
    index: usize,
    paths: Vec<PathBuf>,
    tiler: Arc<Tiler>,
}

impl TileJob {
    pub fn batch_index(&self) -> usize {
        self.index
    }

    /// Decodes and tiles the batch. Blocking.
    pub fn run(self) -> TiledBatch {
        let result = self.tiler.tile(&self.paths);
        TiledBatch {
            generation: self.generation,
            index: self.index,
            result,
        }
    }
}

/// Handed back from a tiling worker to the owner of the [`BatchLoader`].
#[derive(Debug)]
pub struct TiledBatch {
    generation: u64,
    pub index: usize,
    pub result: Result<Vec<Canvas>, MediaError>,
}

/// Batch index following `current`, wrapping to 0 past the end of the library.
pub fn next_batch_index(current: usize, batch_size: usize, total_photos: usize) -> usize {
    let next = current + 1;
    if next.saturating_mul(batch_size) >= total_photos {
        0
    } else {
        next
    }
}

/// Pages through the photo library in fixed-size batches and keeps a bounded
/// cache of tiled canvases. Tiling itself happens elsewhere, through
/// [`TileJob`]s.
#[derive(Debug)]
pub struct BatchLoader {
    photos: Arc<[PathBuf]>,
    batch_size: usize,
    max_cached_canvases: usize,
    tiler: Arc<Tiler>,
    /// Least recently loaded first.
    cache: VecDeque<CachedBatch>,
    in_flight: Vec<usize>,
    generation: u64,
}

impl BatchLoader {
    pub fn new(
        photos: Vec<PathBuf>,
        batch_size: usize,
        max_cached_canvases: usize,
        tiler: Arc<Tiler>,
    ) -> Self {
        Self {
            photos: photos.into(),
            batch_size: batch_size.max(1),
            max_cached_canvases: max_cached_canvases.max(1),
            tiler,
            cache: VecDeque::new(),
            in_flight: Vec::new(),
            generation: 0,
        }
    }

    pub fn total_photos(&self) -> usize {
        self.photos.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Library slice `[index * batch_size, (index + 1) * batch_size)`, clamped.
    pub fn batch_range(&self, index: usize) -> Range<usize> {
        let total = self.photos.len();
        let start = index.saturating_mul(self.batch_size).min(total);
        let end = start.saturating_add(self.batch_size).min(total);
        start..end
    }

    /// Serves batch `index` from the cache, or hands out the job that tiles it.
    pub fn load_batch(&mut self, index: usize) -> BatchLoad {
        if self.batch_range(index).is_empty() {
            return BatchLoad::Exhausted;
        }
        if let Some(pos) = self.cache.iter().position(|b| b.index == index)
            && let Some(batch) = self.cache.remove(pos)
        {
            let canvases = batch.canvases.clone();
            debug!(batch = index, canvases = canvases.len(), "batch served from cache");
            self.cache.push_back(batch);
            return BatchLoad::Ready(canvases);
        }
        BatchLoad::Tiling(self.tile_job(index))
    }

    /// Job tiling batch `index` ahead of time, or `None` when the batch is
    /// empty, cached or already being tiled.
    pub fn preload_job(&mut self, index: usize) -> Option<TileJob> {
        if self.batch_range(index).is_empty() || self.is_cached(index) {
            return None;
        }
        self.tile_job(index)
    }

    /// Takes back a finished job. Results for an older library are dropped and
    /// yield `None`; successful tilings are cached.
    pub fn accept(&mut self, tiled: TiledBatch) -> Option<Result<Vec<Canvas>, MediaError>> {
        if tiled.generation != self.generation {
            debug!(batch = tiled.index, "discarding tiles for previous library");
            return None;
        }
        self.in_flight.retain(|&i| i != tiled.index);
        if self.is_cached(tiled.index) {
            debug!(batch = tiled.index, "discarding duplicate tiles");
            return None;
        }
        if let Ok(canvases) = &tiled.result {
            info!(batch = tiled.index + 1, slides = canvases.len(), "batch ready");
            self.insert(CachedBatch {
                index: tiled.index,
                canvases: canvases.clone(),
            });
        }
        Some(tiled.result)
    }

    /// Swaps in a new photo list and drops every cached canvas. Jobs still
    /// running for the old list are ignored when they come back.
    pub fn reset(&mut self, photos: Vec<PathBuf>) {
        self.photos = photos.into();
        self.cache.clear();
        self.in_flight.clear();
        self.generation += 1;
    }

    pub fn is_cached(&self, index: usize) -> bool {
        self.cache.iter().any(|b| b.index == index)
    }

    /// Indices of cached batches, least recently loaded first.
    pub fn cached_batches(&self) -> Vec<usize> {
        self.cache.iter().map(|b| b.index).collect()
    }

    pub fn cached_canvas_count(&self) -> usize {
        self.cache.iter().map(|b| b.canvases.len()).sum()
    }

    fn tile_job(&mut self, index: usize) -> Option<TileJob> {
        if self.in_flight.contains(&index) {
            debug!(batch = index, "batch already being tiled");
            return None;
        }
        let photos = self.batch_range(index);
        info!(
            batch = index + 1,
            total_batches = self.photos.len().div_ceil(self.batch_size),
            photos = photos.len(),
            "loading batch"
        );
        self.in_flight.push(index);
        Some(TileJob {
            generation: self.generation,
            index,
            paths: self.photos[photos].to_vec(),
            tiler: Arc::clone(&self.tiler),
        })
    }

    fn insert(&mut self, batch: CachedBatch) {
        self.cache.push_back(batch);
        // The batch just loaded stays, even when it alone exceeds the bound.
        while self.cached_canvas_count() > self.max_cached_canvases && self.cache.len() > 1 {
            if let Some(evicted) = self.cache.pop_front() {
                debug!(
                    batch = evicted.index,
                    canvases = evicted.canvases.len(),
                    "evicting cached batch"
                );
            }
        }
    }
}
