//! Playback sequencing.
//!
//! [`Sequencer`] is a synchronous state machine: every transition takes the
//! current instant and returns immediately. Batches missing from the cache are
//! handed out as [`TileJob`]s; the transition that needed one completes when
//! the tiled batch comes back. [`run`] owns the sequencer on a single task,
//! runs tile jobs on blocking workers and feeds it timer deadlines, engine
//! completions, navigation commands, tiled batches and library rescans.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::MediaError;
use crate::events::{LibraryEvent, NavCommand, PlaybackTicket, PlayerEvent};
use crate::player::VideoEngine;
use crate::presenter::Presenter;
use crate::scan::MediaLibrary;
use crate::processing::tiler::Canvas;
use crate::tasks::batch::{BatchLoad, BatchLoader, TileJob, TiledBatch, next_batch_index};
use crate::tasks::queue::{self, MediaQueueEntry, QueuePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    ShowingPhoto,
    ShowingVideo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackCursor {
    pub index: usize,
    pub batch_index: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SequencerSettings {
    pub photo_delay: Duration,
    pub skip_delay: Duration,
    pub key_debounce: Duration,
}

/// Drops inputs arriving within `window` of the last accepted one.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last
            && now.saturating_duration_since(last) < self.window
        {
            return false;
        }
        self.last = Some(now);
        true
    }
}

#[derive(Debug, Default)]
struct Pause {
    active: bool,
    remaining: Option<Duration>,
}

/// What to do once the batch being waited for is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Start,
    /// `retry` allows one more attempt from batch 0.
    RollOver { retry: bool },
    LibraryChanged,
}

#[derive(Debug, Clone, Copy)]
struct PendingLoad {
    batch_index: usize,
    transition: Transition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rebuild {
    Built,
    Empty,
    Waiting,
}

pub struct Sequencer {
    loader: BatchLoader,
    videos: Vec<PathBuf>,
    policy: Box<dyn QueuePolicy>,
    engine: Option<Box<dyn VideoEngine>>,
    presenter: Box<dyn Presenter>,
    settings: SequencerSettings,
    queue: Vec<MediaQueueEntry>,
    cursor: PlaybackCursor,
    state: PlaybackState,
    deadline: Option<Instant>,
    pause: Pause,
    active_ticket: Option<PlaybackTicket>,
    last_ticket: u64,
    debounce: Debouncer,
    preload_armed: bool,
    pending: Option<PendingLoad>,
    tile_jobs: Vec<TileJob>,
}

impl Sequencer {
    /// Without an engine the video list is ignored and only photos are shown.
    pub fn new(
        loader: BatchLoader,
        videos: Vec<PathBuf>,
        policy: Box<dyn QueuePolicy>,
        engine: Option<Box<dyn VideoEngine>>,
        presenter: Box<dyn Presenter>,
        settings: SequencerSettings,
    ) -> Self {
        let videos = if engine.is_some() { videos } else { Vec::new() };
        Self {
            loader,
            videos,
            policy,
            engine,
            presenter,
            settings,
            queue: Vec::new(),
            cursor: PlaybackCursor::default(),
            state: PlaybackState::Idle,
            deadline: None,
            pause: Pause::default(),
            active_ticket: None,
            last_ticket: 0,
            debounce: Debouncer::new(settings.key_debounce),
            preload_armed: false,
            pending: None,
            tile_jobs: Vec::new(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn queue(&self) -> &[MediaQueueEntry] {
        &self.queue
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_paused(&self) -> bool {
        self.pause.active
    }

    pub fn loader(&self) -> &BatchLoader {
        &self.loader
    }

    /// Whether a transition is waiting for a batch to be tiled.
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Loads the first batch and shows its first entry.
    pub fn start(&mut self, now: Instant) {
        self.cancel_pending();
        self.cursor = PlaybackCursor::default();
        self.begin(0, Transition::Start, now);
    }

    /// Fires the pending deadline if it is due.
    pub fn on_deadline(&mut self, now: Instant) {
        let Some(due) = self.deadline else {
            return;
        };
        if now < due {
            return;
        }
        self.deadline = None;
        match self.state {
            PlaybackState::Idle => {
                debug!("retrying from idle");
                self.start(now);
            }
            PlaybackState::ShowingPhoto | PlaybackState::ShowingVideo => self.advance(now),
        }
    }

    /// Handles an engine completion. Returns `false` for stale tickets.
    pub fn on_player_event(&mut self, event: PlayerEvent, now: Instant) -> bool {
        if self.active_ticket != Some(event.ticket()) {
            debug!(ticket = event.ticket().0, "ignoring stale player event");
            return false;
        }
        self.active_ticket = None;
        if let PlayerEvent::Failed { reason, .. } = &event {
            warn!(reason = %reason, "video playback failed");
        }
        self.advance(now);
        true
    }

    /// Skips to the following entry. Returns `false` when debounced.
    pub fn next(&mut self, now: Instant) -> bool {
        if !self.debounce.accept(now) {
            debug!("next debounced");
            return false;
        }
        if self.queue.is_empty() {
            return true;
        }
        self.advance(now);
        true
    }

    /// Steps back one entry within the current queue. Returns `false` when
    /// debounced.
    pub fn previous(&mut self, now: Instant) -> bool {
        if !self.debounce.accept(now) {
            debug!("previous debounced");
            return false;
        }
        if self.queue.is_empty() {
            return true;
        }
        self.cancel_pending();
        if let Some(pending) = self.pending
            && matches!(pending.transition, Transition::RollOver { .. })
        {
            debug!(batch = pending.batch_index, "rollover abandoned by previous");
            self.pending = None;
        }
        let len = self.queue.len();
        self.cursor.index = (self.cursor.index + len - 1) % len;
        self.enter(now);
        true
    }

    /// Freezes or resumes the photo timer or the running video.
    pub fn toggle_pause(&mut self, now: Instant) {
        let video_running = self.state == PlaybackState::ShowingVideo && self.active_ticket.is_some();
        if self.pause.active {
            self.pause.active = false;
            if let Some(remaining) = self.pause.remaining.take() {
                self.deadline = Some(now + remaining);
            }
            if video_running && let Some(engine) = self.engine.as_mut() {
                engine.resume();
            }
            info!("playback resumed");
        } else {
            self.pause.active = true;
            self.pause.remaining = self
                .deadline
                .take()
                .map(|due| due.saturating_duration_since(now));
            if video_running && let Some(engine) = self.engine.as_mut() {
                engine.pause();
            }
            info!("playback paused");
        }
    }

    /// Takes back a tiled batch. Completes the waiting transition when this
    /// is the batch it needs; otherwise the batch is only cached.
    pub fn on_batch_tiled(&mut self, batch: TiledBatch, now: Instant) {
        let index = batch.index;
        let Some(result) = self.loader.accept(batch) else {
            return;
        };
        let Some(pending) = self.pending.filter(|p| p.batch_index == index) else {
            if let Err(err) = result {
                warn!(batch = index, error = %err, "preload failed");
            }
            return;
        };
        self.pending = None;
        let canvases = result.unwrap_or_else(|err| {
            warn!(batch = index, error = %err, "batch failed to load");
            Vec::new()
        });
        let built = self.install(index, &canvases);
        self.finish(pending.transition, index, built, now);
    }

    /// Replaces the library, restarting from batch 0 without interrupting
    /// whatever is on screen.
    pub fn on_library_changed(&mut self, library: MediaLibrary, now: Instant) {
        info!(
            photos = library.photos.len(),
            videos = library.videos.len(),
            "library changed"
        );
        if self.engine.is_some() {
            self.videos = library.videos;
        }
        self.loader.reset(library.photos);
        self.tile_jobs.clear();
        self.begin(0, Transition::LibraryChanged, now);
    }

    /// Drains the tile jobs requested since the last call.
    pub fn take_tile_jobs(&mut self) -> Vec<TileJob> {
        std::mem::take(&mut self.tile_jobs)
    }

    /// Stops any running video.
    pub fn shutdown(&mut self) {
        self.cancel_pending();
        self.state = PlaybackState::Idle;
    }

    fn cancel_pending(&mut self) {
        self.deadline = None;
        self.pause = Pause::default();
        if let Some(ticket) = self.active_ticket.take()
            && let Some(engine) = self.engine.as_mut()
        {
            debug!(ticket = ticket.0, "stopping video");
            engine.stop();
        }
    }

    fn go_idle(&mut self, now: Instant) {
        info!("nothing to show; waiting");
        self.state = PlaybackState::Idle;
        self.deadline = Some(now + self.settings.photo_delay);
    }

    fn advance(&mut self, now: Instant) {
        self.cancel_pending();
        let next = self.cursor.index + 1;
        if next < self.queue.len() {
            self.cursor.index = next;
            self.enter(now);
        } else {
            self.roll_over(now);
        }
    }

    fn roll_over(&mut self, now: Instant) {
        let next = next_batch_index(
            self.cursor.batch_index,
            self.loader.batch_size(),
            self.loader.total_photos(),
        );
        self.begin(next, Transition::RollOver { retry: next != 0 }, now);
    }

    /// Rebuilds the queue for `batch_index` and completes `transition`, or
    /// parks it until the batch has been tiled.
    fn begin(&mut self, batch_index: usize, transition: Transition, now: Instant) {
        self.pending = None;
        match self.rebuild(batch_index) {
            Rebuild::Waiting => {
                debug!(batch = batch_index, ?transition, "waiting for batch");
                self.pending = Some(PendingLoad {
                    batch_index,
                    transition,
                });
            }
            outcome => self.finish(transition, batch_index, outcome == Rebuild::Built, now),
        }
    }

    fn finish(&mut self, transition: Transition, batch_index: usize, built: bool, now: Instant) {
        match transition {
            Transition::Start => {
                if built {
                    self.enter(now);
                } else {
                    self.queue.clear();
                    self.go_idle(now);
                }
            }
            Transition::RollOver { retry } => {
                if !built && retry {
                    self.begin(0, Transition::RollOver { retry: false }, now);
                    return;
                }
                if built {
                    info!(batch = batch_index, entries = self.queue.len(), "rolled over to batch");
                } else {
                    debug!(
                        batch = self.cursor.batch_index,
                        "no batch to roll over to; cycling current queue"
                    );
                }
                self.cursor.index = 0;
                if self.queue.is_empty() {
                    self.go_idle(now);
                } else {
                    self.enter(now);
                }
            }
            Transition::LibraryChanged => {
                if !built {
                    self.queue.clear();
                    self.cursor = PlaybackCursor::default();
                    self.cancel_pending();
                    self.go_idle(now);
                    return;
                }
                if self.cursor.index >= self.queue.len() {
                    self.cursor.index = 0;
                }
                if self.state == PlaybackState::Idle {
                    self.cancel_pending();
                    self.enter(now);
                }
            }
        }
    }

    /// Replaces the queue with the one for `batch_index` when its canvases
    /// are at hand. An empty result leaves the current queue untouched.
    fn rebuild(&mut self, batch_index: usize) -> Rebuild {
        let canvases = match self.loader.load_batch(batch_index) {
            BatchLoad::Ready(canvases) => canvases,
            BatchLoad::Exhausted => Vec::new(),
            BatchLoad::Tiling(job) => {
                self.tile_jobs.extend(job);
                return Rebuild::Waiting;
            }
        };
        if self.install(batch_index, &canvases) {
            Rebuild::Built
        } else {
            Rebuild::Empty
        }
    }

    fn install(&mut self, batch_index: usize, canvases: &[Canvas]) -> bool {
        let queue = queue::build(self.policy.as_ref(), canvases, &self.videos, batch_index);
        if queue.is_empty() {
            return false;
        }
        debug!(
            batch = batch_index,
            canvases = canvases.len(),
            entries = queue.len(),
            "queue rebuilt"
        );
        self.queue = queue;
        self.cursor.batch_index = batch_index;
        self.preload_armed = true;
        true
    }

    fn enter(&mut self, now: Instant) {
        let Some(entry) = self.queue.get(self.cursor.index).cloned() else {
            self.go_idle(now);
            return;
        };
        self.pause = Pause::default();
        debug!(index = self.cursor.index, kind = ?entry.kind(), "entering entry");
        match entry {
            MediaQueueEntry::Photo(canvas) => {
                self.state = PlaybackState::ShowingPhoto;
                if let Err(err) = self.presenter.present(&canvas) {
                    warn!("failed to present canvas: {err:#}");
                }
                self.deadline = Some(now + self.settings.photo_delay);
            }
            MediaQueueEntry::Video(path) => {
                self.state = PlaybackState::ShowingVideo;
                match self.start_video(&path) {
                    Ok(ticket) => self.active_ticket = Some(ticket),
                    Err(err) => {
                        warn!(error = %err, "skipping video");
                        self.deadline = Some(now + self.settings.skip_delay);
                    }
                }
            }
        }
        self.maybe_request_preload();
    }

    fn start_video(&mut self, path: &Path) -> Result<PlaybackTicket, MediaError> {
        if !path.is_file() {
            return Err(MediaError::VideoNotFound(path.to_path_buf()));
        }
        let Some(engine) = self.engine.as_mut() else {
            return Err(MediaError::EngineAttach {
                path: path.to_path_buf(),
                reason: "video playback is disabled".to_string(),
            });
        };
        self.last_ticket += 1;
        let ticket = PlaybackTicket(self.last_ticket);
        engine.play(path, ticket)?;
        Ok(ticket)
    }

    fn maybe_request_preload(&mut self) {
        if !self.preload_armed || self.cursor.index < self.queue.len() / 2 {
            return;
        }
        self.preload_armed = false;
        let next = next_batch_index(
            self.cursor.batch_index,
            self.loader.batch_size(),
            self.loader.total_photos(),
        );
        if next == self.cursor.batch_index {
            return;
        }
        if let Some(job) = self.loader.preload_job(next) {
            debug!(batch = next, "preloading batch");
            self.tile_jobs.push(job);
        }
    }
}

/// Drives `sequencer` until cancelled or asked to quit.
pub async fn run(
    mut sequencer: Sequencer,
    mut nav_rx: Receiver<NavCommand>,
    mut player_rx: Receiver<PlayerEvent>,
    mut library_rx: Receiver<LibraryEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let (tiled_tx, mut tiled_rx) = mpsc::channel::<TiledBatch>(4);

    sequencer.start(Instant::now());
    spawn_tiling(&mut sequencer, &tiled_tx);

    loop {
        let deadline = sequencer.deadline();
        let timer = async move {
            match deadline {
                Some(due) => tokio::time::sleep_until(tokio::time::Instant::from_std(due)).await,
                None => std::future::pending::<()>().await,
            }
        };

        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; stopping playback");
                break;
            }

            _ = timer => sequencer.on_deadline(Instant::now()),

            Some(command) = nav_rx.recv() => {
                let now = Instant::now();
                debug!(?command, "navigation");
                match command {
                    NavCommand::Next => {
                        sequencer.next(now);
                    }
                    NavCommand::Previous => {
                        sequencer.previous(now);
                    }
                    NavCommand::TogglePause => sequencer.toggle_pause(now),
                    NavCommand::Quit => {
                        info!("quit requested");
                        cancel.cancel();
                        break;
                    }
                }
            }

            Some(event) = player_rx.recv() => {
                sequencer.on_player_event(event, Instant::now());
            }

            Some(LibraryEvent::Rescanned(library)) = library_rx.recv() => {
                sequencer.on_library_changed(library, Instant::now());
            }

            Some(batch) = tiled_rx.recv() => sequencer.on_batch_tiled(batch, Instant::now()),
        }

        spawn_tiling(&mut sequencer, &tiled_tx);
    }

    sequencer.shutdown();
    Ok(())
}

fn spawn_tiling(sequencer: &mut Sequencer, tx: &Sender<TiledBatch>) {
    for job in sequencer.take_tile_jobs() {
        debug!(batch = job.batch_index(), "tiling batch on worker");
        let tx = tx.clone();
        tokio::task::spawn_blocking(move || {
            let batch = job.run();
            if tx.blocking_send(batch).is_err() {
                debug!("sequencer gone; dropping tiled batch");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecodeErrorPolicy;
    use crate::processing::tiler::{Canvas, TileSpec, Tiler};
    use crate::tasks::queue::PhotosThenVideo;
    use image::{Rgba, RgbaImage};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct EngineLog {
        plays: Vec<(PathBuf, PlaybackTicket)>,
        stops: usize,
        paused: bool,
    }

    struct FakeEngine(Arc<Mutex<EngineLog>>);

    impl VideoEngine for FakeEngine {
        fn play(&mut self, path: &Path, ticket: PlaybackTicket) -> Result<(), MediaError> {
            self.0.lock().unwrap().plays.push((path.to_path_buf(), ticket));
            Ok(())
        }
        fn stop(&mut self) {
            self.0.lock().unwrap().stops += 1;
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().paused = true;
        }
        fn resume(&mut self) {
            self.0.lock().unwrap().paused = false;
        }
    }

    struct FakePresenter(Arc<Mutex<Vec<Vec<PathBuf>>>>);

    impl Presenter for FakePresenter {
        fn present(&mut self, canvas: &Canvas) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(canvas.sources().to_vec());
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        photos: Vec<PathBuf>,
        videos: Vec<PathBuf>,
        engine: Arc<Mutex<EngineLog>>,
        shown: Arc<Mutex<Vec<Vec<PathBuf>>>>,
        seq: Sequencer,
        now: Instant,
    }

    const PHOTO_DELAY: Duration = Duration::from_secs(5);

    // Photos are 10x10 and the canvas fits exactly one per row.
    fn harness(photos: usize, videos: usize, batch_size: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let photo_paths: Vec<PathBuf> = (0..photos)
            .map(|i| {
                let path = dir.path().join(format!("{i:03}.png"));
                RgbaImage::from_pixel(10, 10, Rgba([200, 0, 0, 255]))
                    .save(&path)
                    .unwrap();
                path
            })
            .collect();
        let video_paths: Vec<PathBuf> = (0..videos)
            .map(|i| {
                let path = dir.path().join(format!("v{i}.mp4"));
                std::fs::write(&path, b"").unwrap();
                path
            })
            .collect();

        let tiler = Arc::new(Tiler::new(
            TileSpec {
                canvas_width: 100,
                canvas_height: 60,
                border_size: 5,
                border_height: 5,
                top_offset: 5,
                background: [255, 255, 255],
            },
            DecodeErrorPolicy::Skip,
        ));
        let loader = BatchLoader::new(photo_paths.clone(), batch_size, 100, tiler);
        let engine = Arc::new(Mutex::new(EngineLog::default()));
        let shown = Arc::new(Mutex::new(Vec::new()));
        let seq = Sequencer::new(
            loader,
            video_paths.clone(),
            Box::new(PhotosThenVideo),
            Some(Box::new(FakeEngine(Arc::clone(&engine)))),
            Box::new(FakePresenter(Arc::clone(&shown))),
            SequencerSettings {
                photo_delay: PHOTO_DELAY,
                skip_delay: Duration::from_millis(100),
                key_debounce: Duration::from_millis(500),
            },
        );
        Harness {
            _dir: dir,
            photos: photo_paths,
            videos: video_paths,
            engine,
            shown,
            seq,
            now: Instant::now(),
        }
    }

    impl Harness {
        fn start(&mut self) {
            self.seq.start(self.now);
            self.pump();
        }

        /// Runs requested tile jobs inline, the way worker threads would.
        fn pump(&mut self) {
            loop {
                let jobs = self.seq.take_tile_jobs();
                if jobs.is_empty() {
                    break;
                }
                for job in jobs {
                    let now = self.now;
                    self.seq.on_batch_tiled(job.run(), now);
                }
            }
        }

        /// Plays batch 0 of a 10-photo batch up to its rollover without
        /// running any tile job, and returns the preload job it requested.
        fn play_to_rollover(&mut self) -> TileJob {
            let mut preload = None;
            for _ in 0..10 {
                let now = self.tick(PHOTO_DELAY);
                self.seq.on_deadline(now);
                for job in self.seq.take_tile_jobs() {
                    assert!(preload.is_none(), "only one tile job expected");
                    preload = Some(job);
                }
            }
            preload.expect("next batch requested")
        }

        fn tick(&mut self, by: Duration) -> Instant {
            self.now += by;
            self.now
        }

        /// Completes the current entry the way the runtime would.
        fn finish_current(&mut self) {
            match self.seq.state() {
                PlaybackState::ShowingPhoto => {
                    let now = self.tick(PHOTO_DELAY);
                    self.seq.on_deadline(now);
                }
                PlaybackState::ShowingVideo => {
                    let ticket = self.last_ticket();
                    let now = self.tick(Duration::from_secs(1));
                    assert!(self.seq.on_player_event(PlayerEvent::Finished(ticket), now));
                }
                PlaybackState::Idle => panic!("sequencer is idle"),
            }
            self.pump();
        }

        fn last_ticket(&self) -> PlaybackTicket {
            self.engine.lock().unwrap().plays.last().unwrap().1
        }

        fn queue_shape(&self) -> (usize, Option<PathBuf>) {
            let photos = self
                .seq
                .queue()
                .iter()
                .filter(|e| matches!(e, MediaQueueEntry::Photo(_)))
                .count();
            let video = self.seq.queue().iter().find_map(|e| match e {
                MediaQueueEntry::Video(p) => Some(p.clone()),
                MediaQueueEntry::Photo(_) => None,
            });
            (photos, video)
        }
    }

    #[test]
    fn pages_batches_and_rotates_videos() {
        let mut h = harness(25, 2, 10);
        h.start();
        let v0 = h.videos[0].clone();
        let v1 = h.videos[1].clone();

        let mut shapes = vec![h.queue_shape()];
        for _ in 0..3 {
            let len = h.seq.queue().len();
            for _ in 0..len {
                h.finish_current();
            }
            shapes.push(h.queue_shape());
        }
        assert_eq!(
            shapes,
            vec![
                (10, Some(v0.clone())),
                (10, Some(v1)),
                (5, Some(v0.clone())),
                (10, Some(v0)),
            ]
        );
        assert_eq!(h.seq.cursor(), PlaybackCursor { index: 0, batch_index: 0 });
    }

    #[test]
    fn cursor_wraps_within_single_batch() {
        let mut h = harness(3, 0, 10);
        h.start();
        for expected in [1, 2, 0, 1] {
            h.finish_current();
            assert_eq!(h.seq.cursor().index, expected);
            assert!(h.seq.cursor().index < h.seq.queue().len());
        }
        let shown = h.shown.lock().unwrap();
        assert_eq!(shown[0], vec![h.photos[0].clone()]);
        assert_eq!(shown[3], vec![h.photos[0].clone()]);
    }

    #[test]
    fn previous_and_next_cancel_out() {
        let mut h = harness(5, 1, 10);
        h.start();
        h.finish_current();
        h.finish_current();
        assert_eq!(h.seq.cursor().index, 2);

        let now = h.tick(Duration::from_secs(1));
        assert!(h.seq.previous(now));
        assert_eq!(h.seq.cursor().index, 1);
        let now = h.tick(Duration::from_secs(1));
        assert!(h.seq.next(now));
        assert_eq!(h.seq.cursor().index, 2);
        let now = h.tick(Duration::from_secs(1));
        assert!(h.seq.next(now));
        let now = h.tick(Duration::from_secs(1));
        assert!(h.seq.previous(now));
        assert_eq!(h.seq.cursor().index, 2);
    }

    #[test]
    fn previous_from_first_entry_wraps_to_last() {
        let mut h = harness(3, 1, 10);
        h.start();
        let now = h.tick(Duration::from_secs(1));
        h.seq.previous(now);
        assert_eq!(h.seq.cursor().index, 3);
        assert_eq!(h.seq.state(), PlaybackState::ShowingVideo);
    }

    #[test]
    fn navigation_inside_debounce_window_is_dropped() {
        let mut h = harness(5, 0, 10);
        h.start();
        let now = h.tick(Duration::from_secs(1));
        assert!(h.seq.next(now));
        let now = h.tick(Duration::from_millis(100));
        assert!(!h.seq.next(now));
        assert!(!h.seq.previous(now));
        assert_eq!(h.seq.cursor().index, 1);
        let now = h.tick(Duration::from_millis(500));
        assert!(h.seq.next(now));
        assert_eq!(h.seq.cursor().index, 2);
    }

    #[test]
    fn without_videos_never_plays_video() {
        let mut h = harness(7, 0, 3);
        h.start();
        for _ in 0..30 {
            assert_ne!(h.seq.state(), PlaybackState::ShowingVideo);
            h.finish_current();
        }
        assert!(h.engine.lock().unwrap().plays.is_empty());
    }

    #[test]
    fn disabled_engine_ignores_videos() {
        let mut h = harness(2, 2, 10);
        let tiler = Arc::new(Tiler::new(
            TileSpec {
                canvas_width: 100,
                canvas_height: 60,
                border_size: 5,
                border_height: 5,
                top_offset: 5,
                background: [255, 255, 255],
            },
            DecodeErrorPolicy::Skip,
        ));
        let loader = BatchLoader::new(h.photos.clone(), 10, 100, tiler);
        h.seq = Sequencer::new(
            loader,
            h.videos.clone(),
            Box::new(PhotosThenVideo),
            None,
            Box::new(FakePresenter(Arc::clone(&h.shown))),
            SequencerSettings {
                photo_delay: PHOTO_DELAY,
                skip_delay: Duration::from_millis(100),
                key_debounce: Duration::from_millis(500),
            },
        );
        h.start();
        assert_eq!(h.seq.queue().len(), 2);
        for _ in 0..6 {
            assert_eq!(h.seq.state(), PlaybackState::ShowingPhoto);
            h.finish_current();
        }
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut h = harness(1, 1, 10);
        h.start();
        h.finish_current();
        assert_eq!(h.seq.state(), PlaybackState::ShowingVideo);
        let stale = h.last_ticket();

        let now = h.tick(Duration::from_secs(1));
        assert!(h.seq.next(now));
        assert_eq!(h.engine.lock().unwrap().stops, 1);
        assert_eq!(h.seq.cursor().index, 0);

        let now = h.tick(Duration::from_secs(1));
        assert!(!h.seq.on_player_event(PlayerEvent::Finished(stale), now));
        assert_eq!(h.seq.cursor().index, 0);
        assert_eq!(h.seq.state(), PlaybackState::ShowingPhoto);
    }

    #[test]
    fn failed_playback_still_advances() {
        let mut h = harness(1, 1, 10);
        h.start();
        h.finish_current();
        let ticket = h.last_ticket();
        let now = h.tick(Duration::from_secs(1));
        let failed = PlayerEvent::Failed {
            ticket,
            reason: "exit status: 1".to_string(),
        };
        assert!(h.seq.on_player_event(failed, now));
        assert_eq!(h.seq.state(), PlaybackState::ShowingPhoto);
    }

    #[test]
    fn missing_video_is_skipped_after_skip_delay() {
        let mut h = harness(1, 1, 10);
        std::fs::remove_file(&h.videos[0]).unwrap();
        h.start();
        h.finish_current();
        assert_eq!(h.seq.state(), PlaybackState::ShowingVideo);
        assert_eq!(h.seq.deadline(), Some(h.now + Duration::from_millis(100)));
        assert!(h.engine.lock().unwrap().plays.is_empty());

        let now = h.tick(Duration::from_millis(100));
        h.seq.on_deadline(now);
        assert_eq!(h.seq.state(), PlaybackState::ShowingPhoto);
    }

    #[test]
    fn requests_next_batch_once_past_midpoint() {
        let mut h = harness(25, 2, 10);
        h.start();
        assert!(h.seq.take_tile_jobs().is_empty());
        for _ in 0..4 {
            let now = h.tick(PHOTO_DELAY);
            h.seq.on_deadline(now);
            assert!(h.seq.take_tile_jobs().is_empty());
        }
        let now = h.tick(PHOTO_DELAY);
        h.seq.on_deadline(now);
        assert_eq!(h.seq.cursor().index, 5);
        let mut jobs = h.seq.take_tile_jobs();
        assert_eq!(jobs.len(), 1);
        let job = jobs.remove(0);
        assert_eq!(job.batch_index(), 1);

        h.seq.on_batch_tiled(job.run(), now);
        assert!(h.seq.loader().is_cached(1));
        assert_eq!(h.seq.cursor(), PlaybackCursor { index: 5, batch_index: 0 });
        let now = h.tick(PHOTO_DELAY);
        h.seq.on_deadline(now);
        assert!(h.seq.take_tile_jobs().is_empty());
    }

    #[test]
    fn start_waits_for_first_batch() {
        let mut h = harness(3, 0, 10);
        h.seq.start(h.now);
        assert!(h.seq.is_loading());
        assert_eq!(h.seq.state(), PlaybackState::Idle);
        assert_eq!(h.seq.deadline(), None);
        assert!(h.shown.lock().unwrap().is_empty());

        let mut jobs = h.seq.take_tile_jobs();
        assert_eq!(jobs.len(), 1);
        let now = h.tick(Duration::from_millis(30));
        h.seq.on_batch_tiled(jobs.remove(0).run(), now);
        assert!(!h.seq.is_loading());
        assert_eq!(h.seq.state(), PlaybackState::ShowingPhoto);
        assert_eq!(h.seq.deadline(), Some(now + PHOTO_DELAY));
        assert_eq!(h.shown.lock().unwrap().len(), 1);
    }

    #[test]
    fn rollover_waits_for_inflight_preload() {
        let mut h = harness(25, 0, 10);
        h.start();
        let preload = h.play_to_rollover();
        assert_eq!(preload.batch_index(), 1);
        assert!(h.seq.is_loading());
        assert_eq!(h.seq.cursor(), PlaybackCursor { index: 9, batch_index: 0 });
        assert_eq!(h.seq.deadline(), None);

        let now = h.tick(Duration::from_millis(10));
        h.seq.on_batch_tiled(preload.run(), now);
        assert!(!h.seq.is_loading());
        assert_eq!(h.seq.cursor(), PlaybackCursor { index: 0, batch_index: 1 });
        assert_eq!(
            h.shown.lock().unwrap().last(),
            Some(&vec![h.photos[10].clone()])
        );
    }

    #[test]
    fn previous_abandons_waiting_rollover() {
        let mut h = harness(25, 0, 10);
        h.start();
        let preload = h.play_to_rollover();

        let now = h.tick(Duration::from_secs(1));
        assert!(h.seq.previous(now));
        assert!(!h.seq.is_loading());
        assert_eq!(h.seq.cursor(), PlaybackCursor { index: 8, batch_index: 0 });

        h.seq.on_batch_tiled(preload.run(), now);
        assert!(h.seq.loader().is_cached(1));
        assert_eq!(h.seq.cursor(), PlaybackCursor { index: 8, batch_index: 0 });
    }

    #[test]
    fn pause_freezes_remaining_time() {
        let mut h = harness(2, 0, 10);
        h.start();
        let now = h.tick(Duration::from_secs(2));
        h.seq.toggle_pause(now);
        assert!(h.seq.is_paused());
        assert_eq!(h.seq.deadline(), None);

        let later = h.tick(Duration::from_secs(60));
        h.seq.on_deadline(later);
        assert_eq!(h.seq.cursor().index, 0);

        h.seq.toggle_pause(later);
        assert!(!h.seq.is_paused());
        assert_eq!(h.seq.deadline(), Some(later + Duration::from_secs(3)));
    }

    #[test]
    fn pause_reaches_running_video() {
        let mut h = harness(1, 1, 10);
        h.start();
        h.finish_current();
        let now = h.tick(Duration::from_secs(1));
        h.seq.toggle_pause(now);
        assert!(h.engine.lock().unwrap().paused);
        h.seq.toggle_pause(now);
        assert!(!h.engine.lock().unwrap().paused);
    }

    #[test]
    fn empty_library_idles_until_media_arrives() {
        let mut h = harness(0, 0, 10);
        h.start();
        assert_eq!(h.seq.state(), PlaybackState::Idle);
        assert_eq!(h.seq.deadline(), Some(h.now + PHOTO_DELAY));

        let library = MediaLibrary {
            photos: Vec::new(),
            videos: vec![h.videos_dir_file("late.mp4")],
        };
        let now = h.tick(Duration::from_secs(1));
        h.seq.on_library_changed(library, now);
        assert_eq!(h.seq.state(), PlaybackState::ShowingVideo);
        assert_eq!(h.seq.queue().len(), 1);
    }

    #[test]
    fn library_change_keeps_cursor_in_range() {
        let mut h = harness(6, 0, 10);
        h.start();
        for _ in 0..4 {
            h.finish_current();
        }
        assert_eq!(h.seq.cursor().index, 4);

        let library = MediaLibrary {
            photos: h.photos[..2].to_vec(),
            videos: Vec::new(),
        };
        let now = h.tick(Duration::from_secs(1));
        h.seq.on_library_changed(library, now);
        assert!(h.seq.is_loading());
        h.pump();
        assert_eq!(h.seq.queue().len(), 2);
        assert_eq!(h.seq.cursor(), PlaybackCursor { index: 0, batch_index: 0 });
        assert_eq!(h.seq.state(), PlaybackState::ShowingPhoto);
    }

    impl Harness {
        fn videos_dir_file(&self, name: &str) -> PathBuf {
            let path = self._dir.path().join(name);
            std::fs::write(&path, b"").unwrap();
            path
        }
    }
}
