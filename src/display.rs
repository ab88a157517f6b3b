//! Display path for annotated composites.
//!
//! The pipeline pushes composites into a bounded `DisplayQueue` without ever blocking: when the
//! queue is full the new composite is dropped and logged. A display thread drains the queue
//! into a `DisplaySink` until it sees the shutdown sentinel.
//!
//! `WindowSink` hands composites to a desktop window that owns the main thread (see
//! `crate::window`, behind the `display-window` feature). Closing that window makes the sink
//! fail, which ends the display loop.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{
    bounded, Receiver, SendTimeoutError, Sender, TryRecvError, TrySendError,
};
use image::{ImageFormat, RgbImage};
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Item carried by the display queue.
#[derive(Debug)]
pub enum DisplayMessage {
    Frame(RgbImage),
    /// Releases the display loop at shutdown.
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue full or display loop gone; the composite was discarded.
    Dropped,
}

// ----------------------------------------------------------------------------
// DisplayQueue
// ----------------------------------------------------------------------------

/// Producer side of the bounded display queue.
#[derive(Clone)]
pub struct DisplayQueue {
    tx: Sender<DisplayMessage>,
    capacity: usize,
}

/// Create a display queue holding at most `capacity` composites.
pub fn display_queue(capacity: usize) -> (DisplayQueue, Receiver<DisplayMessage>) {
    let capacity = capacity.max(1);
    let (tx, rx) = bounded(capacity);
    (DisplayQueue { tx, capacity }, rx)
}

impl DisplayQueue {
    /// Enqueue without blocking. A full queue keeps its contents and the new frame is dropped.
    pub fn try_push(&self, frame: RgbImage) -> PushOutcome {
        match self.tx.try_send(DisplayMessage::Frame(frame)) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "display queue full ({} frames), dropping composite",
                    self.capacity
                );
                PushOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("display loop gone, dropping composite");
                PushOutcome::Dropped
            }
        }
    }

    /// Push the shutdown sentinel, waiting at most `timeout` for room in the queue.
    pub fn close(&self, timeout: Duration) -> Result<()> {
        match self.tx.send_timeout(DisplayMessage::Shutdown, timeout) {
            Ok(()) | Err(SendTimeoutError::Disconnected(_)) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(anyhow!(
                "display queue still full after {:?}, shutdown sentinel not delivered",
                timeout
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ----------------------------------------------------------------------------
// Sinks
// ----------------------------------------------------------------------------

/// Consumer of rendered composites.
pub trait DisplaySink: Send {
    fn name(&self) -> &'static str;

    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// Called once after the loop ends.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards composites, counting them.
#[derive(Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl DisplaySink for NullSink {
    fn name(&self) -> &'static str {
        "null"
    }

    fn show(&mut self, _frame: &RgbImage) -> Result<()> {
        self.frames += 1;
        Ok(())
    }
}

/// Keeps the latest composite on disk as a PNG.
///
/// Writes at most once per `min_interval`; a composite skipped by the throttle is written on
/// `finish` so the file always ends up showing the last frame.
pub struct SnapshotSink {
    path: PathBuf,
    min_interval: Duration,
    last_write: Option<Instant>,
    pending: Option<RgbImage>,
    written: u64,
}

impl SnapshotSink {
    pub fn new(path: impl Into<PathBuf>, min_interval: Duration) -> Self {
        Self {
            path: path.into(),
            min_interval,
            last_write: None,
            pending: None,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let mut png = Vec::new();
        frame
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("encode snapshot png")?;
        write_atomic(&self.path, &png)
            .with_context(|| format!("write snapshot {}", self.path.display()))?;
        self.last_write = Some(Instant::now());
        self.written += 1;
        Ok(())
    }
}

impl DisplaySink for SnapshotSink {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        let due = self
            .last_write
            .map_or(true, |at| at.elapsed() >= self.min_interval);
        if !due {
            self.pending = Some(frame.clone());
            return Ok(());
        }
        self.pending = None;
        self.write(frame)
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(frame) = self.pending.take() {
            self.write(&frame)?;
        }
        Ok(())
    }
}

/// Hands composites to the window loop through a one-slot channel.
///
/// A composite arriving while the window has not yet picked up the previous one is skipped.
pub struct WindowSink {
    tx: Sender<RgbImage>,
    closer: WindowCloser,
    handed: u64,
    skipped: u64,
}

/// Window side of a `WindowSink`.
pub struct WindowFeed {
    rx: Receiver<RgbImage>,
    closer: WindowCloser,
}

/// Shared flag marking the window as closed, from either side.
#[derive(Clone, Default)]
pub struct WindowCloser(Arc<AtomicBool>);

/// What the window loop should do on its next tick.
#[derive(Debug)]
pub enum FeedState {
    Frame(RgbImage),
    Idle,
    Closed,
}

pub fn window_channel() -> (WindowSink, WindowFeed) {
    let (tx, rx) = bounded(1);
    let closer = WindowCloser::default();
    (
        WindowSink {
            tx,
            closer: closer.clone(),
            handed: 0,
            skipped: 0,
        },
        WindowFeed { rx, closer },
    )
}

impl WindowCloser {
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl WindowSink {
    pub fn handed(&self) -> u64 {
        self.handed
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl DisplaySink for WindowSink {
    fn name(&self) -> &'static str {
        "window"
    }

    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        if self.closer.is_closed() {
            return Err(anyhow!("display window closed"));
        }
        match self.tx.try_send(frame.clone()) {
            Ok(()) => self.handed += 1,
            Err(TrySendError::Full(_)) => self.skipped += 1,
            Err(TrySendError::Disconnected(_)) => return Err(anyhow!("display window gone")),
        }
        Ok(())
    }
}

impl WindowFeed {
    /// Latest composite handed over since the last call, or whether the window should close.
    pub fn poll(&self) -> FeedState {
        if self.closer.is_closed() {
            return FeedState::Closed;
        }
        let mut latest = None;
        loop {
            match self.rx.try_recv() {
                Ok(frame) => latest = Some(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if latest.is_none() {
                        return FeedState::Closed;
                    }
                    break;
                }
            }
        }
        latest.map_or(FeedState::Idle, FeedState::Frame)
    }

    /// Mark the window closed; the sink fails on its next composite.
    pub fn close(&self) {
        self.closer.close();
    }

    pub fn closer(&self) -> WindowCloser {
        self.closer.clone()
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Display loop
// ----------------------------------------------------------------------------

/// Drain `rx` into `sink` until the shutdown sentinel arrives or every producer is gone.
///
/// A sink error ends the loop. Returns the number of composites shown.
pub fn run_display(rx: Receiver<DisplayMessage>, sink: &mut dyn DisplaySink) -> Result<u64> {
    log::info!("display loop started ({} sink)", sink.name());
    let mut shown = 0u64;
    while let Ok(message) = rx.recv() {
        match message {
            DisplayMessage::Frame(frame) => {
                sink.show(&frame)
                    .with_context(|| format!("{} sink failed", sink.name()))?;
                shown += 1;
            }
            DisplayMessage::Shutdown => break,
        }
    }
    sink.finish()?;
    log::info!("display loop stopped after {} frames", shown);
    Ok(shown)
}
