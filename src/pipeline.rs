//! Processing loop: latest pair -> segmentation -> ellipses -> result sender + display.
//!
//! The loop copies the freshest pair out of the `LatestPairSlot` and handles each published
//! generation once. Frames the receiver delivered while a pair was being processed are skipped.
//! A failure inside one iteration is logged and the loop moves on to the next pair.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::detect::{largest_ellipse, outline_points, Ellipse, EyeDetections, SharedBackend};
use crate::display::{DisplayQueue, PushOutcome};
use crate::frame::{Eye, EyePair, LatestPairSlot, SequenceId, StereoPair};
use crate::sender::{ResultSender, SendOutcome};
use crate::transport::MessageSink;

pub const DEFAULT_NATIVE_WIDTH: u32 = 320;
pub const DEFAULT_NATIVE_HEIGHT: u32 = 240;

const IDLE_SLEEP: Duration = Duration::from_millis(5);
const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const OUTLINE_SEGMENTS: usize = 72;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub processed: u64,
    pub skipped_incomplete: u64,
    pub failures: u64,
    pub left_detections: u64,
    pub right_detections: u64,
    pub results_sent: u64,
    pub results_dropped: u64,
    pub display_drops: u64,
}

/// Everything derived from one stereo pair.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub sequence_id: SequenceId,
    pub detections: EyeDetections,
    /// Per eye `resized | mask | outline`, left eye on top.
    pub composite: RgbImage,
}

/// Result of one `step`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing new in the slot.
    Idle,
    /// A new pair arrived but one eye was missing.
    Skipped(SequenceId),
    Processed(SequenceId),
}

pub struct ProcessingPipeline<S> {
    backend: SharedBackend,
    slot: Arc<LatestPairSlot>,
    results: ResultSender<S>,
    display: Option<DisplayQueue>,
    native_size: (u32, u32),
    seen_generation: u64,
    stats: Arc<Mutex<PipelineStats>>,
}

impl<S: MessageSink> ProcessingPipeline<S> {
    pub fn new(backend: SharedBackend, slot: Arc<LatestPairSlot>, results: ResultSender<S>) -> Self {
        Self {
            backend,
            slot,
            results,
            display: None,
            native_size: (DEFAULT_NATIVE_WIDTH, DEFAULT_NATIVE_HEIGHT),
            seen_generation: 0,
            stats: Arc::new(Mutex::new(PipelineStats::default())),
        }
    }

    pub fn with_display(mut self, display: DisplayQueue) -> Self {
        self.display = Some(display);
        self
    }

    /// Working resolution of the segmentation backend.
    pub fn with_native_size(mut self, width: u32, height: u32) -> Self {
        self.native_size = (width, height);
        self
    }

    pub fn stats_handle(&self) -> Arc<Mutex<PipelineStats>> {
        Arc::clone(&self.stats)
    }

    pub fn stats(&self) -> Result<PipelineStats> {
        self.stats
            .lock()
            .map(|stats| *stats)
            .map_err(|_| anyhow!("pipeline stats lock poisoned"))
    }

    /// Segment both eyes of a complete pair and fit one ellipse per eye.
    pub fn process_pair(&self, pair: &StereoPair) -> Result<PipelineOutput> {
        let (width, height) = self.native_size;
        let resized = EyePair::from_fn(|eye| {
            pair.frame(eye)
                .map(|frame| imageops::resize(frame, width, height, FilterType::Triangle))
        });
        let [Some(left), Some(right)] = resized.into_inner() else {
            return Err(anyhow!(
                "pair {} is missing an eye frame",
                pair.sequence_id
            ));
        };
        let batch = [left, right];

        let masks = {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| anyhow!("segmentation backend lock poisoned"))?;
            backend.predict(&batch)?
        };
        let [left_mask, right_mask]: [GrayImage; 2] = masks
            .try_into()
            .map_err(|masks: Vec<GrayImage>| {
                anyhow!("backend returned {} masks for a batch of 2", masks.len())
            })?;
        let masks = EyePair::new(left_mask, right_mask);
        for (eye, mask) in masks.iter() {
            if mask.dimensions() != (width, height) {
                return Err(anyhow!(
                    "{:?} mask is {:?}, expected {}x{}",
                    eye,
                    mask.dimensions(),
                    width,
                    height
                ));
            }
        }

        let detections = EyePair::from_fn(|eye| largest_ellipse(&masks[eye]));
        let [left, right] = batch;
        let frames = EyePair::new(left, right);
        let composite = compose(&frames, &masks, &detections);

        Ok(PipelineOutput {
            sequence_id: pair.sequence_id,
            detections,
            composite,
        })
    }

    /// Handle the slot's current pair if it has not been handled yet.
    pub fn step(&mut self) -> Result<StepOutcome> {
        let Some((generation, pair)) = self.slot.snapshot_if_newer(self.seen_generation)? else {
            return Ok(StepOutcome::Idle);
        };
        // Marked before processing so a pair that fails is not retried.
        self.seen_generation = generation;

        if !pair.is_complete() {
            log::debug!(
                "skipping pair {}: only {:?} present",
                pair.sequence_id,
                pair.present_eyes()
            );
            self.update_stats(|stats| stats.skipped_incomplete += 1)?;
            return Ok(StepOutcome::Skipped(pair.sequence_id));
        }

        let output = self.process_pair(&pair)?;
        let sent = self.results.send(&output.detections, output.sequence_id);
        let displayed = self
            .display
            .as_ref()
            .map(|queue| queue.try_push(output.composite));

        let detections = output.detections;
        self.update_stats(|stats| {
            stats.processed += 1;
            if detections[Eye::Left].is_some() {
                stats.left_detections += 1;
            }
            if detections[Eye::Right].is_some() {
                stats.right_detections += 1;
            }
            match sent {
                SendOutcome::Sent => stats.results_sent += 1,
                SendOutcome::NotReady | SendOutcome::Failed => stats.results_dropped += 1,
            }
            if displayed == Some(PushOutcome::Dropped) {
                stats.display_drops += 1;
            }
        })?;
        Ok(StepOutcome::Processed(output.sequence_id))
    }

    /// Step until `shutdown` is set. Per-iteration errors are logged and never end the loop.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        log::info!(
            "processing pipeline started ({}x{})",
            self.native_size.0,
            self.native_size.1
        );
        while !shutdown.load(Ordering::SeqCst) {
            match self.step() {
                Ok(StepOutcome::Idle) => std::thread::sleep(IDLE_SLEEP),
                Ok(_) => {}
                Err(err) => {
                    log::error!("pipeline iteration failed: {:#}", err);
                    if let Err(stats_err) = self.update_stats(|stats| stats.failures += 1) {
                        log::error!("{:#}", stats_err);
                    }
                    std::thread::sleep(IDLE_SLEEP);
                }
            }
        }
        log::info!("processing pipeline stopped");
    }

    fn update_stats(&self, f: impl FnOnce(&mut PipelineStats)) -> Result<()> {
        let mut stats = self
            .stats
            .lock()
            .map_err(|_| anyhow!("pipeline stats lock poisoned"))?;
        f(&mut stats);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Composite
// ----------------------------------------------------------------------------

fn compose(
    frames: &EyePair<RgbImage>,
    masks: &EyePair<GrayImage>,
    detections: &EyeDetections,
) -> RgbImage {
    let (width, height) = frames[Eye::Left].dimensions();
    let mut canvas = RgbImage::new(width * 3, height * 2);
    for eye in Eye::ALL {
        let y = (eye.index() as u32 * height) as i64;
        let frame = &frames[eye];
        let mask = DynamicImage::ImageLuma8(masks[eye].clone()).to_rgb8();
        let mut annotated = frame.clone();
        if let Some(ellipse) = &detections[eye] {
            draw_outline(&mut annotated, ellipse);
        }
        imageops::replace(&mut canvas, frame, 0, y);
        imageops::replace(&mut canvas, &mask, width as i64, y);
        imageops::replace(&mut canvas, &annotated, 2 * width as i64, y);
    }
    canvas
}

fn draw_outline(image: &mut RgbImage, ellipse: &Ellipse) {
    let points = outline_points(ellipse, OUTLINE_SEGMENTS);
    for segment in points.windows(2) {
        let (start, end) = (segment[0], segment[1]);
        // Two pixels wide.
        draw_line_segment_mut(image, start, end, OUTLINE_COLOR);
        draw_line_segment_mut(
            image,
            (start.0 + 1.0, start.1),
            (end.0 + 1.0, end.1),
            OUTLINE_COLOR,
        );
    }
}
