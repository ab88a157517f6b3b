//! Stereo frame layer.
//!
//! - `StereoPair`: left/right eye images captured at the same instant, tagged with a `SequenceId`.
//! - `LatestPairSlot`: single-slot mailbox between the receive loop and the processing loop.
//!   It is overwritten on every arrival, never queued, so a slow consumer skips frames.
//! - JPEG helpers shared by both ends of the frame transport.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::ops::{Index, IndexMut};
use std::sync::Mutex;

/// Monotonic per-capture counter. Used only for loss detection.
pub type SequenceId = u64;

/// Random tag chosen once per sender run. A new value tells the receiver that sequence ids
/// start over.
pub type SessionId = u64;

// ----------------------------------------------------------------------------
// Eye indexing
// ----------------------------------------------------------------------------

/// Which eye a frame or detection belongs to. `Left` is eye 0, `Right` is eye 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const ALL: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Eye::Left),
            1 => Some(Eye::Right),
            _ => None,
        }
    }
}

/// Fixed two-slot container indexed by `Eye`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EyePair<T> {
    slots: [T; 2],
}

impl<T> EyePair<T> {
    pub fn new(left: T, right: T) -> Self {
        Self {
            slots: [left, right],
        }
    }

    pub fn from_fn(mut f: impl FnMut(Eye) -> T) -> Self {
        Self::new(f(Eye::Left), f(Eye::Right))
    }

    pub fn get(&self, eye: Eye) -> &T {
        &self.slots[eye.index()]
    }

    pub fn get_mut(&mut self, eye: Eye) -> &mut T {
        &mut self.slots[eye.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Eye, &T)> + '_ {
        Eye::ALL.into_iter().zip(self.slots.iter())
    }

    pub fn map<U>(self, mut f: impl FnMut(Eye, T) -> U) -> EyePair<U> {
        let [left, right] = self.slots;
        EyePair::new(f(Eye::Left, left), f(Eye::Right, right))
    }

    pub fn into_inner(self) -> [T; 2] {
        self.slots
    }
}

impl<T> Index<Eye> for EyePair<T> {
    type Output = T;

    fn index(&self, eye: Eye) -> &T {
        self.get(eye)
    }
}

impl<T> IndexMut<Eye> for EyePair<T> {
    fn index_mut(&mut self, eye: Eye) -> &mut T {
        self.get_mut(eye)
    }
}

// ----------------------------------------------------------------------------
// StereoPair
// ----------------------------------------------------------------------------

/// One stereo capture. A frame that failed to decode is `None`; there is no invariant
/// that both halves are present.
#[derive(Clone, Debug)]
pub struct StereoPair {
    pub sequence_id: SequenceId,
    pub frames: EyePair<Option<RgbImage>>,
}

impl StereoPair {
    pub fn new(sequence_id: SequenceId, left: Option<RgbImage>, right: Option<RgbImage>) -> Self {
        Self {
            sequence_id,
            frames: EyePair::new(left, right),
        }
    }

    /// Both eyes decoded to non-empty images.
    pub fn is_complete(&self) -> bool {
        self.frames
            .iter()
            .all(|(_, frame)| frame.as_ref().is_some_and(|img| !is_empty_image(img)))
    }

    pub fn frame(&self, eye: Eye) -> Option<&RgbImage> {
        self.frames[eye].as_ref()
    }

    /// Eyes with a decoded frame, in eye order.
    pub fn present_eyes(&self) -> Vec<Eye> {
        Eye::ALL
            .into_iter()
            .filter(|eye| self.frame(*eye).is_some())
            .collect()
    }
}

fn is_empty_image(img: &RgbImage) -> bool {
    img.width() == 0 || img.height() == 0
}

// ----------------------------------------------------------------------------
// LatestPairSlot
// ----------------------------------------------------------------------------

#[derive(Default)]
struct SlotState {
    pair: Option<StereoPair>,
    generation: u64,
}

/// Single-slot overwrite buffer holding the freshest `StereoPair`.
///
/// Every `publish` replaces the previous pair and bumps a generation counter so the reader
/// can tell a new arrival from the pair it already processed. Reads copy the pair out under
/// the lock; the slot stays valid for the next write.
#[derive(Default)]
pub struct LatestPairSlot {
    inner: Mutex<SlotState>,
}

impl LatestPairSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot. Returns the new generation.
    pub fn publish(&self, pair: StereoPair) -> Result<u64> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("latest pair slot lock poisoned"))?;
        state.pair = Some(pair);
        state.generation = state.generation.wrapping_add(1);
        Ok(state.generation)
    }

    /// Copy out the current pair with its generation.
    pub fn snapshot(&self) -> Result<Option<(u64, StereoPair)>> {
        let state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("latest pair slot lock poisoned"))?;
        Ok(state.pair.clone().map(|pair| (state.generation, pair)))
    }

    /// Copy out the current pair only if it was published after `seen_generation`.
    pub fn snapshot_if_newer(&self, seen_generation: u64) -> Result<Option<(u64, StereoPair)>> {
        let state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("latest pair slot lock poisoned"))?;
        if state.generation == seen_generation {
            return Ok(None);
        }
        Ok(state.pair.clone().map(|pair| (state.generation, pair)))
    }

    pub fn latest_sequence_id(&self) -> Result<Option<SequenceId>> {
        let state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("latest pair slot lock poisoned"))?;
        Ok(state.pair.as_ref().map(|pair| pair.sequence_id))
    }
}

// ----------------------------------------------------------------------------
// JPEG codec helpers
// ----------------------------------------------------------------------------

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Compress one eye frame for the wire.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    if is_empty_image(img) {
        return Err(anyhow!("cannot encode an empty frame"));
    }
    let mut bytes = Vec::with_capacity(jpeg_capacity_hint(img.width(), img.height()));
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    encoder.encode_image(img).context("encode jpeg")?;
    Ok(bytes)
}

// Roughly a quarter of the pixel count; widened before multiplying.
fn jpeg_capacity_hint(width: u32, height: u32) -> usize {
    width as usize * height as usize / 4
}

/// Decode one compressed eye frame.
pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(anyhow!("empty frame payload"));
    }
    let img = image::load_from_memory(bytes).context("decode jpeg")?;
    let rgb = img.into_rgb8();
    if is_empty_image(&rgb) {
        return Err(anyhow!("decoded frame has zero size"));
    }
    Ok(rgb)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    fn pair(id: SequenceId) -> StereoPair {
        StereoPair::new(id, Some(solid(8, 6, id as u8)), Some(solid(8, 6, 0)))
    }

    #[test]
    fn slot_keeps_only_the_latest_pair() {
        let slot = LatestPairSlot::new();
        for id in 0..5 {
            slot.publish(pair(id)).unwrap();
        }
        let (generation, latest) = slot.snapshot().unwrap().expect("pair present");
        assert_eq!(generation, 5);
        assert_eq!(latest.sequence_id, 4);
        assert_eq!(latest.frame(Eye::Left).unwrap().get_pixel(0, 0), &Rgb([4, 4, 4]));
    }

    #[test]
    fn snapshot_leaves_slot_readable() {
        let slot = LatestPairSlot::new();
        slot.publish(pair(7)).unwrap();
        assert!(slot.snapshot().unwrap().is_some());
        assert_eq!(slot.latest_sequence_id().unwrap(), Some(7));
    }

    #[test]
    fn snapshot_if_newer_skips_seen_generation() {
        let slot = LatestPairSlot::new();
        assert!(slot.snapshot_if_newer(0).unwrap().is_none());

        let generation = slot.publish(pair(1)).unwrap();
        assert!(slot.snapshot_if_newer(0).unwrap().is_some());
        assert!(slot.snapshot_if_newer(generation).unwrap().is_none());

        slot.publish(pair(2)).unwrap();
        let (_, fresh) = slot.snapshot_if_newer(generation).unwrap().unwrap();
        assert_eq!(fresh.sequence_id, 2);
    }

    #[test]
    fn incomplete_pairs_are_detected() {
        assert!(pair(1).is_complete());
        assert!(!StereoPair::new(1, None, Some(solid(4, 4, 0))).is_complete());
        assert!(!StereoPair::new(1, Some(RgbImage::new(0, 0)), Some(solid(4, 4, 0))).is_complete());
    }

    #[test]
    fn present_eyes_lists_decoded_halves() {
        assert_eq!(pair(1).present_eyes(), vec![Eye::Left, Eye::Right]);
        assert_eq!(
            StereoPair::new(1, None, Some(solid(4, 4, 0))).present_eyes(),
            vec![Eye::Right]
        );
        assert!(StereoPair::new(1, None, None).present_eyes().is_empty());
    }

    #[test]
    fn capacity_hint_does_not_overflow_u32() {
        assert_eq!(jpeg_capacity_hint(640, 480), 76_800);
        assert_eq!(
            jpeg_capacity_hint(70_000, 70_000),
            70_000usize * 70_000 / 4
        );
    }

    #[test]
    fn jpeg_preserves_dimensions() {
        let frame = solid(64, 48, 120);
        let bytes = encode_jpeg(&frame, DEFAULT_JPEG_QUALITY).unwrap();
        let decoded = decode_jpeg(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_jpeg(b"").is_err());
        assert!(decode_jpeg(b"not a jpeg").is_err());
    }

    #[test]
    fn eye_pair_indexes_by_eye() {
        let mut eyes = EyePair::new(1, 2);
        eyes[Eye::Right] += 10;
        assert_eq!(eyes[Eye::Left], 1);
        assert_eq!(eyes[Eye::Right], 12);
        assert_eq!(Eye::from_index(1), Some(Eye::Right));
        assert_eq!(Eye::from_index(2), None);
    }
}
