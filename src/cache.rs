//! Consumer-side result cache.
//!
//! `ResultCache::poll` is called by the host once per video frame per eye and must never block
//! or fail. It does a zero-timeout readiness check on the result channel and then:
//!
//! - no message ready: returns `PupilReading::ZERO`;
//! - message ready: stores every present ellipse as that eye's last-known-good value (both
//!   eyes, not just the polled one) and returns the polled eye's last-known-good value rescaled
//!   to the host resolution, even when the message had no ellipse for that eye.
//!
//! The last-known-good value starts as the all-zero ellipse and is never cleared.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;

use crate::detect::{DetectionMessage, Ellipse};
use crate::frame::{Eye, EyePair};
use crate::protocol::decode_result_message;
use crate::transport::MessageSource;

pub const DEFAULT_TARGET_WIDTH: u32 = 400;
pub const DEFAULT_TARGET_HEIGHT: u32 = 400;

/// Pupil parameters in host coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PupilReading {
    pub center_x: f64,
    pub center_y: f64,
    pub major_axis: f64,
    pub minor_axis: f64,
    pub angle: f64,
}

impl PupilReading {
    pub const ZERO: PupilReading = PupilReading {
        center_x: 0.0,
        center_y: 0.0,
        major_axis: 0.0,
        minor_axis: 0.0,
        angle: 0.0,
    };

    /// `(center_x, center_y, major_axis, minor_axis, angle)`.
    pub fn as_tuple(&self) -> (f64, f64, f64, f64, f64) {
        (
            self.center_x,
            self.center_y,
            self.major_axis,
            self.minor_axis,
            self.angle,
        )
    }
}

/// Maps model-resolution ellipses to host resolution.
///
/// The axes are cross-mapped. The host reads the second wire axis as its major axis, scaled by
/// Y, and the first wire axis as its minor axis, scaled by X. Host plugins built against this
/// relay depend on that convention.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rescale {
    scale_x: f64,
    scale_y: f64,
}

impl Rescale {
    pub fn new(native: (u32, u32), target: (u32, u32)) -> Self {
        let ratio = |target: u32, native: u32| {
            if native == 0 {
                0.0
            } else {
                target as f64 / native as f64
            }
        };
        Self {
            scale_x: ratio(target.0, native.0),
            scale_y: ratio(target.1, native.1),
        }
    }

    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    pub fn apply(&self, ellipse: &Ellipse) -> PupilReading {
        PupilReading {
            center_x: ellipse.center.0 * self.scale_x,
            center_y: ellipse.center.1 * self.scale_y,
            major_axis: ellipse.axes.1 * self.scale_y,
            minor_axis: ellipse.axes.0 * self.scale_x,
            angle: ellipse.angle,
        }
    }
}

impl Default for Rescale {
    fn default() -> Self {
        Self::new(
            (
                crate::pipeline::DEFAULT_NATIVE_WIDTH,
                crate::pipeline::DEFAULT_NATIVE_HEIGHT,
            ),
            (DEFAULT_TARGET_WIDTH, DEFAULT_TARGET_HEIGHT),
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub polls: u64,
    pub messages: u64,
    pub decode_failures: u64,
    pub transport_errors: u64,
}

pub struct ResultCache<S> {
    source: Mutex<S>,
    last_good: EyePair<Mutex<Ellipse>>,
    rescale: Rescale,
    stats: Mutex<CacheStats>,
}

impl<S: MessageSource> ResultCache<S> {
    pub fn new(source: S, rescale: Rescale) -> Self {
        Self {
            source: Mutex::new(source),
            last_good: EyePair::from_fn(|_| Mutex::new(Ellipse::default())),
            rescale,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn rescale(&self) -> Rescale {
        self.rescale
    }

    /// Current pupil reading for `eye`. Never blocks on the network and never fails.
    pub fn poll(&self, eye: Eye) -> PupilReading {
        self.bump(|stats| stats.polls += 1);
        {
            // Slots are updated before the source is released, so messages land in arrival order.
            let mut source = lock(&self.source);
            let message = match self.try_receive(&mut source) {
                Ok(Some(message)) => message,
                Ok(None) => return PupilReading::ZERO,
                Err(err) => {
                    log::warn!("result receive failed: {:#}", err);
                    return PupilReading::ZERO;
                }
            };
            for (slot_eye, ellipse) in message.eyes.iter() {
                if let Some(ellipse) = ellipse {
                    *lock(&self.last_good[slot_eye]) = *ellipse;
                }
            }
        }
        let last_good = *lock(&self.last_good[eye]);
        self.rescale.apply(&last_good)
    }

    /// Last-known-good ellipse for `eye`, in model coordinates.
    pub fn last_known_good(&self, eye: Eye) -> Ellipse {
        *lock(&self.last_good[eye])
    }

    pub fn stats(&self) -> CacheStats {
        *lock(&self.stats)
    }

    fn try_receive(&self, source: &mut S) -> Result<Option<DetectionMessage>> {
        let ready = source.poll_readable(Duration::ZERO).inspect_err(|_| {
            self.bump(|stats| stats.transport_errors += 1);
        })?;
        if !ready {
            return Ok(None);
        }
        let parts = source.recv().inspect_err(|_| {
            self.bump(|stats| stats.transport_errors += 1);
        })?;
        match decode_result_message(&parts) {
            Ok(message) => {
                self.bump(|stats| stats.messages += 1);
                Ok(Some(message))
            }
            Err(err) => {
                self.bump(|stats| stats.decode_failures += 1);
                log::warn!("dropping undecodable result message: {:#}", err);
                Ok(None)
            }
        }
    }

    fn bump(&self, f: impl FnOnce(&mut CacheStats)) {
        f(&mut lock(&self.stats));
    }
}

// Every value behind these locks is plain data that is valid after a panic elsewhere.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
