//! Frame receive loop.
//!
//! Polls the inbound frame channel with a short timeout, decodes each stereo message, runs the
//! sequence tracker over its id and overwrites the shared `LatestPairSlot`. A frame that fails
//! to decode becomes `None` in the pair; a malformed message is skipped. Only transport errors
//! count toward the loop's error budget.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::frame::{decode_jpeg, LatestPairSlot, StereoPair};
use crate::protocol::decode_frame_message;
use crate::sequence::{SequenceEvent, SequenceTracker};
use crate::transport::MessageSource;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Well-formed messages published to the slot.
    pub received: u64,
    pub gaps: u64,
    pub restarts: u64,
    /// Individual eye frames that failed to decode.
    pub decode_failures: u64,
    /// Messages dropped because the framing itself was invalid.
    pub malformed: u64,
    pub transport_errors: u64,
}

pub struct FrameReceiver<S> {
    source: S,
    slot: Arc<LatestPairSlot>,
    tracker: SequenceTracker,
    stats: Arc<Mutex<ReceiverStats>>,
    poll_timeout: Duration,
    max_consecutive_errors: u32,
}

impl<S: MessageSource> FrameReceiver<S> {
    pub fn new(source: S, slot: Arc<LatestPairSlot>) -> Self {
        Self {
            source,
            slot,
            tracker: SequenceTracker::new(),
            stats: Arc::new(Mutex::new(ReceiverStats::default())),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max.max(1);
        self
    }

    /// Shared counters, readable from other threads while the loop runs.
    pub fn stats_handle(&self) -> Arc<Mutex<ReceiverStats>> {
        Arc::clone(&self.stats)
    }

    pub fn stats(&self) -> Result<ReceiverStats> {
        self.stats
            .lock()
            .map(|stats| *stats)
            .map_err(|_| anyhow!("receiver stats lock poisoned"))
    }

    /// Wait up to `timeout` for one message and handle it.
    ///
    /// Returns `Ok(None)` on timeout or for a malformed message, the sequence classification
    /// for a published pair, and `Err` only for transport failures.
    pub fn poll_once(&mut self, timeout: Duration) -> Result<Option<SequenceEvent>> {
        if !self.source.poll_readable(timeout)? {
            return Ok(None);
        }
        let parts = self.source.recv()?;

        let message = match decode_frame_message(parts) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("dropping malformed frame message: {:#}", err);
                self.update_stats(|stats| stats.malformed += 1)?;
                return Ok(None);
            }
        };

        let mut decode_failures = 0;
        let frames = message.payloads.map(|eye, bytes| match decode_jpeg(&bytes) {
            Ok(img) => Some(img),
            Err(err) => {
                log::warn!(
                    "frame {} {:?} eye failed to decode: {:#}",
                    message.sequence_id,
                    eye,
                    err
                );
                decode_failures += 1;
                None
            }
        });

        let event = self
            .tracker
            .observe_session(message.session, message.sequence_id);
        match event {
            SequenceEvent::Gap { expected, actual } => {
                log::warn!("lost frames: expected {}, got {}", expected, actual);
            }
            SequenceEvent::Restart { previous, session } => {
                log::info!(
                    "sender restarted with session {:016x} at id {} (previous id {})",
                    session,
                    message.sequence_id,
                    previous
                );
            }
            SequenceEvent::First | SequenceEvent::InOrder => {}
        }

        let [left, right] = frames.into_inner();
        self.slot
            .publish(StereoPair::new(message.sequence_id, left, right))?;

        self.update_stats(|stats| {
            stats.received += 1;
            stats.decode_failures += decode_failures;
            match event {
                SequenceEvent::Gap { .. } => stats.gaps += 1,
                SequenceEvent::Restart { .. } => stats.restarts += 1,
                _ => {}
            }
        })?;
        Ok(Some(event))
    }

    /// Receive until `shutdown` is set or the transport fails `max_consecutive_errors` times
    /// in a row. The latter is returned as an error; nothing restarts the loop.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        log::info!(
            "frame receiver started on {} (poll {:?})",
            self.source.name(),
            self.poll_timeout
        );
        let mut consecutive_errors = 0u32;
        while !shutdown.load(Ordering::SeqCst) {
            match self.poll_once(self.poll_timeout) {
                Ok(_) => consecutive_errors = 0,
                Err(err) => {
                    consecutive_errors += 1;
                    self.update_stats(|stats| stats.transport_errors += 1)?;
                    log::warn!(
                        "frame receive error ({}/{}): {:#}",
                        consecutive_errors,
                        self.max_consecutive_errors,
                        err
                    );
                    if consecutive_errors >= self.max_consecutive_errors {
                        log::error!(
                            "frame receiver stopping after {} consecutive transport errors",
                            consecutive_errors
                        );
                        return Err(err.context("frame receiver terminated"));
                    }
                }
            }
        }
        log::info!("frame receiver stopped");
        Ok(())
    }

    fn update_stats(&self, f: impl FnOnce(&mut ReceiverStats)) -> Result<()> {
        let mut stats = self
            .stats
            .lock()
            .map_err(|_| anyhow!("receiver stats lock poisoned"))?;
        f(&mut stats);
        Ok(())
    }
}
