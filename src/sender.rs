//! Non-blocking senders for both relay directions.
//!
//! Both senders follow the same rule: check writability with a zero-timeout poll and drop the
//! message if the channel is not immediately writable. Nothing is buffered for a later retry,
//! and no error escapes `send`; failures are logged and counted.

use anyhow::Result;
use image::RgbImage;

use crate::detect::{DetectionMessage, EyeDetections};
use crate::frame::{encode_jpeg, SequenceId, SessionId};
use crate::protocol::{encode_result_message, encode_session_frame_message};
use crate::transport::{MessageSink, Multipart};

/// What happened to one `send` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Channel was not writable; the message was dropped.
    NotReady,
    /// Encoding or the transport write failed; the message was dropped.
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendStats {
    pub sent: u64,
    pub not_ready: u64,
    pub failed: u64,
}

struct Publisher<S> {
    sink: S,
    label: &'static str,
    stats: SendStats,
}

impl<S: MessageSink> Publisher<S> {
    fn new(sink: S, label: &'static str) -> Self {
        Self {
            sink,
            label,
            stats: SendStats::default(),
        }
    }

    fn publish(
        &mut self,
        sequence_id: SequenceId,
        build: impl FnOnce() -> Result<Multipart>,
    ) -> SendOutcome {
        let outcome = match self.try_publish(build) {
            Ok(true) => SendOutcome::Sent,
            Ok(false) => {
                log::debug!(
                    "{}: {} not ready, dropped id {}",
                    self.label,
                    self.sink.name(),
                    sequence_id
                );
                SendOutcome::NotReady
            }
            Err(err) => {
                log::warn!("{}: send failed for id {}: {:#}", self.label, sequence_id, err);
                SendOutcome::Failed
            }
        };
        match outcome {
            SendOutcome::Sent => self.stats.sent += 1,
            SendOutcome::NotReady => self.stats.not_ready += 1,
            SendOutcome::Failed => self.stats.failed += 1,
        }
        outcome
    }

    fn try_publish(&mut self, build: impl FnOnce() -> Result<Multipart>) -> Result<bool> {
        if !self.sink.is_writable()? {
            return Ok(false);
        }
        let parts = build()?;
        self.sink.send(parts)?;
        Ok(true)
    }
}

// ----------------------------------------------------------------------------
// FrameSender
// ----------------------------------------------------------------------------

/// Client-side sender of stereo pairs.
///
/// Every message carries the sender's session id, drawn at random on construction, so a
/// receiver can tell a restarted sender from lost frames.
pub struct FrameSender<S> {
    publisher: Publisher<S>,
    jpeg_quality: u8,
    session: SessionId,
}

impl<S: MessageSink> FrameSender<S> {
    pub fn new(sink: S, jpeg_quality: u8) -> Self {
        Self {
            publisher: Publisher::new(sink, "frame sender"),
            jpeg_quality,
            session: rand::random(),
        }
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Compress both eyes and push `[id, left, right, session]`, or drop the pair if the
    /// channel is busy.
    pub fn send(&mut self, left: &RgbImage, right: &RgbImage, sequence_id: SequenceId) -> SendOutcome {
        let quality = self.jpeg_quality;
        let session = self.session;
        self.publisher.publish(sequence_id, || {
            let left = encode_jpeg(left, quality)?;
            let right = encode_jpeg(right, quality)?;
            Ok(encode_session_frame_message(session, sequence_id, left, right))
        })
    }

    pub fn stats(&self) -> SendStats {
        self.publisher.stats
    }
}

// ----------------------------------------------------------------------------
// ResultSender
// ----------------------------------------------------------------------------

/// Server-side sender of per-eye detections.
pub struct ResultSender<S> {
    publisher: Publisher<S>,
}

impl<S: MessageSink> ResultSender<S> {
    pub fn new(sink: S) -> Self {
        Self {
            publisher: Publisher::new(sink, "result sender"),
        }
    }

    pub fn send(&mut self, eyes: &EyeDetections, sequence_id: SequenceId) -> SendOutcome {
        let message = DetectionMessage::new(sequence_id, *eyes);
        self.publisher
            .publish(sequence_id, || encode_result_message(&message))
    }

    pub fn stats(&self) -> SendStats {
        self.publisher.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Ellipse;
    use crate::frame::EyePair;
    use crate::protocol::{decode_frame_message, decode_result_message};
    use crate::transport::memory;
    use crate::transport::MessageSource;
    use image::Rgb;
    use std::time::Duration;

    fn frame() -> RgbImage {
        RgbImage::from_pixel(16, 12, Rgb([90, 90, 90]))
    }

    #[test]
    fn frame_sender_tags_pairs_with_its_session() {
        let (sink, mut source) = memory::channel(4);
        let mut sender = FrameSender::new(sink, 90).with_session(0xfeed);
        assert_eq!(sender.session(), 0xfeed);
        assert_eq!(sender.send(&frame(), &frame(), 3), SendOutcome::Sent);

        assert!(source.poll_readable(Duration::ZERO).unwrap());
        let message = decode_frame_message(source.recv().unwrap()).unwrap();
        assert_eq!(message.sequence_id, 3);
        assert_eq!(message.session, Some(0xfeed));
        assert!(!message.payloads.get(crate::frame::Eye::Left).is_empty());
    }

    #[test]
    fn busy_channel_drops_instead_of_blocking() {
        let (sink, _source) = memory::channel(1);
        let mut sender = FrameSender::new(sink, 90);
        assert_eq!(sender.send(&frame(), &frame(), 0), SendOutcome::Sent);
        assert_eq!(sender.send(&frame(), &frame(), 1), SendOutcome::NotReady);
        assert_eq!(
            sender.stats(),
            SendStats {
                sent: 1,
                not_ready: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn encode_failure_is_counted_not_raised() {
        let (sink, _source) = memory::channel(4);
        let mut sender = FrameSender::new(sink, 90);
        let empty = RgbImage::new(0, 0);
        assert_eq!(sender.send(&empty, &frame(), 0), SendOutcome::Failed);
        assert_eq!(sender.stats().failed, 1);
    }

    #[test]
    fn disconnected_channel_is_a_failure() {
        let (sink, source) = memory::channel(4);
        drop(source);
        let mut sender = ResultSender::new(sink);
        let eyes = EyePair::new(None, None);
        assert_eq!(sender.send(&eyes, 1), SendOutcome::Failed);
    }

    #[test]
    fn result_sender_serializes_both_eyes() {
        let (sink, mut source) = memory::channel(4);
        let mut sender = ResultSender::new(sink);
        let eyes = EyePair::new(None, Some(Ellipse::new((5.0, 6.0), (8.0, 4.0), 90.0)));
        assert_eq!(sender.send(&eyes, 12), SendOutcome::Sent);

        assert!(source.poll_readable(Duration::ZERO).unwrap());
        let message = decode_result_message(&source.recv().unwrap()).unwrap();
        assert_eq!(message.sequence_id, 12);
        assert_eq!(message.eyes, eyes);
    }
}
