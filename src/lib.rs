//! Pupil Relay
//!
//! Streams stereo eye-camera frames from a capture client to an inference server over a
//! best-effort push/pull transport, and streams per-eye pupil ellipses back to a consumer that
//! feeds a host eye-tracking runtime.
//!
//! # Architecture
//!
//! The relay favours freshness over completeness at every boundary:
//!
//! 1. **Non-blocking sends**: a sender that finds its channel not immediately writable drops
//!    the message instead of queueing it.
//! 2. **Loss detection only**: sequence ids are checked for gaps and restarts; nothing is
//!    retransmitted or reordered.
//! 3. **Latest-pair slot**: the receive loop overwrites a single slot; the processing loop
//!    always works on the freshest pair and skips whatever arrived in between.
//! 4. **Drop-newest queues**: the bounded display queue discards new composites when full.
//! 5. **Last-known-good**: the consumer cache answers every poll with a well-formed reading.
//!
//! # Module Structure
//!
//! - `transport`: push/pull message channels (ZeroMQ, in-memory)
//! - `frame`, `protocol`: stereo pairs, JPEG payloads, wire formats
//! - `sender`, `receiver`, `sequence`: both ends of the frame stream
//! - `detect`, `pipeline`, `display`: segmentation, ellipse fitting, visualization
//! - `window`: desktop window for composites (`display-window` feature)
//! - `cache`, `host`: consumer side
//! - `relay`: server threads
//! - `ingest`: client frame sources
//! - `config`: file + env configuration

pub mod cache;
pub mod config;
pub mod detect;
pub mod display;
pub mod frame;
pub mod host;
pub mod ingest;
pub mod pipeline;
pub mod protocol;
pub mod receiver;
pub mod relay;
pub mod sender;
pub mod sequence;
pub mod transport;
#[cfg(feature = "display-window")]
pub mod window;

pub use cache::{PupilReading, Rescale, ResultCache};
pub use config::RelayConfig;
pub use detect::{
    DetectionMessage, Ellipse, EyeDetections, ModelRegistry, SegmentationBackend, StubBackend,
    ThresholdBackend,
};
pub use display::{DisplayQueue, DisplaySink, NullSink, SnapshotSink, WindowFeed, WindowSink};
pub use frame::{Eye, EyePair, LatestPairSlot, SequenceId, SessionId, StereoPair};
pub use host::PupilDatum;
pub use ingest::{StereoSource, StillPairSource, SyntheticStereoSource};
pub use pipeline::ProcessingPipeline;
pub use receiver::FrameReceiver;
pub use relay::{RelayHandle, RelayOptions, RelayServer};
pub use sender::{FrameSender, ResultSender, SendOutcome};
pub use sequence::{SequenceEvent, SequenceTracker};
