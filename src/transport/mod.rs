//! Best-effort push/pull transport.
//!
//! Each direction of the relay (frames downstream, results upstream) is a one-way channel
//! carrying discrete multipart messages. The traits expose the two primitives the relay is
//! built on:
//! - a zero-timeout writability check, so senders drop instead of blocking
//! - a bounded-timeout readability check, so receive loops never wait forever
//!
//! Nothing here retries, buffers for later, or reorders. Loss is tolerated upstream.

pub mod memory;
pub mod zmq;

use anyhow::Result;
use std::time::Duration;

/// One transport message: an ordered list of binary parts.
pub type Multipart = Vec<Vec<u8>>;

/// Sending half of a one-way channel.
pub trait MessageSink: Send {
    /// Transport identifier for logs.
    fn name(&self) -> &'static str;

    /// Zero-timeout readiness check. `false` means a send right now could block.
    fn is_writable(&mut self) -> Result<bool>;

    /// Send one multipart message. Callers check `is_writable` first.
    fn send(&mut self, parts: Multipart) -> Result<()>;
}

/// Receiving half of a one-way channel.
pub trait MessageSource: Send {
    /// Transport identifier for logs.
    fn name(&self) -> &'static str;

    /// Wait up to `timeout` for a message. `Duration::ZERO` is a pure readiness check.
    fn poll_readable(&mut self, timeout: Duration) -> Result<bool>;

    /// Receive one multipart message. Callers check `poll_readable` first.
    fn recv(&mut self) -> Result<Multipart>;
}

impl<T: MessageSink + ?Sized> MessageSink for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn is_writable(&mut self) -> Result<bool> {
        (**self).is_writable()
    }

    fn send(&mut self, parts: Multipart) -> Result<()> {
        (**self).send(parts)
    }
}

impl<T: MessageSource + ?Sized> MessageSource for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn poll_readable(&mut self, timeout: Duration) -> Result<bool> {
        (**self).poll_readable(timeout)
    }

    fn recv(&mut self) -> Result<Multipart> {
        (**self).recv()
    }
}

pub use memory::{MemorySink, MemorySource};
pub use self::zmq::{ZmqPull, ZmqPush};
