//! In-process transport with the same try semantics as the socket transport.
//!
//! A bounded channel stands in for the socket's send high-water mark: a full channel is
//! "not writable". Used by tests and by callers embedding the relay in one process.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::time::Duration;

use super::{MessageSink, MessageSource, Multipart};

/// Create a connected sink/source pair holding at most `capacity` in-flight messages.
pub fn channel(capacity: usize) -> (MemorySink, MemorySource) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        MemorySink { tx },
        MemorySource {
            rx,
            pending: None,
        },
    )
}

/// Clones feed the same channel, like several senders connected to one socket.
#[derive(Clone)]
pub struct MemorySink {
    tx: Sender<Multipart>,
}

impl MessageSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_writable(&mut self) -> Result<bool> {
        Ok(!self.tx.is_full())
    }

    fn send(&mut self, parts: Multipart) -> Result<()> {
        match self.tx.try_send(parts) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(anyhow!("memory channel full")),
            Err(TrySendError::Disconnected(_)) => Err(anyhow!("memory channel disconnected")),
        }
    }
}

pub struct MemorySource {
    rx: Receiver<Multipart>,
    // A message pulled by `poll_readable` that `recv` has not handed out yet.
    pending: Option<Multipart>,
}

impl MessageSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn poll_readable(&mut self, timeout: Duration) -> Result<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }
        let received = if timeout.is_zero() {
            match self.rx.try_recv() {
                Ok(parts) => Some(parts),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    return Err(anyhow!("memory channel disconnected"))
                }
            }
        } else {
            match self.rx.recv_timeout(timeout) {
                Ok(parts) => Some(parts),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("memory channel disconnected"))
                }
            }
        };
        self.pending = received;
        Ok(self.pending.is_some())
    }

    fn recv(&mut self) -> Result<Multipart> {
        if let Some(parts) = self.pending.take() {
            return Ok(parts);
        }
        self.rx
            .try_recv()
            .map_err(|e| anyhow!("memory channel receive failed: {}", e))
    }
}
