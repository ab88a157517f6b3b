//! ZeroMQ PUSH/PULL transport.
//!
//! The producing side of each direction binds a PUSH socket; the consuming side connects a
//! PULL socket. A PUSH socket with no connected peer, or with a full send queue, does not
//! report POLLOUT, which is exactly the "not writable, drop it" signal the senders need.

use anyhow::{Context, Result};
use std::time::Duration;

use super::{MessageSink, MessageSource, Multipart};

/// PUSH socket bound on a local endpoint.
pub struct ZmqPush {
    socket: zmq::Socket,
    endpoint: String,
}

impl ZmqPush {
    /// Bind a PUSH socket. `send_hwm` caps messages queued per peer before POLLOUT clears.
    pub fn bind(context: &zmq::Context, endpoint: &str, send_hwm: i32) -> Result<Self> {
        let socket = context
            .socket(zmq::PUSH)
            .context("create PUSH socket")?;
        socket.set_linger(0).context("set PUSH linger")?;
        socket.set_sndhwm(send_hwm).context("set PUSH send hwm")?;
        socket
            .bind(endpoint)
            .with_context(|| format!("bind PUSH socket on {}", endpoint))?;
        log::info!("push socket bound on {}", endpoint);
        Ok(Self {
            socket,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl MessageSink for ZmqPush {
    fn name(&self) -> &'static str {
        "zmq-push"
    }

    fn is_writable(&mut self) -> Result<bool> {
        let mut items = [self.socket.as_poll_item(zmq::POLLOUT)];
        zmq::poll(&mut items, 0).context("poll PUSH socket")?;
        Ok(items[0].is_writable())
    }

    fn send(&mut self, parts: Multipart) -> Result<()> {
        self.socket
            .send_multipart(parts, zmq::DONTWAIT)
            .with_context(|| format!("send multipart on {}", self.endpoint))
    }
}

/// PULL socket connected to a remote PUSH endpoint.
pub struct ZmqPull {
    socket: zmq::Socket,
    endpoint: String,
}

impl ZmqPull {
    pub fn connect(context: &zmq::Context, endpoint: &str) -> Result<Self> {
        let socket = context
            .socket(zmq::PULL)
            .context("create PULL socket")?;
        socket.set_linger(0).context("set PULL linger")?;
        socket
            .connect(endpoint)
            .with_context(|| format!("connect PULL socket to {}", endpoint))?;
        log::info!("pull socket connected to {}", endpoint);
        Ok(Self {
            socket,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl MessageSource for ZmqPull {
    fn name(&self) -> &'static str {
        "zmq-pull"
    }

    fn poll_readable(&mut self, timeout: Duration) -> Result<bool> {
        let mut items = [self.socket.as_poll_item(zmq::POLLIN)];
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        zmq::poll(&mut items, timeout_ms).context("poll PULL socket")?;
        Ok(items[0].is_readable())
    }

    fn recv(&mut self) -> Result<Multipart> {
        self.socket
            .recv_multipart(zmq::DONTWAIT)
            .with_context(|| format!("receive multipart on {}", self.endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconnected_push_is_not_writable() {
        let context = zmq::Context::new();
        let mut push = ZmqPush::bind(&context, "inproc://unconnected-push", 10).unwrap();
        assert!(!push.is_writable().unwrap());
    }

    #[test]
    fn inproc_multipart_round_trip() {
        let context = zmq::Context::new();
        let mut push = ZmqPush::bind(&context, "inproc://relay-frames", 10).unwrap();
        let mut pull = ZmqPull::connect(&context, "inproc://relay-frames").unwrap();
        assert_eq!(push.endpoint(), "inproc://relay-frames");
        assert_eq!(pull.endpoint(), push.endpoint());

        assert!(push.is_writable().unwrap());
        push.send(vec![b"7".to_vec(), vec![1, 2], vec![3]]).unwrap();

        assert!(pull.poll_readable(Duration::from_millis(500)).unwrap());
        let parts = pull.recv().unwrap();
        assert_eq!(parts, vec![b"7".to_vec(), vec![1, 2], vec![3]]);
        assert!(!pull.poll_readable(Duration::ZERO).unwrap());
    }
}
