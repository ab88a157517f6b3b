//! Server-side relay: receive, process and display threads around one `LatestPairSlot`.
//!
//! Shutdown sets a shared flag, pushes the display sentinel and then waits a bounded time for
//! each thread. A thread that does not exit in time is detached and left to die with the
//! process.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::RelayConfig;
use crate::detect::SharedBackend;
use crate::display::{display_queue, run_display, DisplayQueue, DisplaySink};
use crate::frame::LatestPairSlot;
use crate::pipeline::{PipelineStats, ProcessingPipeline};
use crate::receiver::{FrameReceiver, ReceiverStats};
use crate::sender::ResultSender;
use crate::transport::{MessageSink, MessageSource};

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Runtime knobs for the relay threads.
#[derive(Clone, Debug)]
pub struct RelayOptions {
    pub receive_poll: Duration,
    pub max_consecutive_errors: u32,
    pub native_size: (u32, u32),
    pub display_capacity: usize,
    pub join_timeout: Duration,
}

impl RelayOptions {
    pub fn from_config(cfg: &RelayConfig) -> Self {
        Self {
            receive_poll: Duration::from_millis(cfg.transport.receive_poll_ms),
            max_consecutive_errors: cfg.transport.max_consecutive_errors,
            native_size: (cfg.model.native_width, cfg.model.native_height),
            display_capacity: cfg.display.queue_capacity,
            join_timeout: Duration::from_millis(cfg.display.join_timeout_ms),
        }
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub receiver: ReceiverStats,
    pub pipeline: PipelineStats,
}

pub struct RelayServer<Src, Snk> {
    frames: Src,
    results: Snk,
    backend: SharedBackend,
    sink: Box<dyn DisplaySink>,
    options: RelayOptions,
}

impl<Src, Snk> RelayServer<Src, Snk>
where
    Src: MessageSource + 'static,
    Snk: MessageSink + 'static,
{
    pub fn new(
        frames: Src,
        results: Snk,
        backend: SharedBackend,
        sink: Box<dyn DisplaySink>,
        options: RelayOptions,
    ) -> Self {
        Self {
            frames,
            results,
            backend,
            sink,
            options,
        }
    }

    /// Start the receive, process and display threads.
    pub fn spawn(self) -> Result<RelayHandle> {
        let options = self.options;
        let shutdown = Arc::new(AtomicBool::new(false));
        let slot = Arc::new(LatestPairSlot::new());
        let (queue, display_rx) = display_queue(options.display_capacity);

        let mut receiver = FrameReceiver::new(self.frames, Arc::clone(&slot))
            .with_poll_timeout(options.receive_poll)
            .with_max_consecutive_errors(options.max_consecutive_errors);
        let mut pipeline = ProcessingPipeline::new(
            self.backend,
            Arc::clone(&slot),
            ResultSender::new(self.results),
        )
        .with_display(queue.clone())
        .with_native_size(options.native_size.0, options.native_size.1);

        let receiver_stats = receiver.stats_handle();
        let pipeline_stats = pipeline.stats_handle();
        let mut threads = Vec::with_capacity(3);

        let mut sink = self.sink;
        threads.push(spawn_named("relay-display", move || {
            if let Err(err) = run_display(display_rx, sink.as_mut()) {
                log::error!("display loop stopped: {:#}", err);
            }
        })?);

        let pipeline_shutdown = Arc::clone(&shutdown);
        threads.push(spawn_named("relay-pipeline", move || {
            pipeline.run(&pipeline_shutdown);
        })?);

        let receiver_shutdown = Arc::clone(&shutdown);
        threads.push(spawn_named("relay-receiver", move || {
            if let Err(err) = receiver.run(&receiver_shutdown) {
                log::error!("{:#}", err);
            }
        })?);

        Ok(RelayHandle {
            shutdown,
            slot,
            display: queue,
            threads,
            receiver_stats,
            pipeline_stats,
            join_timeout: options.join_timeout,
        })
    }
}

fn spawn_named(
    name: &'static str,
    body: impl FnOnce() + Send + 'static,
) -> Result<(&'static str, JoinHandle<()>)> {
    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .with_context(|| format!("spawn {} thread", name))?;
    Ok((name, handle))
}

/// Running relay.
pub struct RelayHandle {
    shutdown: Arc<AtomicBool>,
    slot: Arc<LatestPairSlot>,
    display: DisplayQueue,
    threads: Vec<(&'static str, JoinHandle<()>)>,
    receiver_stats: Arc<Mutex<ReceiverStats>>,
    pipeline_stats: Arc<Mutex<PipelineStats>>,
    join_timeout: Duration,
}

impl RelayHandle {
    pub fn slot(&self) -> Arc<LatestPairSlot> {
        Arc::clone(&self.slot)
    }

    pub fn stats(&self) -> Result<RelayStats> {
        let receiver = *self
            .receiver_stats
            .lock()
            .map_err(|_| anyhow!("receiver stats lock poisoned"))?;
        let pipeline = *self
            .pipeline_stats
            .lock()
            .map_err(|_| anyhow!("pipeline stats lock poisoned"))?;
        Ok(RelayStats { receiver, pipeline })
    }

    /// False once the receive loop has exited, e.g. after repeated transport errors.
    pub fn receiver_alive(&self) -> bool {
        self.threads
            .iter()
            .find(|(name, _)| *name == "relay-receiver")
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Signal every loop to stop and wait for them, at most `join_timeout` per thread.
    ///
    /// Returns the names of threads that were abandoned.
    pub fn stop(self) -> Result<Vec<&'static str>> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Err(err) = self.display.close(self.join_timeout) {
            log::warn!("{:#}", err);
        }

        let mut abandoned = Vec::new();
        for (name, handle) in self.threads {
            let deadline = Instant::now() + self.join_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(JOIN_POLL);
            }
            if !handle.is_finished() {
                log::warn!(
                    "{} thread did not stop within {:?}, abandoning it",
                    name,
                    self.join_timeout
                );
                abandoned.push(name);
                continue;
            }
            if handle.join().is_err() {
                log::error!("{} thread panicked", name);
            }
        }
        log::info!("relay stopped");
        Ok(abandoned)
    }
}
