//! relay_server - Pupil relay inference server
//!
//! This daemon:
//! 1. Connects a PULL socket to the capture client's frame endpoint
//! 2. Binds a PUSH socket for per-eye pupil results
//! 3. Runs the receive, processing and display threads
//! 4. Logs receiver and pipeline health every 5 seconds until Ctrl-C
//!
//! With `display.window` set (and the `display-window` feature built in) the composites are
//! shown in a desktop window on the main thread while health logging moves to its own thread.

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use pupil_relay::config::RelayConfig;
use pupil_relay::display::{window_channel, DisplaySink, NullSink, SnapshotSink, WindowFeed};
use pupil_relay::transport::{ZmqPull, ZmqPush};
use pupil_relay::{ModelRegistry, RelayHandle, RelayOptions, RelayServer};

const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = RelayConfig::load()?;
    let registry = ModelRegistry::from_settings(&cfg.model)?;
    registry.warm_up_all()?;
    let backend = registry.require_default()?;
    log::info!(
        "segmentation backend '{}' at {}x{} (available: {:?})",
        cfg.model.backend,
        cfg.model.native_width,
        cfg.model.native_height,
        registry.list()
    );

    let context = zmq::Context::new();
    let frames = ZmqPull::connect(&context, &cfg.transport.frame_endpoint)?;
    let results = ZmqPush::bind(
        &context,
        &cfg.transport.result_endpoint,
        cfg.transport.send_high_water_mark,
    )?;

    let frame_endpoint = frames.endpoint().to_string();
    let result_endpoint = results.endpoint().to_string();
    let (sink, window) = display_sink(&cfg);

    let handle = RelayServer::new(
        frames,
        results,
        backend,
        sink,
        RelayOptions::from_config(&cfg),
    )
    .spawn()?;
    log::info!(
        "relay_server running. frames from {}, results on {}",
        frame_endpoint,
        result_endpoint
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    match window {
        Some(feed) => run_with_window(handle, rx, feed),
        None => supervise(handle, rx),
    }
}

fn display_sink(cfg: &RelayConfig) -> (Box<dyn DisplaySink>, Option<WindowFeed>) {
    if cfg.display.window {
        let (sink, feed) = window_channel();
        return (Box::new(sink), Some(feed));
    }
    match &cfg.display.snapshot_path {
        Some(path) => {
            log::info!("writing composite snapshots to {}", path.display());
            let sink = SnapshotSink::new(
                path,
                Duration::from_millis(cfg.display.snapshot_interval_ms),
            );
            (Box::new(sink), None)
        }
        None => (Box::new(NullSink::new()), None),
    }
}

#[cfg(feature = "display-window")]
fn run_with_window(handle: RelayHandle, rx: Receiver<()>, feed: WindowFeed) -> Result<()> {
    let closer = feed.closer();
    let supervisor = std::thread::Builder::new()
        .name("relay-supervisor".to_string())
        .spawn(move || {
            let result = supervise(handle, rx);
            closer.close();
            result
        })?;

    pupil_relay::window::run_window(feed, "pupil relay");
    if !supervisor.is_finished() {
        log::info!("display window closed, relay keeps running until Ctrl-C");
    }
    supervisor
        .join()
        .map_err(|_| anyhow!("relay supervisor panicked"))?
}

#[cfg(not(feature = "display-window"))]
fn run_with_window(handle: RelayHandle, rx: Receiver<()>, _feed: WindowFeed) -> Result<()> {
    log::warn!("built without the display-window feature, composites are not shown");
    supervise(handle, rx)
}

fn supervise(handle: RelayHandle, rx: Receiver<()>) -> Result<()> {
    let mut receiver_failed = false;
    loop {
        match rx.recv_timeout(HEALTH_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping relay...");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let stats = handle.stats()?;
        log::info!(
            "receiver received={} gaps={} restarts={} decode_failures={} malformed={} | \
             pipeline processed={} skipped={} failures={} detections={}/{} sent={} dropped={} display_drops={}",
            stats.receiver.received,
            stats.receiver.gaps,
            stats.receiver.restarts,
            stats.receiver.decode_failures,
            stats.receiver.malformed,
            stats.pipeline.processed,
            stats.pipeline.skipped_incomplete,
            stats.pipeline.failures,
            stats.pipeline.left_detections,
            stats.pipeline.right_detections,
            stats.pipeline.results_sent,
            stats.pipeline.results_dropped,
            stats.pipeline.display_drops
        );

        if !handle.receiver_alive() {
            log::error!("frame receiver is no longer running, shutting down");
            receiver_failed = true;
            break;
        }
    }

    let abandoned = handle.stop()?;
    if !abandoned.is_empty() {
        log::warn!("abandoned threads: {:?}", abandoned);
    }
    if receiver_failed {
        return Err(anyhow!("frame receiver terminated after transport errors"));
    }
    Ok(())
}
