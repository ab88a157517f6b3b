//! frame_sender - Stereo eye-camera capture client
//!
//! Binds the frame PUSH endpoint and streams left/right pairs tagged with a sequence id. A pair
//! that cannot be sent immediately is dropped; its id is still consumed so the server sees the
//! gap.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pupil_relay::ingest::{StereoSource, SyntheticConfig};
use pupil_relay::transport::ZmqPush;
use pupil_relay::{Eye, FrameSender, RelayConfig, StillPairSource, SyntheticStereoSource};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream stereo eye frames to a pupil relay server")]
struct Args {
    /// Capture rate in pairs per second.
    #[arg(long, env = "PUPIL_RELAY_FPS", default_value = "30")]
    fps: u32,

    /// Stop after this many pairs (0 = run until Ctrl-C).
    #[arg(long, default_value = "0")]
    count: u64,

    /// Left-eye image to repeat instead of the synthetic generator.
    #[arg(long, requires = "right")]
    left: Option<PathBuf>,

    /// Right-eye image to repeat instead of the synthetic generator.
    #[arg(long, requires = "left")]
    right: Option<PathBuf>,

    /// Seed for the synthetic generator.
    #[arg(long, default_value = "7")]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("--fps must be greater than zero"));
    }
    let cfg = RelayConfig::load()?;

    let mut source: Box<dyn StereoSource> = match (&args.left, &args.right) {
        (Some(left), Some(right)) => Box::new(StillPairSource::open(left, right)?),
        _ => Box::new(SyntheticStereoSource::new(SyntheticConfig {
            seed: args.seed,
            ..SyntheticConfig::default()
        })),
    };
    source.connect()?;

    let context = zmq::Context::new();
    let push = ZmqPush::bind(
        &context,
        &cfg.transport.frame_endpoint,
        cfg.transport.send_high_water_mark,
    )?;
    let endpoint = push.endpoint().to_string();
    let mut sender = FrameSender::new(push, cfg.sender.jpeg_quality);

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let frame_interval = Duration::from_secs_f64(1.0 / args.fps as f64);
    let mut sequence_id = 0u64;
    let mut last_health_log = Instant::now();
    log::info!(
        "frame_sender streaming {} at {} fps to {} (session {:016x})",
        source.stats().description,
        args.fps,
        endpoint,
        sender.session()
    );

    while running.load(Ordering::SeqCst) && (args.count == 0 || sequence_id < args.count) {
        let started = Instant::now();
        let pair = source.next_pair()?;
        sender.send(&pair[Eye::Left], &pair[Eye::Right], sequence_id);
        sequence_id = sequence_id.wrapping_add(1);

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = sender.stats();
            log::info!(
                "captured={} sent={} not_ready={} failed={}",
                source.stats().pairs_captured,
                stats.sent,
                stats.not_ready,
                stats.failed
            );
            last_health_log = Instant::now();
        }

        if let Some(remaining) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    let stats = sender.stats();
    log::info!(
        "frame_sender stopped after {} pairs: sent={} not_ready={} failed={}",
        sequence_id,
        stats.sent,
        stats.not_ready,
        stats.failed
    );
    Ok(())
}
