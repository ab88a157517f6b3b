//! pupil_monitor - Result consumer standing in for the host eye-tracking plugin
//!
//! Connects to the relay server's result endpoint and, at the host frame rate, polls the
//! result cache once per eye exactly as the plugin would. Each poll becomes a pupil datum that
//! is printed as one JSON line on stdout.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pupil_relay::transport::ZmqPull;
use pupil_relay::{Eye, PupilDatum, RelayConfig, Rescale, ResultCache};

#[derive(Parser, Debug)]
#[command(author, version, about = "Poll pupil results the way the host plugin does")]
struct Args {
    /// Host video frame rate; each frame polls both eyes once.
    #[arg(long, env = "PUPIL_RELAY_HOST_FPS", default_value = "30")]
    fps: u32,

    /// Stop after this many host frames (0 = run until Ctrl-C).
    #[arg(long, default_value = "0")]
    frames: u64,

    /// Only print data for polls that returned a non-zero reading.
    #[arg(long)]
    skip_empty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("--fps must be greater than zero"));
    }
    let cfg = RelayConfig::load()?;

    let context = zmq::Context::new();
    let pull = ZmqPull::connect(&context, &cfg.transport.result_endpoint)?;
    let endpoint = pull.endpoint().to_string();
    let frame_size = (cfg.host.target_width, cfg.host.target_height);
    let cache = ResultCache::new(
        pull,
        Rescale::new((cfg.model.native_width, cfg.model.native_height), frame_size),
    );

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!(
        "pupil_monitor polling {} at {} fps ({}x{} host frame)",
        endpoint,
        args.fps,
        frame_size.0,
        frame_size.1
    );

    let frame_interval = Duration::from_secs_f64(1.0 / args.fps as f64);
    let start = Instant::now();
    let stdout = std::io::stdout();
    let mut frames = 0u64;
    while running.load(Ordering::SeqCst) && (args.frames == 0 || frames < args.frames) {
        let started = Instant::now();
        let timestamp = start.elapsed().as_secs_f64();
        for eye in Eye::ALL {
            let reading = cache.poll(eye);
            if args.skip_empty && reading == pupil_relay::PupilReading::ZERO {
                continue;
            }
            let datum = PupilDatum::from_reading(eye, &reading, frame_size, timestamp);
            let mut out = stdout.lock();
            serde_json::to_writer(&mut out, &datum)?;
            writeln!(out)?;
        }
        frames += 1;

        if let Some(remaining) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    let stats = cache.stats();
    log::info!(
        "pupil_monitor stopped: polls={} messages={} decode_failures={} transport_errors={}",
        stats.polls,
        stats.messages,
        stats.decode_failures,
        stats.transport_errors
    );
    Ok(())
}
