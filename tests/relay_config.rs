use std::sync::Mutex;

use tempfile::NamedTempFile;

use pupil_relay::config::RelayConfig;
use pupil_relay::{cache, detect, display, frame, pipeline, receiver};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PUPIL_RELAY_CONFIG",
        "PUPIL_RELAY_FRAME_ENDPOINT",
        "PUPIL_RELAY_RESULT_ENDPOINT",
        "PUPIL_RELAY_BACKEND",
        "PUPIL_RELAY_ONNX_PATH",
        "PUPIL_RELAY_SNAPSHOT_PATH",
        "PUPIL_RELAY_THRESHOLD",
        "PUPIL_RELAY_WINDOW",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RelayConfig::load().expect("load config");

    assert_eq!(cfg.transport.frame_endpoint, "tcp://127.0.0.1:5555");
    assert_eq!(cfg.transport.result_endpoint, "tcp://127.0.0.1:5550");
    assert_eq!(cfg.transport.receive_poll_ms, 100);
    assert_eq!(cfg.transport.max_consecutive_errors, 3);
    assert_eq!(cfg.model.backend, "threshold");
    assert_eq!((cfg.model.native_width, cfg.model.native_height), (320, 240));
    assert_eq!((cfg.host.target_width, cfg.host.target_height), (400, 400));
    assert_eq!(cfg.display.queue_capacity, 10);
    assert!(cfg.display.snapshot_path.is_none());
    assert!(!cfg.display.window);
    assert_eq!(cfg.sender.jpeg_quality, 95);
}

#[test]
fn defaults_follow_the_module_constants() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RelayConfig::default();

    assert_eq!(
        (cfg.model.native_width, cfg.model.native_height),
        (pipeline::DEFAULT_NATIVE_WIDTH, pipeline::DEFAULT_NATIVE_HEIGHT)
    );
    assert_eq!(
        (cfg.host.target_width, cfg.host.target_height),
        (cache::DEFAULT_TARGET_WIDTH, cache::DEFAULT_TARGET_HEIGHT)
    );
    assert_eq!(cfg.display.queue_capacity, display::DEFAULT_QUEUE_CAPACITY);
    assert_eq!(cfg.sender.jpeg_quality, frame::DEFAULT_JPEG_QUALITY);
    assert_eq!(
        cfg.transport.receive_poll_ms,
        receiver::DEFAULT_POLL_TIMEOUT.as_millis() as u64
    );
    assert_eq!(
        cfg.transport.max_consecutive_errors,
        receiver::DEFAULT_MAX_CONSECUTIVE_ERRORS
    );
    assert_eq!(cfg.model.threshold, detect::DEFAULT_DARK_THRESHOLD);
}

#[test]
fn window_flag_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PUPIL_RELAY_WINDOW", "sometimes");
    assert!(RelayConfig::load().is_err());

    std::env::set_var("PUPIL_RELAY_WINDOW", "0");
    assert!(!RelayConfig::load().expect("load config").display.window);

    std::env::set_var("PUPIL_RELAY_WINDOW", "true");
    let loaded = RelayConfig::load();
    if cfg!(feature = "display-window") {
        assert!(loaded.expect("load config").display.window);
    } else {
        assert!(loaded.is_err(), "window accepted without the display-window feature");
    }

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "transport": {
                "frame_endpoint": "tcp://10.0.0.2:6000",
                "receive_poll_ms": 50
            },
            "model": {
                "backend": "stub",
                "native_width": 160,
                "native_height": 120
            },
            "display": { "queue_capacity": 4 },
            "host": { "target_width": 192, "target_height": 192 },
            "sender": { "jpeg_quality": 80 }
        }"#,
    );

    std::env::set_var("PUPIL_RELAY_CONFIG", file.path());
    std::env::set_var("PUPIL_RELAY_RESULT_ENDPOINT", "tcp://0.0.0.0:7000");
    std::env::set_var("PUPIL_RELAY_SNAPSHOT_PATH", "/tmp/relay.png");
    std::env::set_var("PUPIL_RELAY_BACKEND", "Threshold");

    let cfg = RelayConfig::load().expect("load config");

    assert_eq!(cfg.transport.frame_endpoint, "tcp://10.0.0.2:6000");
    assert_eq!(cfg.transport.result_endpoint, "tcp://0.0.0.0:7000");
    assert_eq!(cfg.transport.receive_poll_ms, 50);
    assert_eq!(cfg.model.backend, "threshold");
    assert_eq!((cfg.model.native_width, cfg.model.native_height), (160, 120));
    assert_eq!(cfg.display.queue_capacity, 4);
    assert_eq!(
        cfg.display.snapshot_path.as_deref(),
        Some(std::path::Path::new("/tmp/relay.png"))
    );
    assert_eq!(cfg.host.target_width, 192);
    assert_eq!(cfg.sender.jpeg_quality, 80);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for json in [
        r#"{ "model": { "native_width": 0 } }"#,
        r#"{ "display": { "queue_capacity": 0 } }"#,
        r#"{ "sender": { "jpeg_quality": 0 } }"#,
        r#"{ "transport": { "frame_endpoint": "  " } }"#,
        r#"{ "transport": { "max_consecutive_errors": 0 } }"#,
    ] {
        let file = write_config(json);
        std::env::set_var("PUPIL_RELAY_CONFIG", file.path());
        assert!(RelayConfig::load().is_err(), "accepted {}", json);
    }

    clear_env();
}

#[test]
fn rejects_malformed_file_and_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config("{ not json");
    std::env::set_var("PUPIL_RELAY_CONFIG", file.path());
    assert!(RelayConfig::load().is_err());

    clear_env();
    std::env::set_var("PUPIL_RELAY_THRESHOLD", "dark");
    assert!(RelayConfig::load().is_err());

    clear_env();
}
