use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use dot_sync::RigConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DOTSYNC_CONFIG",
        "DOTSYNC_DEVICE",
        "DOTSYNC_BAUD",
        "DOTSYNC_CAPTURE_TIMEOUT_MS",
        "DOTSYNC_ARTIFACT_DIR",
        "DOTSYNC_MIN_AREA",
        "DOTSYNC_SOLIDITY_THRESHOLD",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_toml_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    file.write_all(
        br#"
        [camera]
        device = "/dev/ttyACM0"
        baud = 460800
        settle_ms = 250

        [classifier]
        solidity_threshold = 0.9
        red_low = { lower = [0, 120, 120], upper = [8, 255, 255] }

        [artifacts]
        dir = "runs/bench"
        "#,
    )
    .expect("write config");

    std::env::set_var("DOTSYNC_CONFIG", file.path());
    std::env::set_var("DOTSYNC_DEVICE", "tcp://10.0.0.5:8765");
    std::env::set_var("DOTSYNC_CAPTURE_TIMEOUT_MS", "1200");

    let cfg = RigConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.camera.device, "tcp://10.0.0.5:8765");
    assert_eq!(cfg.camera.baud, 460_800);
    assert_eq!(cfg.camera.settle_delay, Duration::from_millis(250));
    assert_eq!(cfg.camera.capture_timeout, Duration::from_millis(1200));
    assert_eq!(cfg.classifier.solidity_threshold, 0.9);
    assert_eq!(cfg.classifier.min_area, 50.0);
    assert_eq!(cfg.classifier.colors.red_low.lower, [0, 120, 120]);
    assert_eq!(cfg.artifact_dir, PathBuf::from("runs/bench"));
}

#[test]
fn loads_json_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("temp config");
    file.write_all(br#"{ "classifier": { "min_area": 120.0, "kernel_radius": 3 } }"#)
        .expect("write config");

    let cfg = RigConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.classifier.min_area, 120.0);
    assert_eq!(cfg.classifier.kernel_radius, 3);
    assert_eq!(cfg.camera.device, "/dev/ttyUSB0");
    assert_eq!(cfg.camera.baud, 921_600);
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RigConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.capture_timeout, Duration::from_secs(3));
    assert_eq!(cfg.classifier.solidity_threshold, 0.92);
    assert_eq!(cfg.artifact_dir, PathBuf::from("capture_test"));
}

#[test]
fn invalid_env_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DOTSYNC_BAUD", "fast");
    let err = RigConfig::load().unwrap_err();
    assert!(err.to_string().contains("DOTSYNC_BAUD"), "{}", err);
    clear_env();

    std::env::set_var("DOTSYNC_SOLIDITY_THRESHOLD", "0");
    assert!(RigConfig::load().is_err());
    clear_env();

    std::env::set_var("DOTSYNC_CAPTURE_TIMEOUT_MS", "0");
    assert!(RigConfig::load().is_err());
    clear_env();
}

#[test]
fn unknown_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().unwrap();
    let err = RigConfig::load_from(Some(dir.path().join("missing.toml").as_path())).unwrap_err();
    assert!(err.to_string().contains("missing.toml"), "{}", err);

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(b"[camera]\nbaud = \"fast\"\n").unwrap();
    assert!(RigConfig::load_from(Some(file.path())).is_err());
}
