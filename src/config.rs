use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::segment::{ColorThresholds, HsvRange};
use crate::classify::ClassificationRule;
use crate::transport::DEFAULT_MAX_FRAME_BYTES;

const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD: u32 = 921_600;
const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_STATUS_WAIT_MS: u64 = 300;
const DEFAULT_SETTLE_MS: u64 = 1_000;
const DEFAULT_KERNEL_RADIUS: u8 = 2;
const DEFAULT_ARTIFACT_DIR: &str = "capture_test";
const MAX_HUE: u8 = 180;

#[derive(Debug, Deserialize, Default)]
struct RigConfigFile {
    camera: Option<CameraConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    artifacts: Option<ArtifactConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    baud: Option<u32>,
    capture_timeout_ms: Option<u64>,
    status_wait_ms: Option<u64>,
    settle_ms: Option<u64>,
    max_frame_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    yellow: Option<HsvRange>,
    red_low: Option<HsvRange>,
    red_high: Option<HsvRange>,
    min_area: Option<f64>,
    solidity_threshold: Option<f64>,
    kernel_radius: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct ArtifactConfigFile {
    dir: Option<PathBuf>,
}

/// Everything a session needs, resolved from defaults, file and environment.
#[derive(Debug, Clone, Default)]
pub struct RigConfig {
    pub camera: CaptureSettings,
    pub classifier: ClassifierSettings,
    pub artifact_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Serial path or `tcp://host:port`.
    pub device: String,
    pub baud: u32,
    /// Deadline for one capture request, command to end marker.
    pub capture_timeout: Duration,
    /// Fixed wait before reading a status reply.
    pub status_wait: Duration,
    /// Pause after opening the device before the first command.
    pub settle_delay: Duration,
    pub max_frame_bytes: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud: DEFAULT_BAUD,
            capture_timeout: Duration::from_millis(DEFAULT_CAPTURE_TIMEOUT_MS),
            status_wait: Duration::from_millis(DEFAULT_STATUS_WAIT_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_MS),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub colors: ColorThresholds,
    /// Smallest region (px²) that counts as a dot.
    pub min_area: f64,
    /// Solidity at or above which a dot is accepted.
    pub solidity_threshold: f64,
    /// Half-size of the square close/open element (2 → 5x5).
    pub kernel_radius: u8,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        let rule = ClassificationRule::default();
        Self {
            colors: ColorThresholds::default(),
            min_area: rule.min_area,
            solidity_threshold: rule.solidity_threshold,
            kernel_radius: DEFAULT_KERNEL_RADIUS,
        }
    }
}

impl RigConfig {
    /// Load using the `DOTSYNC_CONFIG` path, if set.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DOTSYNC_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => RigConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RigConfigFile) -> Self {
        let camera_file = file.camera.unwrap_or_default();
        let defaults = CaptureSettings::default();
        let camera = CaptureSettings {
            device: camera_file.device.unwrap_or(defaults.device),
            baud: camera_file.baud.unwrap_or(defaults.baud),
            capture_timeout: camera_file
                .capture_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.capture_timeout),
            status_wait: camera_file
                .status_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.status_wait),
            settle_delay: camera_file
                .settle_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle_delay),
            max_frame_bytes: camera_file
                .max_frame_bytes
                .unwrap_or(defaults.max_frame_bytes),
        };

        let classifier_file = file.classifier.unwrap_or_default();
        let defaults = ClassifierSettings::default();
        let colors = defaults.colors;
        let classifier = ClassifierSettings {
            colors: ColorThresholds {
                yellow: classifier_file.yellow.unwrap_or(colors.yellow),
                red_low: classifier_file.red_low.unwrap_or(colors.red_low),
                red_high: classifier_file.red_high.unwrap_or(colors.red_high),
            },
            min_area: classifier_file.min_area.unwrap_or(defaults.min_area),
            solidity_threshold: classifier_file
                .solidity_threshold
                .unwrap_or(defaults.solidity_threshold),
            kernel_radius: classifier_file
                .kernel_radius
                .unwrap_or(defaults.kernel_radius),
        };

        let artifact_dir = file
            .artifacts
            .and_then(|artifacts| artifacts.dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR));

        Self {
            camera,
            classifier,
            artifact_dir,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("DOTSYNC_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device.trim().to_string();
            }
        }
        if let Ok(baud) = std::env::var("DOTSYNC_BAUD") {
            self.camera.baud = baud
                .trim()
                .parse()
                .map_err(|_| anyhow!("DOTSYNC_BAUD must be an integer line rate"))?;
        }
        if let Ok(timeout) = std::env::var("DOTSYNC_CAPTURE_TIMEOUT_MS") {
            let ms: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("DOTSYNC_CAPTURE_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.camera.capture_timeout = Duration::from_millis(ms);
        }
        if let Ok(dir) = std::env::var("DOTSYNC_ARTIFACT_DIR") {
            if !dir.trim().is_empty() {
                self.artifact_dir = PathBuf::from(dir);
            }
        }
        if let Ok(area) = std::env::var("DOTSYNC_MIN_AREA") {
            self.classifier.min_area = area
                .trim()
                .parse()
                .map_err(|_| anyhow!("DOTSYNC_MIN_AREA must be a number"))?;
        }
        if let Ok(threshold) = std::env::var("DOTSYNC_SOLIDITY_THRESHOLD") {
            self.classifier.solidity_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("DOTSYNC_SOLIDITY_THRESHOLD must be a number"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.baud == 0 {
            return Err(anyhow!("baud rate must be greater than zero"));
        }
        if self.camera.capture_timeout.is_zero() {
            return Err(anyhow!("capture timeout must be greater than zero"));
        }
        if self.camera.max_frame_bytes == 0 {
            return Err(anyhow!("max frame bytes must be greater than zero"));
        }
        let threshold = self.classifier.solidity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(anyhow!(
                "solidity threshold must be in (0, 1], got {}",
                threshold
            ));
        }
        if !(self.classifier.min_area >= 0.0) {
            return Err(anyhow!("min area must be >= 0"));
        }
        let colors = &self.classifier.colors;
        for (name, range) in [
            ("yellow", &colors.yellow),
            ("red_low", &colors.red_low),
            ("red_high", &colors.red_high),
        ] {
            validate_range(name, range)?;
        }
        Ok(())
    }
}

fn validate_range(name: &str, range: &HsvRange) -> Result<()> {
    if (0..3).any(|i| range.lower[i] > range.upper[i]) {
        return Err(anyhow!("{} range has a lower bound above its upper bound", name));
    }
    if range.upper[0] > MAX_HUE {
        return Err(anyhow!(
            "{} hue bound {} exceeds {}",
            name,
            range.upper[0],
            MAX_HUE
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<RigConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
