use framefit_hw::V4lProvider;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("detection_confidence must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f32),
}

fn confidence_in_range(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Runtime configuration: defaults, then an optional TOML file, then
/// `FRAMEFIT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Frames discarded after opening the camera (auto-exposure settling).
    pub warmup_frames: usize,
    /// Face-mesh ONNX model.
    pub model_path: PathBuf,
    /// Face presence threshold in [0, 1].
    pub detection_confidence: f32,
    /// TTF/OTF font for the product label. No label text without one.
    pub label_font: Option<PathBuf>,
    /// JSON product catalog.
    pub catalog_path: PathBuf,
    /// Where exports are written.
    pub export_dir: PathBuf,
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("framefit")
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            camera_device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
            warmup_frames: 4,
            model_path: data_dir.join("models/face_mesh.onnx"),
            detection_confidence: framefit_core::detector::DEFAULT_CONFIDENCE_THRESHOLD,
            label_font: None,
            catalog_path: data_dir.join("products.json"),
            export_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load configuration. `path` wins over `FRAMEFIT_CONFIG`; with neither
    /// set, only defaults and environment overrides apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("FRAMEFIT_CONFIG").ok().map(PathBuf::from));

        let mut config = match file {
            Some(file) => {
                let raw = std::fs::read_to_string(&file).map_err(|source| ConfigError::Io {
                    path: file.display().to_string(),
                    source,
                })?;
                tracing::debug!(path = %file.display(), "loaded config file");
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML config. Missing keys take their defaults; an out-of-range
    /// confidence is rejected.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        if !confidence_in_range(config.detection_confidence) {
            return Err(ConfigError::ConfidenceOutOfRange(config.detection_confidence));
        }
        Ok(config)
    }

    /// Overlay `FRAMEFIT_*` values. Unparseable or out-of-range values are
    /// ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FRAMEFIT_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        override_parsed(&lookup, "FRAMEFIT_CAPTURE_WIDTH", &mut self.capture_width);
        override_parsed(&lookup, "FRAMEFIT_CAPTURE_HEIGHT", &mut self.capture_height);
        override_parsed(&lookup, "FRAMEFIT_WARMUP_FRAMES", &mut self.warmup_frames);
        let mut confidence = self.detection_confidence;
        override_parsed(&lookup, "FRAMEFIT_DETECTION_CONFIDENCE", &mut confidence);
        if confidence_in_range(confidence) {
            self.detection_confidence = confidence;
        } else {
            tracing::warn!(
                value = confidence,
                "ignoring FRAMEFIT_DETECTION_CONFIDENCE outside [0, 1]"
            );
        }
        if let Some(v) = lookup("FRAMEFIT_MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FRAMEFIT_LABEL_FONT") {
            self.label_font = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("FRAMEFIT_CATALOG_PATH") {
            self.catalog_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FRAMEFIT_EXPORT_DIR") {
            self.export_dir = PathBuf::from(v);
        }
    }

    /// Camera provider for this configuration.
    pub fn device_provider(&self) -> V4lProvider {
        V4lProvider {
            device_path: self.camera_device.clone(),
            width: self.capture_width,
            height: self.capture_height,
            warmup_frames: self.warmup_frames,
        }
    }

    pub fn model_path_str(&self) -> String {
        self.model_path.to_string_lossy().into_owned()
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(v) = lookup(key).and_then(|v| v.parse().ok()) {
        *target = v;
    }
}
