use handmark_core::{DetectorConfig, ModelComplexity, TensorLayout};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Demo configuration: defaults, then an optional TOML file, then
/// `HANDMARK_*` environment variables. CLI flags are applied on top by
/// the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera index, mapped to `/dev/video<N>` (default: 0).
    pub camera_index: u32,
    /// Requested capture resolution; the driver may negotiate another.
    pub width: u32,
    pub height: u32,
    /// Directory containing the palm and landmark ONNX model files.
    pub model_dir: PathBuf,
    pub tensor_layout: TensorLayout,
    /// Show frames in a window; otherwise run headless.
    pub display: bool,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    pub detector: DetectorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_index: 0,
            width: 640,
            height: 480,
            model_dir: handmark_core::default_model_dir(),
            tensor_layout: TensorLayout::default(),
            display: true,
            max_frames: None,
            detector: DetectorConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path` (or `$HANDMARK_CONFIG`) if given, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("HANDMARK_CONFIG").ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `HANDMARK_*` variables looked up through `var`.
    /// Unparseable values are logged and ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        env_parse(&var, "HANDMARK_CAMERA_INDEX", &mut self.camera_index);
        env_parse(&var, "HANDMARK_WIDTH", &mut self.width);
        env_parse(&var, "HANDMARK_HEIGHT", &mut self.height);
        if let Some(dir) = var("HANDMARK_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        env_parse(&var, "HANDMARK_TENSOR_LAYOUT", &mut self.tensor_layout);
        if let Some(v) = var("HANDMARK_DISPLAY") {
            self.display = v != "0";
        }
        if let Some(v) = var("HANDMARK_MAX_FRAMES") {
            match v.parse() {
                Ok(n) => self.max_frames = Some(n),
                Err(_) => tracing::warn!(key = "HANDMARK_MAX_FRAMES", value = %v, "ignoring invalid value"),
            }
        }

        let detector = &mut self.detector;
        if let Some(v) = var("HANDMARK_STATIC_IMAGE_MODE") {
            detector.static_image_mode = v != "0";
        }
        env_parse(&var, "HANDMARK_MAX_NUM_HANDS", &mut detector.max_num_hands);
        let mut complexity = u8::from(detector.model_complexity);
        env_parse(&var, "HANDMARK_MODEL_COMPLEXITY", &mut complexity);
        match ModelComplexity::try_from(complexity) {
            Ok(c) => detector.model_complexity = c,
            Err(e) => tracing::warn!(key = "HANDMARK_MODEL_COMPLEXITY", error = %e, "ignoring invalid value"),
        }
        env_parse(
            &var,
            "HANDMARK_MIN_DETECTION_CONFIDENCE",
            &mut detector.min_detection_confidence,
        );
        env_parse(
            &var,
            "HANDMARK_MIN_TRACKING_CONFIDENCE",
            &mut detector.min_tracking_confidence,
        );
    }
}

fn env_parse<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(v) = var(key) {
        match v.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(key, value = %v, "ignoring invalid value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.camera_index, 0);
        assert_eq!((config.width, config.height), (640, 480));
        assert!(config.display);
        assert_eq!(config.max_frames, None);
        assert_eq!(config.detector, DetectorConfig::default());
        assert!(config.model_dir.ends_with("handmark/models"));
    }

    #[test]
    fn test_toml_partial() {
        let config = Config::from_toml_str(
            r#"
            camera_index = 2
            tensor_layout = "nhwc"
            max_frames = 100

            [detector]
            max_num_hands = 1
            model_complexity = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.camera_index, 2);
        assert_eq!(config.tensor_layout, TensorLayout::Nhwc);
        assert_eq!(config.max_frames, Some(100));
        assert_eq!(config.detector.max_num_hands, 1);
        assert_eq!(config.detector.model_complexity, ModelComplexity::Full);
        assert_eq!(config.detector.min_tracking_confidence, 0.5);
        assert_eq!(config.width, 640);
    }

    #[test]
    fn test_toml_rejects_bad_complexity() {
        let result = Config::from_toml_str("[detector]\nmodel_complexity = 3\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(vars(&[
            ("HANDMARK_CAMERA_INDEX", "1"),
            ("HANDMARK_MODEL_DIR", "/opt/models"),
            ("HANDMARK_DISPLAY", "0"),
            ("HANDMARK_MAX_FRAMES", "10"),
            ("HANDMARK_STATIC_IMAGE_MODE", "1"),
            ("HANDMARK_MODEL_COMPLEXITY", "1"),
            ("HANDMARK_MIN_DETECTION_CONFIDENCE", "0.8"),
        ]));

        assert_eq!(config.camera_index, 1);
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert!(!config.display);
        assert_eq!(config.max_frames, Some(10));
        assert!(config.detector.static_image_mode);
        assert_eq!(config.detector.model_complexity, ModelComplexity::Full);
        assert_eq!(config.detector.min_detection_confidence, 0.8);
    }

    #[test]
    fn test_env_invalid_values_ignored() {
        let mut config = Config::default();
        config.apply_env(vars(&[
            ("HANDMARK_WIDTH", "wide"),
            ("HANDMARK_MODEL_COMPLEXITY", "7"),
            ("HANDMARK_TENSOR_LAYOUT", "planar"),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/handmark.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
