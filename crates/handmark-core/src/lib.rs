//! handmark-core: hand landmark detection and skeleton drawing.
//!
//! Uses the MediaPipe palm detection and hand landmark networks (ONNX
//! exports) through ONNX Runtime, behind the [`HandLandmarker`] seam that
//! the [`HandDetector`] adapter drives.

pub mod detector;
pub mod draw;
pub mod landmark;
pub mod palm;
pub mod pipeline;
pub mod roi;
pub mod tensor;
pub mod types;

pub use detector::{DetectorConfig, DetectorError, HandDetector, HandLandmarker, ModelComplexity};
pub use pipeline::{LandmarkStage, OnnxHandLandmarker, PalmStage, TwoStageLandmarker};
pub use tensor::TensorLayout;
pub use types::{Hand, Handedness, Landmark, LandmarkId, NormalizedHand, NormalizedLandmark};

/// Default directory for the ONNX model files.
pub fn default_model_dir() -> std::path::PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        })
        .join("handmark/models")
}
