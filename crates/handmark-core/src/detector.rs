//! Hand detector adapter.
//!
//! [`HandDetector`] mirrors a frame, hands it to a [`HandLandmarker`], scales
//! the reported landmarks into pixel space and optionally overlays the hand
//! skeleton. The landmarker is the only part that knows about models.

use crate::draw::{self, DrawingSpec};
use crate::pipeline::OnnxHandLandmarker;
use crate::tensor::TensorLayout;
use crate::types::{Hand, NormalizedHand, NUM_LANDMARKS};
use handmark_hw::Frame;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Marker drawn on every landmark when both drawing and landmark output
/// are requested.
const MARKER_RADIUS: u32 = 15;
const MARKER_COLOR: Rgb<u8> = Rgb([255, 0, 255]);

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (download the MediaPipe ONNX hand models into the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("invalid detector config: {0}")]
    InvalidConfig(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Landmark model tier: latency vs. accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ModelComplexity {
    #[default]
    Lite,
    Full,
}

impl ModelComplexity {
    /// Model file name suffix.
    pub fn suffix(self) -> &'static str {
        match self {
            ModelComplexity::Lite => "lite",
            ModelComplexity::Full => "full",
        }
    }
}

impl From<ModelComplexity> for u8 {
    fn from(c: ModelComplexity) -> u8 {
        match c {
            ModelComplexity::Lite => 0,
            ModelComplexity::Full => 1,
        }
    }
}

impl TryFrom<u8> for ModelComplexity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ModelComplexity::Lite),
            1 => Ok(ModelComplexity::Full),
            other => Err(format!("model complexity must be 0 or 1, got {other}")),
        }
    }
}

/// Settings fixed at construction and passed through to the landmarker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Treat every image independently instead of tracking hands across
    /// video frames.
    pub static_image_mode: bool,
    pub max_num_hands: usize,
    pub model_complexity: ModelComplexity,
    /// Minimum palm detection score.
    pub min_detection_confidence: f32,
    /// Minimum hand presence score for a hand to be reported and tracked.
    pub min_tracking_confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            static_image_mode: false,
            max_num_hands: 2,
            model_complexity: ModelComplexity::Lite,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.max_num_hands == 0 {
            return Err(DetectorError::InvalidConfig(
                "max_num_hands must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DetectorError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// The external hand-landmark model seam.
pub trait HandLandmarker {
    /// Detect hands in an RGB image. Landmarks are normalized to the
    /// image's width and height.
    fn process(
        &mut self,
        image: &RgbImage,
        config: &DetectorConfig,
    ) -> Result<Vec<NormalizedHand>, DetectorError>;
}

/// Mirrors, detects, scales and draws.
pub struct HandDetector<L> {
    landmarker: L,
    config: DetectorConfig,
    landmark_style: [DrawingSpec; NUM_LANDMARKS],
    connection_style: [DrawingSpec; 21],
}

impl HandDetector<OnnxHandLandmarker> {
    /// Load the palm and landmark models matching `config.model_complexity`
    /// from `model_dir`.
    pub fn load(
        model_dir: &Path,
        config: DetectorConfig,
        layout: TensorLayout,
    ) -> Result<Self, DetectorError> {
        config.validate()?;
        let landmarker = OnnxHandLandmarker::load(model_dir, config.model_complexity, layout)?;
        Self::new(landmarker, config)
    }
}

impl<L: HandLandmarker> HandDetector<L> {
    pub fn new(landmarker: L, config: DetectorConfig) -> Result<Self, DetectorError> {
        config.validate()?;
        tracing::debug!(?config, "hand detector configured");
        Ok(Self {
            landmarker,
            config,
            landmark_style: draw::default_hand_landmarks_style(),
            connection_style: draw::default_hand_connections_style(),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Find hands in `frame`.
    ///
    /// The frame is mirrored horizontally in place before detection, so the
    /// returned coordinates and any drawing refer to the mirrored image.
    /// With `draw`, the skeleton is drawn into the same buffer; with
    /// `return_landmarks`, each detected hand is returned in pixel space
    /// (otherwise the list is empty).
    pub fn find_hands(
        &mut self,
        frame: &mut Frame,
        draw: bool,
        return_landmarks: bool,
    ) -> Result<Vec<Hand>, DetectorError> {
        let (width, height) = (frame.width(), frame.height());
        frame.mirror();

        let detected = self.landmarker.process(&frame.image, &self.config)?;
        tracing::trace!(seq = frame.sequence, hands = detected.len(), "landmarker returned");

        let mut hands = Vec::new();
        for normalized in &detected {
            let hand = return_landmarks.then(|| Hand::from_normalized(normalized, width, height));

            if draw {
                draw::draw_landmarks(
                    &mut frame.image,
                    normalized,
                    &self.landmark_style,
                    &self.connection_style,
                );
                if let Some(hand) = &hand {
                    for lm in hand.iter() {
                        draw::circle(&mut frame.image, (lm.x, lm.y), MARKER_RADIUS, MARKER_COLOR);
                    }
                }
            }

            hands.extend(hand);
        }

        Ok(hands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Handedness, LandmarkId, NormalizedLandmark};

    /// Returns fixed hands and records what it was given.
    struct StubLandmarker {
        hands: Vec<NormalizedHand>,
        seen_first_pixel: Option<Rgb<u8>>,
        seen_config: Option<DetectorConfig>,
    }

    impl StubLandmarker {
        fn new(hands: Vec<NormalizedHand>) -> Self {
            Self {
                hands,
                seen_first_pixel: None,
                seen_config: None,
            }
        }
    }

    impl HandLandmarker for StubLandmarker {
        fn process(
            &mut self,
            image: &RgbImage,
            config: &DetectorConfig,
        ) -> Result<Vec<NormalizedHand>, DetectorError> {
            self.seen_first_pixel = Some(*image.get_pixel(0, 0));
            self.seen_config = Some(config.clone());
            Ok(self.hands.clone())
        }
    }

    struct FailingLandmarker;

    impl HandLandmarker for FailingLandmarker {
        fn process(
            &mut self,
            _image: &RgbImage,
            _config: &DetectorConfig,
        ) -> Result<Vec<NormalizedHand>, DetectorError> {
            Err(DetectorError::InferenceFailed("boom".into()))
        }
    }

    fn hand_with_wrist(x: f32, y: f32) -> NormalizedHand {
        let mut landmarks = [NormalizedLandmark { x: 0.4, y: 0.4, z: 0.0 }; NUM_LANDMARKS];
        landmarks[LandmarkId::Wrist.index()] = NormalizedLandmark { x, y, z: 0.0 };
        NormalizedHand {
            landmarks,
            presence: 0.99,
            handedness: Handedness::Right,
        }
    }

    fn gradient_frame(width: u32, height: u32) -> Frame {
        Frame::from_image(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    fn mirrored(image: &RgbImage) -> RgbImage {
        image::imageops::flip_horizontal(image)
    }

    #[test]
    fn test_default_config() {
        let config = DetectorConfig::default();
        assert!(!config.static_image_mode);
        assert_eq!(config.max_num_hands, 2);
        assert_eq!(config.model_complexity, ModelComplexity::Lite);
        assert_eq!(config.min_detection_confidence, 0.5);
        assert_eq!(config.min_tracking_confidence, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = DetectorConfig {
            max_num_hands: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DetectorError::InvalidConfig(_))));

        let config = DetectorConfig {
            min_tracking_confidence: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DetectorError::InvalidConfig(_))));

        assert!(HandDetector::new(StubLandmarker::new(vec![]), config).is_err());
    }

    #[test]
    fn test_model_complexity_from_u8() {
        assert_eq!(ModelComplexity::try_from(0), Ok(ModelComplexity::Lite));
        assert_eq!(ModelComplexity::try_from(1), Ok(ModelComplexity::Full));
        assert!(ModelComplexity::try_from(2).is_err());
        assert_eq!(ModelComplexity::Full.suffix(), "full");
    }

    #[test]
    fn test_wrist_scaled_to_pixels() {
        let mut detector =
            HandDetector::new(StubLandmarker::new(vec![hand_with_wrist(0.5, 0.5)]), DetectorConfig::default())
                .unwrap();
        let mut frame = gradient_frame(640, 480);

        let hands = detector.find_hands(&mut frame, true, true).unwrap();

        assert_eq!(hands.len(), 1);
        assert_eq!(hands[0].landmarks().len(), NUM_LANDMARKS);
        assert_eq!(hands[0].wrist().to_string(), "(0, 320, 240)");
    }

    #[test]
    fn test_no_landmarks_requested() {
        let mut detector = HandDetector::new(
            StubLandmarker::new(vec![hand_with_wrist(0.5, 0.5), hand_with_wrist(0.1, 0.2)]),
            DetectorConfig::default(),
        )
        .unwrap();
        let mut frame = gradient_frame(64, 48);

        assert!(detector.find_hands(&mut frame, true, false).unwrap().is_empty());
        assert!(detector.find_hands(&mut frame, false, false).unwrap().is_empty());
    }

    #[test]
    fn test_no_draw_only_mirrors() {
        let mut detector =
            HandDetector::new(StubLandmarker::new(vec![hand_with_wrist(0.5, 0.5)]), DetectorConfig::default())
                .unwrap();
        let mut frame = gradient_frame(64, 48);
        let expected = mirrored(&frame.image);

        let hands = detector.find_hands(&mut frame, false, true).unwrap();

        assert_eq!(hands.len(), 1);
        assert_eq!(frame.image, expected);
    }

    #[test]
    fn test_no_hands_only_mirrors() {
        let mut detector =
            HandDetector::new(StubLandmarker::new(vec![]), DetectorConfig::default()).unwrap();
        let mut frame = gradient_frame(64, 48);
        let expected = mirrored(&frame.image);

        let hands = detector.find_hands(&mut frame, true, true).unwrap();

        assert!(hands.is_empty());
        assert_eq!(frame.image, expected);
    }

    #[test]
    fn test_landmarker_sees_mirrored_frame() {
        let mut detector =
            HandDetector::new(StubLandmarker::new(vec![]), DetectorConfig::default()).unwrap();
        let mut frame = gradient_frame(64, 48);
        let last_column = *frame.image.get_pixel(63, 0);

        detector.find_hands(&mut frame, false, false).unwrap();

        assert_eq!(detector.landmarker.seen_first_pixel, Some(last_column));
    }

    #[test]
    fn test_config_passed_through() {
        let config = DetectorConfig {
            static_image_mode: true,
            max_num_hands: 1,
            model_complexity: ModelComplexity::Full,
            min_detection_confidence: 0.7,
            min_tracking_confidence: 0.3,
        };
        let mut detector = HandDetector::new(StubLandmarker::new(vec![]), config.clone()).unwrap();
        let mut frame = gradient_frame(8, 8);

        detector.find_hands(&mut frame, false, false).unwrap();

        assert_eq!(detector.landmarker.seen_config, Some(config));
    }

    #[test]
    fn test_draw_with_markers() {
        let mut detector =
            HandDetector::new(StubLandmarker::new(vec![hand_with_wrist(0.5, 0.5)]), DetectorConfig::default())
                .unwrap();
        let mut frame = Frame::from_image(RgbImage::new(100, 100));

        detector.find_hands(&mut frame, true, true).unwrap();

        // Marker ring 15 px right of the wrist.
        assert_eq!(frame.image.get_pixel(65, 50), &MARKER_COLOR);
    }

    #[test]
    fn test_draw_without_markers() {
        let mut detector =
            HandDetector::new(StubLandmarker::new(vec![hand_with_wrist(0.5, 0.5)]), DetectorConfig::default())
                .unwrap();
        let mut frame = Frame::from_image(RgbImage::new(100, 100));

        detector.find_hands(&mut frame, true, false).unwrap();

        assert!(frame.image.pixels().all(|p| *p != MARKER_COLOR));
        assert!(frame.image.pixels().any(|p| p.0 != [0, 0, 0]));
    }

    #[test]
    fn test_landmarker_error_propagates() {
        let mut detector = HandDetector::new(FailingLandmarker, DetectorConfig::default()).unwrap();
        let mut frame = gradient_frame(8, 8);
        assert!(matches!(
            detector.find_hands(&mut frame, true, true),
            Err(DetectorError::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: DetectorConfig =
            serde_json::from_str(r#"{"max_num_hands": 1, "model_complexity": 1}"#).unwrap();
        assert_eq!(config.max_num_hands, 1);
        assert_eq!(config.model_complexity, ModelComplexity::Full);
        assert_eq!(config.min_detection_confidence, 0.5);
    }
}
