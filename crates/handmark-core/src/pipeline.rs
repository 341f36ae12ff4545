//! Two-stage hand landmarker with region tracking across video frames.

use crate::detector::{DetectorConfig, DetectorError, HandLandmarker, ModelComplexity};
use crate::landmark::LandmarkNetwork;
use crate::palm::PalmDetector;
use crate::roi::RotatedRect;
use crate::tensor::TensorLayout;
use crate::types::NormalizedHand;
use image::RgbImage;
use std::path::Path;

/// A new palm overlapping a tracked region more than this is the same hand.
const TRACKING_OVERLAP_IOU: f32 = 0.5;

/// Palm detection model file for a complexity tier.
pub fn palm_model_path(model_dir: &Path, complexity: ModelComplexity) -> String {
    model_dir
        .join(format!("palm_detection_{}.onnx", complexity.suffix()))
        .to_string_lossy()
        .into_owned()
}

/// Hand landmark model file for a complexity tier.
pub fn landmark_model_path(model_dir: &Path, complexity: ModelComplexity) -> String {
    model_dir
        .join(format!("hand_landmark_{}.onnx", complexity.suffix()))
        .to_string_lossy()
        .into_owned()
}

/// First stage: propose hand regions for a frame.
pub trait PalmStage {
    fn hand_regions(&mut self, image: &RgbImage, min_score: f32) -> Result<Vec<RotatedRect>, DetectorError>;
}

/// Second stage: landmarks inside one hand region.
pub trait LandmarkStage {
    fn landmarks(&mut self, image: &RgbImage, region: &RotatedRect) -> Result<NormalizedHand, DetectorError>;
}

impl PalmStage for PalmDetector {
    fn hand_regions(&mut self, image: &RgbImage, min_score: f32) -> Result<Vec<RotatedRect>, DetectorError> {
        Ok(self.detect(image, min_score)?.iter().map(|p| p.hand_region()).collect())
    }
}

impl LandmarkStage for LandmarkNetwork {
    fn landmarks(&mut self, image: &RgbImage, region: &RotatedRect) -> Result<NormalizedHand, DetectorError> {
        self.estimate(image, region)
    }
}

/// Palm detection seeds hand regions, the landmark stage refines them, and
/// in video mode each frame's landmarks seed the next frame's regions.
pub struct TwoStageLandmarker<P, M> {
    palm: P,
    landmark: M,
    /// Regions carried over from the previous frame (video mode only).
    tracked: Vec<RotatedRect>,
}

/// The ONNX-backed default [`HandLandmarker`].
pub type OnnxHandLandmarker = TwoStageLandmarker<PalmDetector, LandmarkNetwork>;

impl OnnxHandLandmarker {
    /// Load both networks for `complexity` from `model_dir`.
    pub fn load(
        model_dir: &Path,
        complexity: ModelComplexity,
        layout: TensorLayout,
    ) -> Result<Self, DetectorError> {
        let palm_path = palm_model_path(model_dir, complexity);
        let palm = PalmDetector::load(&palm_path, layout)?;
        tracing::info!(path = %palm_path, "palm detector loaded");

        let landmark_path = landmark_model_path(model_dir, complexity);
        let landmark = LandmarkNetwork::load(&landmark_path, layout)?;
        tracing::info!(path = %landmark_path, "landmark network loaded");

        Ok(Self::new(palm, landmark))
    }
}

impl<P: PalmStage, M: LandmarkStage> TwoStageLandmarker<P, M> {
    pub fn new(palm: P, landmark: M) -> Self {
        Self {
            palm,
            landmark,
            tracked: Vec::new(),
        }
    }
}

impl<P: PalmStage, M: LandmarkStage> HandLandmarker for TwoStageLandmarker<P, M> {
    fn process(
        &mut self,
        image: &RgbImage,
        config: &DetectorConfig,
    ) -> Result<Vec<NormalizedHand>, DetectorError> {
        let mut regions = if config.static_image_mode {
            Vec::new()
        } else {
            std::mem::take(&mut self.tracked)
        };
        regions.truncate(config.max_num_hands);

        if regions.len() < config.max_num_hands {
            let candidates = self.palm.hand_regions(image, config.min_detection_confidence)?;
            let found = candidates.len();
            let added = merge_regions(&mut regions, candidates, config.max_num_hands);
            tracing::trace!(palms = found, added, "palm detection ran");
        }

        let mut hands = Vec::with_capacity(regions.len());
        let mut next = Vec::with_capacity(regions.len());
        for region in &regions {
            let hand = self.landmark.landmarks(image, region)?;
            if hand.presence < config.min_tracking_confidence {
                tracing::trace!(presence = hand.presence, "hand lost");
                continue;
            }
            next.push(RotatedRect::from_landmarks(&hand, image.width(), image.height()));
            hands.push(hand);
        }

        if !config.static_image_mode {
            self.tracked = next;
        }

        Ok(hands)
    }
}

/// Append candidate regions that do not overlap an existing one, up to
/// `max` regions in total. Returns how many were added.
fn merge_regions(regions: &mut Vec<RotatedRect>, candidates: Vec<RotatedRect>, max: usize) -> usize {
    let mut added = 0;
    for candidate in candidates {
        if regions.len() >= max {
            break;
        }
        let bounds = candidate.bounds();
        if regions
            .iter()
            .any(|r| r.bounds().iou(&bounds) > TRACKING_OVERLAP_IOU)
        {
            continue;
        }
        regions.push(candidate);
        added += 1;
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Handedness, NormalizedLandmark};

    fn square(cx: f32, cy: f32, side: f32) -> RotatedRect {
        RotatedRect {
            cx,
            cy,
            width: side,
            height: side,
            rotation: 0.0,
        }
    }

    #[test]
    fn test_model_paths() {
        let dir = Path::new("/models");
        assert_eq!(
            palm_model_path(dir, ModelComplexity::Lite),
            "/models/palm_detection_lite.onnx"
        );
        assert_eq!(
            landmark_model_path(dir, ModelComplexity::Full),
            "/models/hand_landmark_full.onnx"
        );
    }

    #[test]
    fn test_merge_skips_tracked_hand() {
        let mut regions = vec![square(100.0, 100.0, 50.0)];
        let added = merge_regions(
            &mut regions,
            vec![square(102.0, 101.0, 50.0), square(300.0, 100.0, 50.0)],
            2,
        );
        assert_eq!(added, 1);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].cx, 300.0);
    }

    #[test]
    fn test_merge_respects_max() {
        let mut regions = Vec::new();
        let added = merge_regions(
            &mut regions,
            vec![
                square(0.0, 0.0, 10.0),
                square(100.0, 0.0, 10.0),
                square(200.0, 0.0, 10.0),
            ],
            2,
        );
        assert_eq!(added, 2);
        assert_eq!(regions.len(), 2);
    }

    /// Proposes fixed regions and counts how often it ran.
    struct StubPalms {
        regions: Vec<RotatedRect>,
        calls: usize,
    }

    impl PalmStage for StubPalms {
        fn hand_regions(&mut self, _image: &RgbImage, _min_score: f32) -> Result<Vec<RotatedRect>, DetectorError> {
            self.calls += 1;
            Ok(self.regions.clone())
        }
    }

    /// Spreads landmarks over the region with a fixed presence score and
    /// records every region it was asked about.
    struct StubLandmarks {
        presence: f32,
        seen: Vec<RotatedRect>,
    }

    impl LandmarkStage for StubLandmarks {
        fn landmarks(&mut self, image: &RgbImage, region: &RotatedRect) -> Result<NormalizedHand, DetectorError> {
            self.seen.push(*region);
            let (w, h) = (image.width() as f32, image.height() as f32);
            let landmarks = std::array::from_fn(|i| {
                let t = i as f32 / 20.0 - 0.5;
                NormalizedLandmark {
                    x: (region.cx + t * region.width / 2.0) / w,
                    y: (region.cy - t * region.height / 2.0) / h,
                    z: 0.0,
                }
            });
            Ok(NormalizedHand {
                landmarks,
                presence: self.presence,
                handedness: Handedness::Right,
            })
        }
    }

    fn landmarker(regions: Vec<RotatedRect>, presence: f32) -> TwoStageLandmarker<StubPalms, StubLandmarks> {
        TwoStageLandmarker::new(
            StubPalms { regions, calls: 0 },
            StubLandmarks {
                presence,
                seen: Vec::new(),
            },
        )
    }

    fn config(static_image_mode: bool, max_num_hands: usize) -> DetectorConfig {
        DetectorConfig {
            static_image_mode,
            max_num_hands,
            ..Default::default()
        }
    }

    #[test]
    fn test_tracked_hand_skips_palm_detection() {
        let mut lm = landmarker(vec![square(100.0, 100.0, 60.0)], 0.9);
        let image = RgbImage::new(320, 240);
        let config = config(false, 1);

        assert_eq!(lm.process(&image, &config).unwrap().len(), 1);
        assert_eq!(lm.process(&image, &config).unwrap().len(), 1);

        assert_eq!(lm.palm.calls, 1);
        assert_eq!(lm.landmark.seen.len(), 2);
        assert_ne!(lm.landmark.seen[1], square(100.0, 100.0, 60.0));
    }

    #[test]
    fn test_palm_detection_runs_below_max_hands() {
        let mut lm = landmarker(vec![square(100.0, 100.0, 60.0)], 0.9);
        let image = RgbImage::new(320, 240);
        let config = config(false, 2);

        lm.process(&image, &config).unwrap();
        lm.process(&image, &config).unwrap();

        assert_eq!(lm.palm.calls, 2);
    }

    #[test]
    fn test_static_mode_ignores_tracking() {
        let mut lm = landmarker(vec![square(100.0, 100.0, 60.0)], 0.9);
        let image = RgbImage::new(320, 240);
        let config = config(true, 1);

        lm.process(&image, &config).unwrap();
        lm.process(&image, &config).unwrap();

        assert_eq!(lm.palm.calls, 2);
        assert!(lm.tracked.is_empty());
        assert_eq!(lm.landmark.seen, vec![square(100.0, 100.0, 60.0); 2]);
    }

    #[test]
    fn test_low_presence_drops_hand_and_region() {
        let mut lm = landmarker(vec![square(100.0, 100.0, 60.0)], 0.2);
        let image = RgbImage::new(320, 240);
        let config = config(false, 1);

        assert!(lm.process(&image, &config).unwrap().is_empty());
        assert!(lm.tracked.is_empty());
        assert!(lm.process(&image, &config).unwrap().is_empty());
        assert_eq!(lm.palm.calls, 2);
    }

    #[test]
    fn test_missing_models_reported() {
        let result = OnnxHandLandmarker::load(
            Path::new("/nonexistent/handmark-models"),
            ModelComplexity::Lite,
            TensorLayout::Nchw,
        );
        assert!(matches!(result, Err(DetectorError::ModelNotFound(p)) if p.ends_with("palm_detection_lite.onnx")));
    }
}
