//! Hand landmark network via ONNX Runtime.
//!
//! Regresses the 21 hand landmarks from a 224×224 crop of a hand region and
//! projects them back into normalized frame coordinates.

use crate::detector::DetectorError;
use crate::roi::{self, RotatedRect};
use crate::tensor::{self, TensorLayout};
use crate::types::{Handedness, NormalizedHand, NormalizedLandmark, NUM_LANDMARKS};
use image::RgbImage;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

// --- Named constants ---
const LANDMARK_INPUT_SIZE: u32 = 224;
const LANDMARK_COORDS: usize = NUM_LANDMARKS * 3;
/// Depth is regressed on a smaller scale than x/y.
const LANDMARK_Z_NORMALIZATION: f32 = 0.4;

/// Output tensor indices: (screen landmarks, presence, handedness).
type LandmarkOutputIndices = (usize, usize, usize);

/// MediaPipe-format hand landmark network (lite or full).
pub struct LandmarkNetwork {
    session: Session,
    layout: TensorLayout,
    output_indices: Option<LandmarkOutputIndices>,
    num_outputs: usize,
}

impl LandmarkNetwork {
    /// Load a hand landmark ONNX model from the given path.
    pub fn load(model_path: &str, layout: TensorLayout) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            ?layout,
            "loaded hand landmark model"
        );

        if num_outputs < 3 {
            return Err(DetectorError::InferenceFailed(format!(
                "landmark model requires at least 3 outputs (landmarks, presence, handedness), got {num_outputs}"
            )));
        }

        Ok(Self {
            session,
            layout,
            output_indices: None,
            num_outputs,
        })
    }

    /// Estimate landmarks inside `region` of `image`, in normalized frame
    /// coordinates.
    pub fn estimate(
        &mut self,
        image: &RgbImage,
        region: &RotatedRect,
    ) -> Result<NormalizedHand, DetectorError> {
        let crop = roi::crop(image, region, LANDMARK_INPUT_SIZE);
        let input = tensor::to_tensor(&crop, self.layout);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (lm_idx, presence_idx, handedness_idx) = match self.output_indices {
            Some(indices) => indices,
            None => {
                let mut lens = Vec::with_capacity(self.num_outputs);
                for i in 0..self.num_outputs {
                    let (_, data) = outputs[i].try_extract_tensor::<f32>().map_err(|e| {
                        DetectorError::InferenceFailed(format!("landmark output {i}: {e}"))
                    })?;
                    lens.push(data.len());
                }
                let indices = discover_output_indices(&lens).ok_or_else(|| {
                    DetectorError::InferenceFailed(format!(
                        "unrecognized landmark outputs: element counts {lens:?}"
                    ))
                })?;
                tracing::debug!(?indices, "landmark output tensor mapping");
                self.output_indices = Some(indices);
                indices
            }
        };

        let (_, screen) = outputs[lm_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("landmarks: {e}")))?;
        let (_, presence) = outputs[presence_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("presence: {e}")))?;
        let (_, handedness) = outputs[handedness_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("handedness: {e}")))?;

        project_landmarks(
            screen,
            probability(presence.first().copied().unwrap_or(0.0)),
            probability(handedness.first().copied().unwrap_or(0.0)),
            region,
            image.width(),
            image.height(),
        )
    }
}

/// Identify outputs by element count: the first 63-element tensor holds
/// screen landmarks (a later one holds world landmarks), the first two
/// scalars are presence and handedness.
fn discover_output_indices(lens: &[usize]) -> Option<LandmarkOutputIndices> {
    let landmarks = lens.iter().position(|&n| n == LANDMARK_COORDS)?;
    let mut scalars = lens.iter().enumerate().filter(|&(_, &n)| n == 1).map(|(i, _)| i);
    let presence = scalars.next()?;
    let handedness = scalars.next()?;
    Some((landmarks, presence, handedness))
}

/// Some exports end in a sigmoid and some emit logits.
fn probability(raw: f32) -> f32 {
    if (0.0..=1.0).contains(&raw) {
        raw
    } else {
        1.0 / (1.0 + (-raw).exp())
    }
}

/// Project crop-space landmark output (x, y, z in input pixels) into
/// normalized frame coordinates.
fn project_landmarks(
    screen: &[f32],
    presence: f32,
    raw_handedness: f32,
    region: &RotatedRect,
    width: u32,
    height: u32,
) -> Result<NormalizedHand, DetectorError> {
    if screen.len() < LANDMARK_COORDS {
        return Err(DetectorError::InferenceFailed(format!(
            "expected {LANDMARK_COORDS} landmark values, got {}",
            screen.len()
        )));
    }

    let size = LANDMARK_INPUT_SIZE as f32;
    let landmarks = std::array::from_fn(|i| {
        let (u, v, z) = (screen[i * 3] / size, screen[i * 3 + 1] / size, screen[i * 3 + 2] / size);
        let (x, y) = region.project(u, v);
        NormalizedLandmark {
            x: x / width as f32,
            y: y / height as f32,
            z: z / LANDMARK_Z_NORMALIZATION * region.width / width as f32,
        }
    });

    Ok(NormalizedHand {
        landmarks,
        presence,
        handedness: if raw_handedness > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        },
    })
}
