//! Palm detector via ONNX Runtime.
//!
//! Runs the MediaPipe palm detection SSD on a letterboxed 192×192 view of
//! the frame, decodes its 2016 fixed-size anchors and filters overlapping
//! boxes with non-maximum suppression.

use crate::detector::DetectorError;
use crate::roi::{self, Rect, RotatedRect};
use crate::tensor::{self, TensorLayout};
use image::RgbImage;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const PALM_INPUT_SIZE: u32 = 192;
const PALM_STRIDES: [u32; 4] = [8, 16, 16, 16];
const PALM_ANCHORS_PER_LAYER: usize = 2;
const PALM_NUM_COORDS: usize = 18;
const PALM_NUM_KEYPOINTS: usize = 7;
const PALM_SCORE_CLIP: f32 = 100.0;
const PALM_NMS_THRESHOLD: f32 = 0.3;

/// Keypoint indices reported with every palm.
pub const KEYPOINT_WRIST: usize = 0;
pub const KEYPOINT_MIDDLE_MCP: usize = 2;

/// Anchor center in normalized input coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
}

/// A palm found in the frame, in frame pixels.
#[derive(Debug, Clone)]
pub struct PalmDetection {
    pub bbox: Rect,
    pub keypoints: [(f32, f32); PALM_NUM_KEYPOINTS],
    pub score: f32,
}

impl PalmDetection {
    /// The hand region this palm implies.
    pub fn hand_region(&self) -> RotatedRect {
        RotatedRect::from_palm(
            &self.bbox,
            self.keypoints[KEYPOINT_WRIST],
            self.keypoints[KEYPOINT_MIDDLE_MCP],
        )
    }
}

/// SSD palm detection network.
pub struct PalmDetector {
    session: Session,
    layout: TensorLayout,
    anchors: Vec<Anchor>,
    /// (regressors, classificators) output indices, resolved on first run.
    output_indices: Option<(usize, usize)>,
    num_outputs: usize,
}

impl PalmDetector {
    /// Load a palm detection ONNX model from the given path.
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
            "loaded palm detection model"
        );

        if num_outputs < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "palm model requires 2 outputs (regressors, classificators), got {num_outputs}"
            )));
        }

        Ok(Self {
            session,
            layout,
            anchors: generate_anchors(),
            output_indices: None,
            num_outputs,
        })
    }

    /// Detect palms scoring at least `min_score`, strongest first.
    pub fn detect(
        &mut self,
        image: &RgbImage,
        min_score: f32,
    ) -> Result<Vec<PalmDetection>, DetectorError> {
        let region = RotatedRect::covering(image.width(), image.height());
        let crop = roi::crop(image, &region, PALM_INPUT_SIZE);
        let input = tensor::to_tensor(&crop, self.layout);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (reg_idx, cls_idx) = match self.output_indices {
            Some(indices) => indices,
            None => {
                let mut lens = Vec::with_capacity(self.num_outputs);
                for i in 0..self.num_outputs {
                    let (_, data) = outputs[i].try_extract_tensor::<f32>().map_err(|e| {
                        DetectorError::InferenceFailed(format!("palm output {i}: {e}"))
                    })?;
                    lens.push(data.len());
                }
                let indices = discover_output_indices(&lens, self.anchors.len()).ok_or_else(|| {
                    DetectorError::InferenceFailed(format!(
                        "palm outputs {lens:?} do not match {} anchors",
                        self.anchors.len()
                    ))
                })?;
                tracing::debug!(?indices, "palm output tensor mapping");
                self.output_indices = Some(indices);
                indices
            }
        };

        let (_, regressors) = outputs[reg_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("regressors: {e}")))?;
        let (_, scores) = outputs[cls_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("classificators: {e}")))?;

        let candidates = decode_palms(regressors, scores, &self.anchors, min_score)
            .into_iter()
            .map(|det| to_frame_space(det, &region))
            .collect();

        let palms = nms(candidates, PALM_NMS_THRESHOLD);
        tracing::trace!(count = palms.len(), "palms detected");
        Ok(palms)
    }
}

/// Generate the SSD anchor centers for the 192×192 palm model.
///
/// Consecutive layers with equal stride share one feature map, each layer
/// adding two fixed-size anchors per cell.
pub fn generate_anchors() -> Vec<Anchor> {
    let mut anchors = Vec::new();
    let mut layer = 0;

    while layer < PALM_STRIDES.len() {
        let stride = PALM_STRIDES[layer];
        let mut same_stride = 0;
        while layer < PALM_STRIDES.len() && PALM_STRIDES[layer] == stride {
            same_stride += 1;
            layer += 1;
        }

        let grid = PALM_INPUT_SIZE.div_ceil(stride);
        let per_cell = same_stride * PALM_ANCHORS_PER_LAYER;
        for y in 0..grid {
            for x in 0..grid {
                let anchor = Anchor {
                    x: (x as f32 + 0.5) / grid as f32,
                    y: (y as f32 + 0.5) / grid as f32,
                };
                anchors.extend(std::iter::repeat(anchor).take(per_cell));
            }
        }
    }

    anchors
}

/// Identify the regressor and classificator outputs by element count.
fn discover_output_indices(lens: &[usize], num_anchors: usize) -> Option<(usize, usize)> {
    let reg = lens.iter().position(|&n| n == num_anchors * PALM_NUM_COORDS)?;
    let cls = lens.iter().position(|&n| n == num_anchors)?;
    Some((reg, cls))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode raw SSD outputs into detections in normalized input coordinates.
fn decode_palms(
    regressors: &[f32],
    scores: &[f32],
    anchors: &[Anchor],
    min_score: f32,
) -> Vec<PalmDetection> {
    let scale = PALM_INPUT_SIZE as f32;
    let mut detections = Vec::new();

    for (idx, anchor) in anchors.iter().enumerate() {
        let raw_score = scores.get(idx).copied().unwrap_or(f32::NEG_INFINITY);
        let score = sigmoid(raw_score.clamp(-PALM_SCORE_CLIP, PALM_SCORE_CLIP));
        if score < min_score {
            continue;
        }

        let off = idx * PALM_NUM_COORDS;
        let Some(raw) = regressors.get(off..off + PALM_NUM_COORDS) else {
            continue;
        };

        let cx = raw[0] / scale + anchor.x;
        let cy = raw[1] / scale + anchor.y;
        let w = raw[2] / scale;
        let h = raw[3] / scale;

        let keypoints = std::array::from_fn(|k| {
            (
                raw[4 + k * 2] / scale + anchor.x,
                raw[4 + k * 2 + 1] / scale + anchor.y,
            )
        });

        detections.push(PalmDetection {
            bbox: Rect::from_center(cx, cy, w, h),
            keypoints,
            score,
        });
    }

    detections
}

/// Map a detection from normalized crop coordinates to frame pixels.
fn to_frame_space(det: PalmDetection, region: &RotatedRect) -> PalmDetection {
    let (x0, y0) = region.project(det.bbox.x, det.bbox.y);
    let (x1, y1) = region.project(det.bbox.x + det.bbox.width, det.bbox.y + det.bbox.height);
    PalmDetection {
        bbox: Rect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        },
        keypoints: det.keypoints.map(|(u, v)| region.project(u, v)),
        score: det.score,
    }
}

/// Greedy suppression: highest score first, dropping any palm that overlaps
/// an already kept one by more than `iou_threshold`.
fn nms(mut detections: Vec<PalmDetection>, iou_threshold: f32) -> Vec<PalmDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<PalmDetection> = Vec::with_capacity(detections.len());
    for palm in detections {
        if kept.iter().all(|k| k.bbox.iou(&palm.bbox) <= iou_threshold) {
            kept.push(palm);
        }
    }
    kept
}
