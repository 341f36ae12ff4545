//! Hand regions of interest: rotated rectangles, crop warping and the
//! palm/landmark → region conversions used for tracking.
//!
//! All geometry here is in frame pixel space. A region's crop is a square
//! network input; normalized crop coordinates `(u, v)` in [0, 1]² map back
//! onto the frame through [`RotatedRect::project`].

use crate::types::{LandmarkId, NormalizedHand};
use image::{Rgb, RgbImage};
use std::f32::consts::PI;

/// Region scale and vertical shift applied to a palm detection.
const PALM_ROI_SCALE: f32 = 2.6;
const PALM_ROI_SHIFT_Y: f32 = -0.5;

/// Region scale and vertical shift applied to a landmark-derived region.
const LANDMARK_ROI_SCALE: f32 = 2.0;
const LANDMARK_ROI_SHIFT_Y: f32 = -0.1;

/// Landmarks that stay stable across finger poses; their bounds define the
/// next frame's region.
const PARTIAL_LANDMARKS: [LandmarkId; 12] = [
    LandmarkId::Wrist,
    LandmarkId::ThumbCmc,
    LandmarkId::ThumbMcp,
    LandmarkId::ThumbIp,
    LandmarkId::IndexFingerMcp,
    LandmarkId::IndexFingerPip,
    LandmarkId::MiddleFingerMcp,
    LandmarkId::MiddleFingerPip,
    LandmarkId::RingFingerMcp,
    LandmarkId::RingFingerPip,
    LandmarkId::PinkyMcp,
    LandmarkId::PinkyPip,
];

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Intersection-over-Union with another rectangle.
    pub fn iou(&self, other: &Rect) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union_area = self.width * self.height + other.width * other.height - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// A rectangle rotated clockwise (in image coordinates) by `rotation`
/// radians around its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
}

impl RotatedRect {
    /// The square, unrotated region that contains the whole frame, centered
    /// on it (the letterboxed view used for palm detection).
    pub fn covering(width: u32, height: u32) -> Self {
        let side = width.max(height) as f32;
        Self {
            cx: width as f32 / 2.0,
            cy: height as f32 / 2.0,
            width: side,
            height: side,
            rotation: 0.0,
        }
    }

    /// Map normalized crop coordinates to frame pixels.
    pub fn project(&self, u: f32, v: f32) -> (f32, f32) {
        let x = (u - 0.5) * self.width;
        let y = (v - 0.5) * self.height;
        let (sin, cos) = self.rotation.sin_cos();
        (
            self.cx + cos * x - sin * y,
            self.cy + sin * x + cos * y,
        )
    }

    /// Axis-aligned bounds of the rotated rectangle.
    pub fn bounds(&self) -> Rect {
        let corners = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)].map(|(u, v)| self.project(u, v));
        let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);
        Rect {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    /// Shift along the rectangle's own axes (fractions of width/height),
    /// then enlarge its long side by `scale` and make it square.
    fn shift_scale_square(mut self, shift_y: f32, scale: f32) -> Self {
        let (sin, cos) = self.rotation.sin_cos();
        self.cx += -self.height * shift_y * sin;
        self.cy += self.height * shift_y * cos;
        let long = self.width.max(self.height) * scale;
        self.width = long;
        self.height = long;
        self
    }

    /// Region of the whole hand from a palm detection: the palm box rotated
    /// so that wrist → middle-finger knuckle points up, then enlarged.
    pub fn from_palm(bbox: &Rect, wrist: (f32, f32), middle_mcp: (f32, f32)) -> Self {
        let (cx, cy) = bbox.center();
        Self {
            cx,
            cy,
            width: bbox.width,
            height: bbox.height,
            rotation: upright_rotation(wrist, middle_mcp),
        }
        .shift_scale_square(PALM_ROI_SHIFT_Y, PALM_ROI_SCALE)
    }

    /// Region for the next frame derived from the current landmarks, in a
    /// `width` x `height` frame.
    pub fn from_landmarks(hand: &NormalizedHand, width: u32, height: u32) -> Self {
        let px = |id: LandmarkId| {
            let lm = hand.landmark(id);
            (lm.x * width as f32, lm.y * height as f32)
        };

        let wrist = px(LandmarkId::Wrist);
        let index = px(LandmarkId::IndexFingerMcp);
        let middle = px(LandmarkId::MiddleFingerMcp);
        let ring = px(LandmarkId::RingFingerMcp);
        let knuckles = (
            ((index.0 + ring.0) / 2.0 + middle.0) / 2.0,
            ((index.1 + ring.1) / 2.0 + middle.1) / 2.0,
        );
        let rotation = upright_rotation(wrist, knuckles);

        let points: Vec<(f32, f32)> = PARTIAL_LANDMARKS.iter().map(|&id| px(id)).collect();
        let (min_x, max_x, min_y, max_y) = extent(points.iter().copied());
        let aligned_center = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

        // Bounds in the hand's rotated frame.
        let (sin, cos) = (-rotation).sin_cos();
        let (pmin_x, pmax_x, pmin_y, pmax_y) = extent(points.iter().map(|&(x, y)| {
            let (dx, dy) = (x - aligned_center.0, y - aligned_center.1);
            (dx * cos - dy * sin, dx * sin + dy * cos)
        }));
        let projected = ((pmin_x + pmax_x) / 2.0, (pmin_y + pmax_y) / 2.0);
        let (sin, cos) = rotation.sin_cos();

        Self {
            cx: projected.0 * cos - projected.1 * sin + aligned_center.0,
            cy: projected.0 * sin + projected.1 * cos + aligned_center.1,
            width: pmax_x - pmin_x,
            height: pmax_y - pmin_y,
            rotation,
        }
        .shift_scale_square(LANDMARK_ROI_SHIFT_Y, LANDMARK_ROI_SCALE)
    }
}

fn extent(points: impl Iterator<Item = (f32, f32)>) -> (f32, f32, f32, f32) {
    points.fold(
        (f32::INFINITY, f32::NEG_INFINITY, f32::INFINITY, f32::NEG_INFINITY),
        |(min_x, max_x, min_y, max_y), (x, y)| (min_x.min(x), max_x.max(x), min_y.min(y), max_y.max(y)),
    )
}

/// Rotation that turns the vector `from → to` to point straight up.
fn upright_rotation(from: (f32, f32), to: (f32, f32)) -> f32 {
    normalize_radians(PI / 2.0 - (-(to.1 - from.1)).atan2(to.0 - from.0))
}

/// Wrap an angle into [-π, π).
pub fn normalize_radians(angle: f32) -> f32 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}

/// Warp the region `rect` of `image` into a `size` x `size` crop with
/// bilinear sampling. Samples outside the frame are black.
pub fn crop(image: &RgbImage, rect: &RotatedRect, size: u32) -> RgbImage {
    let inv = 1.0 / size as f32;
    RgbImage::from_fn(size, size, |x, y| {
        let (sx, sy) = rect.project((x as f32 + 0.5) * inv, (y as f32 + 0.5) * inv);
        bilinear_sample(image, sx - 0.5, sy - 0.5)
    })
}

/// Bilinear sample at continuous pixel coordinates, black outside.
fn bilinear_sample(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let get = |px: i64, py: i64| -> [f32; 3] {
        if px < 0 || py < 0 || px >= w || py >= h {
            [0.0; 3]
        } else {
            image.get_pixel(px as u32, py as u32).0.map(|c| c as f32)
        }
    };

    let tl = get(x0, y0);
    let tr = get(x0 + 1, y0);
    let bl = get(x0, y0 + 1);
    let br = get(x0 + 1, y0 + 1);

    Rgb(std::array::from_fn(|c| {
        let top = tl[c] * (1.0 - fx) + tr[c] * fx;
        let bot = bl[c] * (1.0 - fx) + br[c] * fx;
        (top * (1.0 - fy) + bot * fy).round().clamp(0.0, 255.0) as u8
    }))
}
