//! Skeleton, marker and text overlays on RGB images.
//!
//! Rendering goes through `embedded-graphics` primitives on a thin
//! [`DrawTarget`] wrapper around the image buffer. All operations clip to
//! the image bounds.

use crate::types::{LandmarkId, NormalizedHand, NormalizedLandmark, NUM_LANDMARKS};
use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle},
    text::{Baseline, Text},
};
use image::{Rgb, RgbImage};
use std::convert::Infallible;

/// The fixed hand skeleton: palm outline, then each finger base → tip.
pub const HAND_CONNECTIONS: [(LandmarkId, LandmarkId); 21] = {
    use LandmarkId::*;
    [
        // Palm
        (Wrist, ThumbCmc),
        (Wrist, IndexFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (Wrist, PinkyMcp),
        // Thumb
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

const RED: Rgb<u8> = Rgb([255, 48, 48]);
const GREEN: Rgb<u8> = Rgb([48, 255, 48]);
const BLUE: Rgb<u8> = Rgb([21, 101, 192]);
const YELLOW: Rgb<u8> = Rgb([255, 204, 0]);
const GRAY: Rgb<u8> = Rgb([128, 128, 128]);
const PURPLE: Rgb<u8> = Rgb([128, 64, 128]);
const PEACH: Rgb<u8> = Rgb([255, 229, 180]);
const WHITE: Rgb<u8> = Rgb([224, 224, 224]);

const LANDMARK_RADIUS: u32 = 5;
const THICKNESS_PALM: u32 = 3;
const THICKNESS_FINGER: u32 = 2;

/// Appearance of one landmark dot or connection line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawingSpec {
    pub color: Rgb<u8>,
    /// Line width; ignored for landmark dots, which are filled.
    pub thickness: u32,
    pub circle_radius: u32,
}

/// Which finger (or the palm) a landmark belongs to.
fn finger_color(id: LandmarkId) -> Rgb<u8> {
    use LandmarkId::*;
    match id {
        Wrist | ThumbCmc | IndexFingerMcp | MiddleFingerMcp | RingFingerMcp | PinkyMcp => RED,
        ThumbMcp | ThumbIp | ThumbTip => PEACH,
        IndexFingerPip | IndexFingerDip | IndexFingerTip => PURPLE,
        MiddleFingerPip | MiddleFingerDip | MiddleFingerTip => YELLOW,
        RingFingerPip | RingFingerDip | RingFingerTip => GREEN,
        PinkyPip | PinkyDip | PinkyTip => BLUE,
    }
}

/// Per-landmark style: palm joints red, each finger its own color.
pub fn default_hand_landmarks_style() -> [DrawingSpec; NUM_LANDMARKS] {
    LandmarkId::ALL.map(|id| DrawingSpec {
        color: finger_color(id),
        thickness: 1,
        circle_radius: LANDMARK_RADIUS,
    })
}

/// Per-connection style, parallel to [`HAND_CONNECTIONS`]: gray palm
/// outline, fingers in their landmark colors.
pub fn default_hand_connections_style() -> [DrawingSpec; 21] {
    HAND_CONNECTIONS.map(|(from, to)| {
        if finger_color(to) == RED {
            DrawingSpec {
                color: GRAY,
                thickness: THICKNESS_PALM,
                circle_radius: LANDMARK_RADIUS,
            }
        } else {
            DrawingSpec {
                color: finger_color(if finger_color(from) == RED { to } else { from }),
                thickness: THICKNESS_FINGER,
                circle_radius: LANDMARK_RADIUS,
            }
        }
    })
}

/// Normalized → pixel for drawing. `None` for coordinates outside [0, 1].
fn to_draw_point(lm: &NormalizedLandmark, width: u32, height: u32) -> Option<Point> {
    let valid = |v: f32| (0.0..=1.0).contains(&v);
    if !valid(lm.x) || !valid(lm.y) {
        return None;
    }
    let x = ((lm.x * width as f32).floor() as u32).min(width.saturating_sub(1));
    let y = ((lm.y * height as f32).floor() as u32).min(height.saturating_sub(1));
    Some(Point::new(x as i32, y as i32))
}

/// Overlay a hand skeleton: connections first, then a white-bordered dot
/// per landmark. Landmarks outside the image are skipped, as are the
/// connections touching them.
pub fn draw_landmarks(
    image: &mut RgbImage,
    hand: &NormalizedHand,
    landmark_style: &[DrawingSpec; NUM_LANDMARKS],
    connection_style: &[DrawingSpec; 21],
) {
    let (w, h) = image.dimensions();
    let points: [Option<Point>; NUM_LANDMARKS] =
        std::array::from_fn(|i| to_draw_point(&hand.landmarks[i], w, h));
    let mut canvas = Canvas(image);

    for ((from, to), spec) in HAND_CONNECTIONS.iter().zip(connection_style) {
        if let (Some(a), Some(b)) = (points[from.index()], points[to.index()]) {
            draw(
                Line::new(a, b).into_styled(PrimitiveStyle::with_stroke(color(spec.color), spec.thickness)),
                &mut canvas,
            );
        }
    }

    for (point, spec) in points.iter().zip(landmark_style) {
        let Some(center) = *point else { continue };
        let border = (spec.circle_radius + 1).max(spec.circle_radius * 6 / 5);
        draw(
            Circle::with_center(center, 2 * border + 1).into_styled(PrimitiveStyle::with_fill(color(WHITE))),
            &mut canvas,
        );
        draw(
            Circle::with_center(center, 2 * spec.circle_radius + 1)
                .into_styled(PrimitiveStyle::with_fill(color(spec.color))),
            &mut canvas,
        );
    }
}

/// Hollow 1 px circle centered on `center`.
pub fn circle(image: &mut RgbImage, center: (i32, i32), radius: u32, rgb: Rgb<u8>) {
    draw(
        Circle::with_center(Point::new(center.0, center.1), 2 * radius + 1)
            .into_styled(PrimitiveStyle::with_stroke(color(rgb), 1)),
        &mut Canvas(image),
    );
}

/// Monospace text with its baseline starting at `origin`.
pub fn text(image: &mut RgbImage, origin: (i32, i32), string: &str, rgb: Rgb<u8>) {
    let style = MonoTextStyle::new(&FONT_10X20, color(rgb));
    draw(
        Text::with_baseline(string, Point::new(origin.0, origin.1), style, Baseline::Alphabetic),
        &mut Canvas(image),
    );
}

fn color(rgb: Rgb<u8>) -> Rgb888 {
    Rgb888::new(rgb.0[0], rgb.0[1], rgb.0[2])
}

fn draw<D: Drawable<Color = Rgb888>>(item: D, canvas: &mut Canvas<'_>) {
    match item.draw(canvas) {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

/// Clipping draw target over an RGB image.
struct Canvas<'a>(&'a mut RgbImage);

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, c) in pixels {
            if point.x >= 0
                && (point.x as u32) < self.0.width()
                && point.y >= 0
                && (point.y as u32) < self.0.height()
            {
                self.0
                    .put_pixel(point.x as u32, point.y as u32, Rgb([c.r(), c.g(), c.b()]));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Handedness;

    fn hand_at(x: f32, y: f32) -> NormalizedHand {
        NormalizedHand {
            landmarks: [NormalizedLandmark { x, y, z: 0.0 }; NUM_LANDMARKS],
            presence: 1.0,
            handedness: Handedness::Right,
        }
    }

    #[test]
    fn test_connections_cover_all_landmarks() {
        let mut seen = [false; NUM_LANDMARKS];
        for (a, b) in HAND_CONNECTIONS {
            seen[a.index()] = true;
            seen[b.index()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_default_styles() {
        let landmarks = default_hand_landmarks_style();
        assert_eq!(landmarks[LandmarkId::Wrist.index()].color, RED);
        assert_eq!(landmarks[LandmarkId::ThumbTip.index()].color, PEACH);
        assert_eq!(landmarks[LandmarkId::PinkyTip.index()].color, BLUE);

        let connections = default_hand_connections_style();
        // (Wrist, ThumbCmc) is palm outline.
        assert_eq!(connections[0].color, GRAY);
        assert_eq!(connections[0].thickness, THICKNESS_PALM);
        // (IndexFingerMcp, IndexFingerPip) takes the index finger color.
        assert_eq!(connections[9].color, PURPLE);
        assert_eq!(connections[9].thickness, THICKNESS_FINGER);
    }

    #[test]
    fn test_to_draw_point() {
        let lm = |x, y| NormalizedLandmark { x, y, z: 0.0 };
        assert_eq!(to_draw_point(&lm(0.5, 0.5), 640, 480), Some(Point::new(320, 240)));
        assert_eq!(to_draw_point(&lm(1.0, 1.0), 640, 480), Some(Point::new(639, 479)));
        assert_eq!(to_draw_point(&lm(-0.01, 0.5), 640, 480), None);
        assert_eq!(to_draw_point(&lm(0.5, 1.2), 640, 480), None);
    }

    #[test]
    fn test_draw_landmarks_marks_image() {
        let mut img = RgbImage::new(100, 100);
        draw_landmarks(
            &mut img,
            &hand_at(0.5, 0.5),
            &default_hand_landmarks_style(),
            &default_hand_connections_style(),
        );
        // Last dot drawn is the pinky tip.
        assert_eq!(img.get_pixel(50, 50), &BLUE);
        // White border ring around it.
        assert_eq!(img.get_pixel(56, 50), &WHITE);
        assert_eq!(img.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_landmarks_skips_out_of_frame() {
        let mut img = RgbImage::new(50, 50);
        draw_landmarks(
            &mut img,
            &hand_at(1.5, 0.5),
            &default_hand_landmarks_style(),
            &default_hand_connections_style(),
        );
        assert!(img.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_circle_is_hollow() {
        let mut img = RgbImage::new(60, 60);
        let magenta = Rgb([255, 0, 255]);
        circle(&mut img, (30, 30), 15, magenta);
        assert_eq!(img.get_pixel(30, 30), &Rgb([0, 0, 0]));
        assert!(img.pixels().any(|p| *p == magenta));
    }

    #[test]
    fn test_circle_clips_at_edges() {
        let mut img = RgbImage::new(10, 10);
        circle(&mut img, (0, 0), 15, Rgb([255, 0, 255]));
        circle(&mut img, (-100, -100), 15, Rgb([255, 0, 255]));
    }

    #[test]
    fn test_text_draws_pixels() {
        let mut img = RgbImage::new(80, 60);
        let blue = Rgb([0, 0, 255]);
        text(&mut img, (10, 50), "30", blue);
        assert!(img.pixels().any(|p| *p == blue));
    }
}
