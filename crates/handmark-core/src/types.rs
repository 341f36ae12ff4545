use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of landmarks in the hand skeleton topology.
pub const NUM_LANDMARKS: usize = 21;

/// Names for the 21 hand skeleton landmarks, in model output order.
///
/// - **CMC**: carpometacarpal joint, the lowest joint of the thumb.
/// - **MCP**: metacarpophalangeal joint, the knuckles near the palm.
/// - **PIP** / **DIP**: proximal / distal interphalangeal joints.
/// - **IP**: the thumb's single interphalangeal joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum LandmarkId {
    Wrist = 0,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl LandmarkId {
    pub const ALL: [LandmarkId; NUM_LANDMARKS] = {
        use LandmarkId::*;
        [
            Wrist,
            ThumbCmc,
            ThumbMcp,
            ThumbIp,
            ThumbTip,
            IndexFingerMcp,
            IndexFingerPip,
            IndexFingerDip,
            IndexFingerTip,
            MiddleFingerMcp,
            MiddleFingerPip,
            MiddleFingerDip,
            MiddleFingerTip,
            RingFingerMcp,
            RingFingerPip,
            RingFingerDip,
            RingFingerTip,
            PinkyMcp,
            PinkyPip,
            PinkyDip,
            PinkyTip,
        ]
    };

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl From<LandmarkId> for u8 {
    fn from(id: LandmarkId) -> u8 {
        id as u8
    }
}

impl TryFrom<u8> for LandmarkId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value as usize).ok_or_else(|| format!("landmark id out of range: {value}"))
    }
}

/// A landmark as reported by the detector, x/y normalized to [0, 1] of the
/// image width/height. `z` is relative depth with the wrist as origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// One hand as returned by a [`HandLandmarker`](crate::detector::HandLandmarker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedHand {
    pub landmarks: [NormalizedLandmark; NUM_LANDMARKS],
    /// Hand presence score in [0, 1].
    pub presence: f32,
    pub handedness: Handedness,
}

impl NormalizedHand {
    pub fn landmark(&self, id: LandmarkId) -> NormalizedLandmark {
        self.landmarks[id.index()]
    }
}

/// A landmark in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: LandmarkId,
    pub x: i32,
    pub y: i32,
}

/// Prints as the tuple `(id, x, y)`.
impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id as u8, self.x, self.y)
    }
}

/// Scale a normalized coordinate to pixels: `floor(n * extent)`.
///
/// No clamping: out-of-range model output maps outside the image.
pub fn to_pixel(normalized: f32, extent: u32) -> i32 {
    // f32 products round up across integer boundaries (0.01 * 100 -> 1.0).
    (f64::from(normalized) * f64::from(extent)).floor() as i32
}

/// The 21 pixel-space landmarks of one detected hand, indexed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hand {
    handedness: Handedness,
    landmarks: [Landmark; NUM_LANDMARKS],
}

impl Hand {
    /// Scale a detector hand into a `width` x `height` image.
    pub fn from_normalized(hand: &NormalizedHand, width: u32, height: u32) -> Self {
        let landmarks = std::array::from_fn(|i| {
            let lm = hand.landmarks[i];
            Landmark {
                id: LandmarkId::ALL[i],
                x: to_pixel(lm.x, width),
                y: to_pixel(lm.y, height),
            }
        });
        Self {
            handedness: hand.handedness,
            landmarks,
        }
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    pub fn landmarks(&self) -> &[Landmark; NUM_LANDMARKS] {
        &self.landmarks
    }

    pub fn get(&self, id: LandmarkId) -> Landmark {
        self.landmarks[id.index()]
    }

    pub fn wrist(&self) -> Landmark {
        self.get(LandmarkId::Wrist)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.iter()
    }
}
