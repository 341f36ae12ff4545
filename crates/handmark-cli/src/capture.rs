//! Live capture loop: read a frame, find hands, print the first hand's
//! wrist, overlay the frame rate and show the result until the sink closes.

use crate::display::{DisplayError, FrameSink};
use handmark_core::{draw, DetectorError, HandDetector, HandLandmarker};
use handmark_hw::{CameraError, Frame, FrameStream};
use image::Rgb;
use std::io::Write;
use std::time::{Duration, Instant};
use thiserror::Error;

const FPS_ORIGIN: (i32, i32) = (10, 50);
const FPS_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("display error: {0}")]
    Display(#[from] DisplayError),
    #[error("failed to write landmarks: {0}")]
    Output(#[from] std::io::Error),
}

/// Anything that yields RGB frames.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

impl FrameSource for FrameStream<'_> {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        FrameStream::next_frame(self)
    }
}

/// Whole frames per second for one frame interval; `None` when no time
/// has elapsed.
pub fn frame_rate(elapsed: Duration) -> Option<u32> {
    if elapsed.is_zero() {
        return None;
    }
    Some((1.0 / elapsed.as_secs_f64()).floor() as u32)
}

/// Frame rate from the interval between consecutive ticks.
pub struct FpsMeter {
    previous: Instant,
}

impl FpsMeter {
    pub fn new(start: Instant) -> Self {
        Self { previous: start }
    }

    pub fn tick(&mut self, now: Instant) -> Option<u32> {
        let elapsed = now.saturating_duration_since(self.previous);
        self.previous = now;
        frame_rate(elapsed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub frames: u64,
    /// Frames in which at least one hand was found.
    pub frames_with_hands: u64,
}

pub struct CaptureContext<'a, L> {
    source: Box<dyn FrameSource + 'a>,
    detector: HandDetector<L>,
    sink: Box<dyn FrameSink + 'a>,
    max_frames: Option<u64>,
}

impl<'a, L: HandLandmarker> CaptureContext<'a, L> {
    pub fn new(
        source: Box<dyn FrameSource + 'a>,
        detector: HandDetector<L>,
        sink: Box<dyn FrameSink + 'a>,
        max_frames: Option<u64>,
    ) -> Self {
        Self {
            source,
            detector,
            sink,
            max_frames,
        }
    }

    /// Run until the sink closes, the frame limit is reached or an error
    /// occurs. The first hand's wrist is written to `out` once per frame.
    pub fn run(&mut self, out: &mut impl Write) -> Result<CaptureSummary, CaptureError> {
        let mut summary = CaptureSummary::default();
        let mut fps = FpsMeter::new(Instant::now());

        while self.sink.is_open() {
            if self.max_frames.is_some_and(|max| summary.frames >= max) {
                tracing::debug!(frames = summary.frames, "frame limit reached");
                break;
            }

            let mut frame = self.source.next_frame()?;
            let hands = self.detector.find_hands(&mut frame, true, true)?;

            if let Some(hand) = hands.first() {
                writeln!(out, "{}", hand.wrist())?;
                summary.frames_with_hands += 1;
            }

            if let Some(rate) = fps.tick(frame.timestamp) {
                draw::text(&mut frame.image, FPS_ORIGIN, &rate.to_string(), FPS_COLOR);
            }

            self.sink.show(&frame)?;
            summary.frames += 1;
        }

        tracing::info!(
            frames = summary.frames,
            with_hands = summary.frames_with_hands,
            "capture stopped"
        );
        Ok(summary)
    }
}
