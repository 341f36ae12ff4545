use handmark_hw::Frame;
use minifb::{Key, Window, WindowOptions};
use thiserror::Error;

pub const WINDOW_TITLE: &str = "Image";

/// Redraw cap; high enough that the window never throttles capture.
const WINDOW_TARGET_FPS: usize = 1000;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("failed to open window: {0}")]
    Open(String),
    #[error("failed to update window: {0}")]
    Update(String),
}

/// Where annotated frames go.
pub trait FrameSink {
    /// False once the viewer asked to stop.
    fn is_open(&self) -> bool;
    fn show(&mut self, frame: &Frame) -> Result<(), DisplayError>;
}

/// On-screen window. Opened on the first frame so it matches the
/// negotiated capture size; closed by the window manager or Escape.
pub struct WindowSink {
    title: String,
    window: Option<Window>,
    buffer: Vec<u32>,
}

impl WindowSink {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            window: None,
            buffer: Vec::new(),
        }
    }
}

impl FrameSink for WindowSink {
    fn is_open(&self) -> bool {
        self.window
            .as_ref()
            .map_or(true, |w| w.is_open() && !w.is_key_down(Key::Escape))
    }

    fn show(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let (width, height) = (frame.width() as usize, frame.height() as usize);

        if self.window.is_none() {
            let mut window = Window::new(&self.title, width, height, WindowOptions::default())
                .map_err(|e| DisplayError::Open(e.to_string()))?;
            window.set_target_fps(WINDOW_TARGET_FPS);
            tracing::debug!(width, height, "display window opened");
            self.window = Some(window);
        }

        rgb_to_argb(frame.image.as_raw(), &mut self.buffer);
        if let Some(window) = &mut self.window {
            window
                .update_with_buffer(&self.buffer, width, height)
                .map_err(|e| DisplayError::Update(e.to_string()))?;
        }
        Ok(())
    }
}

/// Discards frames; runs until the frame limit or an error.
pub struct HeadlessSink;

impl FrameSink for HeadlessSink {
    fn is_open(&self) -> bool {
        true
    }

    fn show(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        tracing::trace!(seq = frame.sequence, "frame dropped (headless)");
        Ok(())
    }
}

/// Pack interleaved RGB bytes into minifb's `0RGB` words.
fn rgb_to_argb(rgb: &[u8], out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        rgb.chunks_exact(3)
            .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32),
    );
}
