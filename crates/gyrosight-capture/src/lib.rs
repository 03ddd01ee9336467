pub mod overlay;
pub mod pattern;

use anyhow::Result;
use glam::Vec2;

pub use overlay::OverlayCompositor;
pub use pattern::TestPatternSource;

/// A captured video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// RGBA8 pixel data.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Capture counter assigned by the source.
    pub sequence: u64,
}

impl CapturedFrame {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// RGBA value at `(x, y)`, if inside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        let px = self.data.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Pull-based video input.
pub trait VideoSource: Send {
    /// Get the next frame, blocking until the device delivers one.
    /// Returns `None` if no new frame is available.
    fn try_capture(&mut self) -> Result<Option<CapturedFrame>>;

    /// Configured frame size in pixels.
    fn dimensions(&self) -> (u32, u32);
}

/// Circular marker drawn over a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    /// Center in pixel coordinates.
    pub center: Vec2,
    /// Radius in pixels.
    pub radius: f32,
}

/// Display output.
pub trait FrameRenderer {
    /// Show `frame`, with `marker` on top if given.
    fn render(&mut self, frame: &CapturedFrame, marker: Option<Marker>) -> Result<()>;
}
