use crate::{CapturedFrame, FrameRenderer, Marker};
use anyhow::Result;

/// Renderer that burns the marker into a copy of the frame.
///
/// Keeps the latest composed image for whatever presents it.
pub struct OverlayCompositor {
    color: [u8; 4],
    composed: Option<CapturedFrame>,
    frames_rendered: u64,
}

impl OverlayCompositor {
    pub fn new(color: [u8; 4]) -> Self {
        Self {
            color,
            composed: None,
            frames_rendered: 0,
        }
    }

    /// The most recently composed frame.
    pub fn composed(&self) -> Option<&CapturedFrame> {
        self.composed.as_ref()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

impl Default for OverlayCompositor {
    fn default() -> Self {
        Self::new([0, 255, 0, 255])
    }
}

impl FrameRenderer for OverlayCompositor {
    fn render(&mut self, frame: &CapturedFrame, marker: Option<Marker>) -> Result<()> {
        let mut out = frame.clone();
        if let Some(marker) = marker {
            draw_ring(&mut out, marker, self.color);
        }
        self.composed = Some(out);
        self.frames_rendered += 1;
        Ok(())
    }
}

/// Rasterize a ring of thickness `radius / 2` centered on the marker radius.
fn draw_ring(frame: &mut CapturedFrame, marker: Marker, color: [u8; 4]) {
    if frame.width == 0 || frame.height == 0 || !marker.radius.is_finite() || marker.radius <= 0.0 {
        return;
    }
    let half = (marker.radius / 4.0).max(0.5);
    let inner = marker.radius - half;
    let outer = marker.radius + half;
    let c = marker.center;

    let x0 = (c.x - outer).floor().max(0.0);
    let y0 = (c.y - outer).floor().max(0.0);
    let x1 = (c.x + outer).ceil().min((frame.width - 1) as f32);
    let y1 = (c.y + outer).ceil().min((frame.height - 1) as f32);
    if x0 > x1 || y0 > y1 {
        return;
    }

    for y in y0 as u32..=y1 as u32 {
        for x in x0 as u32..=x1 as u32 {
            let d = glam::Vec2::new(x as f32, y as f32).distance(c);
            if d >= inner && d <= outer {
                let i = ((y * frame.width + x) * 4) as usize;
                if let Some(px) = frame.data.get_mut(i..i + 4) {
                    px.copy_from_slice(&color);
                }
            }
        }
    }
}
