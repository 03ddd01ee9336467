use crate::{CapturedFrame, VideoSource};
use anyhow::{bail, Result};
use std::time::{Duration, Instant};
use tracing::info;

/// Side of one checkerboard square, in pixels.
const CHECKER_SIZE: u32 = 32;
const BASE_COLOR: [u8; 3] = [40, 80, 160];
/// Brightness of the dark squares relative to the light ones.
const DARK_FACTOR: f32 = 0.7;

/// Synthetic camera producing a checkerboard test pattern.
///
/// Stands in for a real camera when none is attached. With a frame rate set
/// it blocks until the next frame is due, the way a device read does.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    /// RGBA checkerboard, built once and cloned per frame.
    cached_frame: Vec<u8>,
    frame_interval: Option<Duration>,
    next_due: Option<Instant>,
    sequence: u64,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("Invalid test pattern size {width}x{height}");
        }
        let light = BASE_COLOR;
        let dark = BASE_COLOR.map(|c| (c as f32 * DARK_FACTOR) as u8);
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .flat_map(|(x, y)| {
                let [r, g, b] = if (x / CHECKER_SIZE + y / CHECKER_SIZE) % 2 == 0 { light } else { dark };
                [r, g, b, 255]
            })
            .collect();
        info!(width, height, "Test pattern ready");

        Ok(Self {
            width,
            height,
            cached_frame: data,
            frame_interval: None,
            next_due: None,
            sequence: 0,
        })
    }

    /// Pace capture to `fps` frames per second.
    pub fn with_frame_rate(mut self, fps: f32) -> Self {
        self.frame_interval = (fps > 0.0).then(|| Duration::from_secs_f32(1.0 / fps));
        self
    }
}

impl VideoSource for TestPatternSource {
    fn try_capture(&mut self) -> Result<Option<CapturedFrame>> {
        if let Some(interval) = self.frame_interval {
            let now = Instant::now();
            if let Some(due) = self.next_due {
                if due > now {
                    std::thread::sleep(due - now);
                }
            }
            self.next_due = Some(self.next_due.map_or(now, |due| due.max(now)) + interval);
        }

        self.sequence += 1;
        Ok(Some(CapturedFrame {
            data: self.cached_frame.clone(),
            width: self.width,
            height: self.height,
            sequence: self.sequence,
        }))
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
