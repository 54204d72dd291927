#![allow(dead_code)]

use framecull_core::{CoreError, CoreResult, Frame, FrameSource};
use image::{Rgb, RgbImage};

/// In-memory frame source with an optional failure after N frames.
pub struct SyntheticSource {
    frames: Vec<RgbImage>,
    fps: f64,
    next: usize,
    fail_after: Option<usize>,
    fail_at_open: bool,
}

impl SyntheticSource {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self {
            frames,
            fps,
            next: 0,
            fail_after: None,
            fail_at_open: false,
        }
    }

    pub fn failing_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn unreadable(mut self) -> Self {
        self.fail_at_open = true;
        self
    }
}

impl FrameSource for SyntheticSource {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn expected_frame_count(&self) -> Option<u64> {
        Some(self.frames.len() as u64)
    }

    fn next_frame(&mut self) -> CoreResult<Option<Frame>> {
        if self.fail_at_open {
            return Err(CoreError::SourceUnreadable("corrupt header".to_string()));
        }
        if self.fail_after == Some(self.next) {
            return Err(CoreError::OperationFailed("truncated packet".to_string()));
        }
        let Some(image) = self.frames.get(self.next).cloned() else {
            return Ok(None);
        };
        let frame = Frame::new(self.next as u64, self.fps, image);
        self.next += 1;
        Ok(Some(frame))
    }
}

/// A uniform gray frame.
pub fn solid(value: u8) -> RgbImage {
    RgbImage::from_pixel(16, 12, Rgb([value, value, value]))
}

/// Frames 0-4 bit-identical, frames 5-9 each distinct.
pub fn five_static_five_distinct() -> Vec<RgbImage> {
    let mut frames = vec![solid(40); 5];
    frames.extend((0..5).map(|i| solid(100 + i * 20)));
    frames
}
