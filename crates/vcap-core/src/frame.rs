//! Frames handed to the pipeline.
//!
//! Pixel layout is opaque to the core; the format tag only travels along so
//! backends can interpret the buffer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Pixel formats a frame buffer may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// RGB with 8 bits per channel (24 bits per pixel)
    Rgb8,
    /// RGBA with 8 bits per channel (32 bits per pixel)
    Rgba8,
    /// BGR with 8 bits per channel (OpenCV default)
    #[default]
    Bgr8,
    /// Grayscale 8-bit
    Gray8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Rgba8 => 4,
            Self::Gray8 => 1,
        }
    }
}

/// One decoded video frame.
///
/// The buffer is reference counted so a frame can be handed to several
/// batch queues without copying.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    /// Capture time in seconds
    pub timestamp: f64,
}

impl Frame {
    pub fn new(data: impl Into<Arc<[u8]>>, width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            format,
            timestamp: 0.0,
        }
    }

    /// An all-zero frame of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        let format = FrameFormat::default();
        let len = Self::expected_size(width, height, format);
        Self::new(vec![0u8; len], width, height, format)
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Get the expected frame data size for a given format
    pub fn expected_size(width: u32, height: u32, format: FrameFormat) -> usize {
        width as usize * height as usize * format.bytes_per_pixel()
    }

    /// True if the buffer is large enough for the declared size and format.
    pub fn is_complete(&self) -> bool {
        self.data.len() >= Self::expected_size(self.width, self.height, self.format)
    }
}
