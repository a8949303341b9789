use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

/// Pixel layout of a decoded video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 8-bit RGB
    Rgb24,
    /// Packed 8-bit RGBA
    Rgba32,
}

impl PixelFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba32 => 4,
        }
    }
}

/// Decoded video frame as delivered by a media stream
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Sequence number within the stream
    pub id: u64,
    /// Timestamp when the frame was produced
    pub timestamp: SystemTime,
    /// Pixel data (shared ownership, frames are cloned into watch channels)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: PixelFormat,
}

impl VideoFrame {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// A frame can be drawn when it has area and a complete pixel buffer
    pub fn is_decodable(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_size()
    }
}

/// JPEG still taken from a live session
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    id: Uuid,
    jpeg: Bytes,
    width: u32,
    height: u32,
    captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    pub(crate) fn new(jpeg: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            jpeg: Bytes::from(jpeg),
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn jpeg(&self) -> &Bytes {
        &self.jpeg
    }

    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_properties() {
        assert_eq!(PixelFormat::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Rgba32.bytes_per_pixel(), 4);
    }

    #[test]
    fn test_frame_decodability() {
        let valid = VideoFrame::new(1, SystemTime::now(), vec![0u8; 4 * 2 * 3], 4, 2, PixelFormat::Rgb24);
        assert!(valid.is_decodable());

        let truncated = VideoFrame::new(2, SystemTime::now(), vec![0u8; 10], 4, 2, PixelFormat::Rgb24);
        assert!(!truncated.is_decodable());

        let empty = VideoFrame::new(3, SystemTime::now(), Vec::new(), 0, 0, PixelFormat::Rgb24);
        assert!(!empty.is_decodable());

        let rgba = VideoFrame::new(4, SystemTime::now(), vec![0u8; 4 * 2 * 4], 4, 2, PixelFormat::Rgba32);
        assert!(rgba.is_decodable());
    }

    #[test]
    fn test_captured_frame_accessors() {
        let frame = CapturedFrame::new(vec![0xFF, 0xD8, 0xFF, 0xD9], 640, 480);
        assert_eq!(frame.dimensions(), (640, 480));
        assert_eq!(frame.len(), 4);
        assert!(!frame.is_empty());
        assert!(frame.captured_at() <= Utc::now());
    }
}
