use crate::error::CameraError;
use crate::frame::{CapturedFrame, PixelFormat, VideoFrame};
use crate::surface::DisplaySurface;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, RgbImage, RgbaImage};
use tracing::{debug, warn};

/// Snapshot the surface's current frame as a JPEG.
///
/// Fails with `CaptureFailed` when the surface has no ready frame, reports
/// zero dimensions, or the encoder fails. The camera is left untouched
/// either way.
pub fn capture_frame(surface: &dyn DisplaySurface, quality: u8) -> Result<CapturedFrame, CameraError> {
    let (width, height) = surface.dimensions();
    if width == 0 || height == 0 {
        return Err(CameraError::capture_failed("video surface has no dimensions yet"));
    }

    let frame = surface
        .current_frame()
        .ok_or_else(|| CameraError::capture_failed("no decoded frame is available"))?;

    encode_frame(&frame, quality)
}

/// Encode a decoded frame at its native size
pub fn encode_frame(frame: &VideoFrame, quality: u8) -> Result<CapturedFrame, CameraError> {
    if !frame.is_decodable() {
        return Err(CameraError::capture_failed(format!(
            "frame {} is incomplete ({}x{}, {} bytes)",
            frame.id,
            frame.width,
            frame.height,
            frame.data.len()
        )));
    }

    let raster = draw_raster(frame)?;

    let mut jpeg = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
        encoder
            .encode(raster.as_raw(), raster.width(), raster.height(), ColorType::Rgb8)
            .map_err(|e| {
                warn!("JPEG encoding of frame {} failed: {}", frame.id, e);
                CameraError::capture_failed(format!("JPEG encoding failed: {}", e))
            })?;
    }

    if jpeg.is_empty() {
        return Err(CameraError::capture_failed("encoder produced no data"));
    }

    debug!(
        "Captured frame {} as {}x{} JPEG ({} bytes, quality {})",
        frame.id,
        frame.width,
        frame.height,
        jpeg.len(),
        quality
    );

    Ok(CapturedFrame::new(jpeg, frame.width, frame.height))
}

/// Copy the frame into an off-screen RGB raster of the same size
fn draw_raster(frame: &VideoFrame) -> Result<RgbImage, CameraError> {
    let pixels = frame.data.as_ref().clone();
    let raster = match frame.format {
        PixelFormat::Rgb24 => RgbImage::from_raw(frame.width, frame.height, pixels),
        PixelFormat::Rgba32 => RgbaImage::from_raw(frame.width, frame.height, pixels)
            .map(|rgba| DynamicImage::ImageRgba8(rgba).to_rgb8()),
    };

    raster.ok_or_else(|| CameraError::capture_failed("pixel buffer does not match frame size"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn rgb_frame(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128]);
            }
        }
        VideoFrame::new(7, SystemTime::now(), data, width, height, PixelFormat::Rgb24)
    }

    #[test]
    fn test_encode_preserves_native_dimensions() {
        let frame = rgb_frame(320, 240);
        let captured = encode_frame(&frame, 80).unwrap();

        assert_eq!(captured.dimensions(), (320, 240));
        assert!(!captured.is_empty());
        assert_eq!(&captured.jpeg()[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(captured.jpeg()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 240));
    }

    #[test]
    fn test_encode_rgba_frame() {
        let frame = VideoFrame::new(1, SystemTime::now(), vec![200u8; 16 * 8 * 4], 16, 8, PixelFormat::Rgba32);
        let captured = encode_frame(&frame, 80).unwrap();
        assert_eq!(captured.dimensions(), (16, 8));
    }

    #[test]
    fn test_lower_quality_produces_smaller_output() {
        let frame = rgb_frame(256, 256);
        let high = encode_frame(&frame, 95).unwrap();
        let low = encode_frame(&frame, 20).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_incomplete_frame_is_rejected() {
        let frame = VideoFrame::new(2, SystemTime::now(), vec![0u8; 10], 320, 240, PixelFormat::Rgb24);
        let err = encode_frame(&frame, 80).unwrap_err();
        assert!(matches!(err, CameraError::CaptureFailed { .. }));

        let empty = VideoFrame::new(3, SystemTime::now(), Vec::new(), 0, 0, PixelFormat::Rgb24);
        assert!(matches!(
            encode_frame(&empty, 80),
            Err(CameraError::CaptureFailed { .. })
        ));
    }
}
