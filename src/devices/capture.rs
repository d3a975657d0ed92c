use crate::error::CaptureError;
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicU64, Ordering};

/// A source of full RGBA frames.
///
/// Dimensions are read from every returned frame, so a surface may change size
/// between calls.
pub trait CaptureSurface: Send + Sync {
    fn capture_frame(&self) -> Result<RgbaImage, CaptureError>;
}

/// Live capture of the primary display.
#[cfg(feature = "screen")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ScreenCapture;

#[cfg(feature = "screen")]
impl CaptureSurface for ScreenCapture {
    fn capture_frame(&self) -> Result<RgbaImage, CaptureError> {
        // Enumerated per frame: monitors come and go, and resolutions change.
        let monitors = xcap::Monitor::all().map_err(|error| CaptureError::Backend(error.to_string()))?;
        let primary = monitors.iter().position(|monitor| monitor.is_primary()).unwrap_or(0);
        let monitor = monitors.get(primary).ok_or(CaptureError::NoDisplay)?;

        let frame = monitor
            .capture_image()
            .map_err(|error| CaptureError::Backend(error.to_string()))?;
        if frame.width() == 0 || frame.height() == 0 {
            return Err(CaptureError::EmptyFrame);
        }
        Ok(frame)
    }
}

/// A synthetic surface: four slowly cycling color bands (left, top, right, bottom)
/// around a dark center. Each call advances the animation by one step.
#[derive(Debug)]
pub struct TestPattern {
    width: u32,
    height: u32,
    step: AtomicU64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            step: AtomicU64::new(0),
        }
    }

    fn band_color(phase: f32) -> Rgba<u8> {
        use std::f32::consts::TAU;
        let channel = |offset: f32| ((((phase + offset) * TAU).sin() * 0.5 + 0.5) * 255.0) as u8;
        Rgba([channel(0.0), channel(1.0 / 3.0), channel(2.0 / 3.0), 255])
    }
}

impl CaptureSurface for TestPattern {
    fn capture_frame(&self) -> Result<RgbaImage, CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::EmptyFrame);
        }

        let step = self.step.fetch_add(1, Ordering::Relaxed);
        let phase = (step % 600) as f32 / 600.0;
        let bands = [
            Self::band_color(phase),
            Self::band_color(phase + 0.25),
            Self::band_color(phase + 0.5),
            Self::band_color(phase + 0.75),
        ];
        let (width, height) = (self.width, self.height);

        Ok(RgbaImage::from_fn(width, height, |x, y| {
            let fx = x as f32 / width as f32;
            let fy = y as f32 / height as f32;
            if fx < 0.2 {
                bands[0]
            } else if fy < 0.2 {
                bands[1]
            } else if fx >= 0.8 {
                bands[2]
            } else if fy >= 0.8 {
                bands[3]
            } else {
                Rgba([20, 20, 24, 255])
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_animates() {
        let pattern = TestPattern::new(40, 30);
        let first = pattern.capture_frame().unwrap();
        let second = pattern.capture_frame().unwrap();
        assert_eq!(first.dimensions(), (40, 30));
        assert_ne!(first.get_pixel(0, 15), second.get_pixel(0, 15));
        // Center stays dark.
        assert_eq!(first.get_pixel(20, 15), &Rgba([20, 20, 24, 255]));
    }

    #[test]
    fn empty_pattern_is_a_capture_error() {
        assert!(matches!(TestPattern::new(0, 10).capture_frame(), Err(CaptureError::EmptyFrame)));
    }
}
