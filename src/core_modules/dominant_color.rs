// THEORY:
// The `dominant_color` module reduces one `ScreenRegion` of a frame to the single
// color a fixture should show. A plain average is a poor choice for this job: black
// letterbox bars drag it toward gray, white UI chrome washes it out, and large
// neutral areas drown the small vivid details a viewer actually notices.
//
// The reduction therefore runs in three steps:
// 1.  **Downsampling**: the region is resampled to a small fixed grid (32x32 by
//     default) with a Lanczos3 filter. This bounds the per-cycle cost regardless of
//     display resolution and avoids the aliasing a nearest-neighbor pick would show.
// 2.  **Brightness gating**: samples whose channel mean is outside the open interval
//     (floor, ceiling) are dropped.
// 3.  **Saturation weighting**: survivors are averaged with weight 1 + chroma / 255,
//     so a fully saturated sample counts twice as much as a gray one.
//
// If the gate rejects every sample (an all-gray or all-black frame) the extractor
// falls back to the unweighted mean of all samples instead of failing.

use crate::core_modules::pixel::{Brightness, Rgb};
use crate::core_modules::region::ScreenRegion;
use image::RgbaImage;
use image::imageops::{self, FilterType};

pub const DEFAULT_SAMPLE_GRID: u32 = 32;
pub const DEFAULT_BRIGHTNESS_FLOOR: Brightness = 15.0;
pub const DEFAULT_BRIGHTNESS_CEILING: Brightness = 240.0;

/// Reduces regions of a frame to one representative color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DominantColorExtractor {
    /// Side length of the square grid a region is resampled to.
    pub sample_grid: u32,
    /// Samples at or below this channel mean are ignored.
    pub brightness_floor: Brightness,
    /// Samples at or above this channel mean are ignored.
    pub brightness_ceiling: Brightness,
}

impl Default for DominantColorExtractor {
    fn default() -> Self {
        Self {
            sample_grid: DEFAULT_SAMPLE_GRID,
            brightness_floor: DEFAULT_BRIGHTNESS_FLOOR,
            brightness_ceiling: DEFAULT_BRIGHTNESS_CEILING,
        }
    }
}

impl DominantColorExtractor {
    pub fn new(sample_grid: u32, brightness_floor: Brightness, brightness_ceiling: Brightness) -> Self {
        Self {
            sample_grid: sample_grid.max(1),
            brightness_floor,
            brightness_ceiling,
        }
    }

    /// The representative color of `region` within `frame`. Regions reaching past the
    /// frame edge are clipped; an empty region yields black.
    pub fn dominant_color(&self, frame: &RgbaImage, region: ScreenRegion) -> Rgb {
        let region = clip_to_frame(region, frame.width(), frame.height());
        if region.is_empty() {
            return Rgb::BLACK;
        }

        let samples = self.sample(frame, region);
        self.weighted_mean(&samples)
    }

    /// Crops `region` and resamples it onto the sample grid.
    pub fn sample(&self, frame: &RgbaImage, region: ScreenRegion) -> Vec<Rgb> {
        let grid = self.sample_grid.max(1);
        let cropped = imageops::crop_imm(frame, region.x, region.y, region.width, region.height).to_image();

        if cropped.dimensions() == (grid, grid) {
            return cropped.pixels().map(Rgb::from).collect();
        }

        imageops::resize(&cropped, grid, grid, FilterType::Lanczos3)
            .pixels()
            .map(Rgb::from)
            .collect()
    }

    /// Saturation-weighted mean of the samples that pass the brightness gate.
    pub fn weighted_mean(&self, samples: &[Rgb]) -> Rgb {
        if samples.is_empty() {
            return Rgb::BLACK;
        }

        let mut sums = [0.0f64; 3];
        let mut total_weight = 0.0f64;

        for sample in samples.iter().filter(|s| self.passes_gate(s)) {
            let weight = sample.saturation_weight() as f64;
            for (sum, channel) in sums.iter_mut().zip(sample.channels()) {
                *sum += channel as f64 * weight;
            }
            total_weight += weight;
        }

        if total_weight <= 0.0 {
            // Nothing survived the gate, use every sample at equal weight.
            for sample in samples {
                for (sum, channel) in sums.iter_mut().zip(sample.channels()) {
                    *sum += channel as f64;
                }
            }
            total_weight = samples.len() as f64;
        }

        let [red, green, blue] = sums.map(|sum| (sum / total_weight) as f32);
        Rgb::from_f32_clamped(red, green, blue)
    }

    fn passes_gate(&self, sample: &Rgb) -> bool {
        let brightness = sample.brightness();
        brightness > self.brightness_floor && brightness < self.brightness_ceiling
    }
}

fn clip_to_frame(region: ScreenRegion, frame_width: u32, frame_height: u32) -> ScreenRegion {
    if region.x >= frame_width || region.y >= frame_height {
        return ScreenRegion::default();
    }
    ScreenRegion {
        x: region.x,
        y: region.y,
        width: region.width.min(frame_width - region.x),
        height: region.height.min(frame_height - region.y),
    }
}
