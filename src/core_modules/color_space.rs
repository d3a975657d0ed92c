// THEORY:
// Light fixtures do not speak RGB. They take a CIE 1931 chromaticity (x, y) plus a
// separate brightness byte, so every color the pipeline produces has to cross
// from display space into device space before it can be committed.
//
// Forward (RGB -> xy):
//   sRGB bytes -> gamma-decoded linear RGB (256-entry LUT) -> XYZ via the gamut
//   matrix -> x = X / (X + Y + Z), y = Y / (X + Y + Z).
//
// Inverse (xy + brightness -> RGB), used for status reporting:
//   Y from brightness, X and Z from (x, y) -> linear RGB via the inverse matrix ->
//   gamma-encoded -> divided by max(max channel, 1) -> 0..255 bytes.
//   The normalization step pulls out-of-gamut results back into a displayable,
//   maximally saturated color instead of letting single channels clip.
//
// Everything here is a pure function of its inputs. `Gamut` is a value, not state,
// so conversions are safe to call from any thread.

use crate::core_modules::pixel::Rgb;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub type ChromaticityX = f64;
pub type ChromaticityY = f64;
pub type DeviceBrightness = u8;

/// Highest brightness value a fixture accepts.
pub const MAX_DEVICE_BRIGHTNESS: DeviceBrightness = 254;

const DENOMINATOR_EPSILON: f64 = 1e-9;
const MIN_CHROMATICITY_Y: f64 = 1e-5;

static SRGB_TO_LINEAR_LUT: OnceLock<[f64; 256]> = OnceLock::new();

/// A CIE 1931 (x, y) coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Chromaticity {
    pub x: ChromaticityX,
    pub y: ChromaticityY,
}

impl Chromaticity {
    pub fn new(x: ChromaticityX, y: ChromaticityY) -> Self {
        Self { x, y }
    }
}

/// The RGB <-> XYZ matrix pair used for conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gamut {
    /// Standard linear sRGB primaries with a D65 white point.
    #[default]
    Srgb,
    /// The wide-gamut D65 matrices published for Philips Hue bulbs.
    HueWide,
}

struct GamutMatrices {
    to_xyz: [[f64; 3]; 3],
    from_xyz: [[f64; 3]; 3],
}

const SRGB_MATRICES: GamutMatrices = GamutMatrices {
    to_xyz: [
        [0.4124564, 0.3575761, 0.1804375],
        [0.2126729, 0.7151522, 0.0721750],
        [0.0193339, 0.1191920, 0.9503041],
    ],
    from_xyz: [
        [3.2404542, -1.5371385, -0.4985314],
        [-0.9692660, 1.8760108, 0.0415560],
        [0.0556434, -0.2040259, 1.0572252],
    ],
};

const HUE_WIDE_MATRICES: GamutMatrices = GamutMatrices {
    to_xyz: [
        [0.664511, 0.154324, 0.162028],
        [0.283881, 0.668433, 0.047685],
        [0.000088, 0.072310, 0.986039],
    ],
    from_xyz: [
        [1.656492, -0.354851, -0.255038],
        [-0.707196, 1.655397, 0.036152],
        [0.051713, -0.121364, 1.011530],
    ],
};

impl Gamut {
    fn matrices(self) -> &'static GamutMatrices {
        match self {
            Gamut::Srgb => &SRGB_MATRICES,
            Gamut::HueWide => &HUE_WIDE_MATRICES,
        }
    }

    /// Converts a display color to device chromaticity.
    pub fn rgb_to_chroma(self, rgb: Rgb) -> Chromaticity {
        let linear = rgb.channels().map(srgb_to_linear);
        let [x, y, z] = multiply(&self.matrices().to_xyz, linear);

        let sum = x + y + z;
        let denominator = if sum.abs() < DENOMINATOR_EPSILON {
            DENOMINATOR_EPSILON
        } else {
            sum
        };
        Chromaticity::new(x / denominator, y / denominator)
    }

    /// Converts device chromaticity and brightness (0-254) back to a displayable color.
    pub fn chroma_to_rgb(self, chroma: Chromaticity, brightness: DeviceBrightness) -> Rgb {
        let chroma_y = if chroma.y.abs() < MIN_CHROMATICITY_Y {
            MIN_CHROMATICITY_Y
        } else {
            chroma.y
        };
        let chroma_z = 1.0 - chroma.x - chroma.y;

        let luminance = brightness.min(MAX_DEVICE_BRIGHTNESS) as f64 / MAX_DEVICE_BRIGHTNESS as f64;
        let tristimulus_x = (luminance / chroma_y) * chroma.x;
        let tristimulus_z = (luminance / chroma_y) * chroma_z;

        let encoded = multiply(
            &self.matrices().from_xyz,
            [tristimulus_x, luminance, tristimulus_z],
        )
        .map(linear_to_srgb);

        let max_value = encoded.iter().copied().fold(1.0_f64, f64::max);
        let [red, green, blue] = encoded.map(|channel| (channel / max_value * 255.0) as f32);
        Rgb::from_f32_clamped(red, green, blue)
    }
}

/// Display color to chromaticity using the default sRGB gamut.
pub fn rgb_to_chroma(rgb: Rgb) -> Chromaticity {
    Gamut::Srgb.rgb_to_chroma(rgb)
}

/// Chromaticity and brightness to display color using the default sRGB gamut.
pub fn chroma_to_rgb(chroma: Chromaticity, brightness: DeviceBrightness) -> Rgb {
    Gamut::Srgb.chroma_to_rgb(chroma, brightness)
}

/// sRGB byte -> linear light in [0, 1].
pub fn srgb_to_linear(value: u8) -> f64 {
    let table = SRGB_TO_LINEAR_LUT.get_or_init(|| {
        let mut table = [0.0f64; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let normalized = i as f64 / 255.0;
            *entry = if normalized <= 0.04045 {
                normalized / 12.92
            } else {
                ((normalized + 0.055) / 1.055).powf(2.4)
            };
        }
        table
    });
    table[value as usize]
}

/// Linear light -> gamma-encoded sRGB value. Not clamped.
pub fn linear_to_srgb(value: f64) -> f64 {
    if value <= 0.0031308 {
        12.92 * value
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

fn multiply(matrix: &[[f64; 3]; 3], vector: [f64; 3]) -> [f64; 3] {
    matrix.map(|row| row[0] * vector[0] + row[1] * vector[1] + row[2] * vector[2])
}
