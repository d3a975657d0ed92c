// THEORY:
// The `pixel` module is the most fundamental unit of the mirroring engine. `Rgb` is a
// "dumb" 8-bit color triple plus the handful of single-pixel heuristics the rest of
// the pipeline needs. Nothing here knows about neighbors, regions or time.
//
// Heuristic families:
// - Brightness: plain channel mean, (r + g + b) / 3, used to reject letterbox bars
//   and white UI chrome before averaging.
// - Chroma: max(r, g, b) - min(r, g, b). Zero for grays.
// - Saturation weight: 1 + chroma / 255, in [1.0, 2.0]. Vivid pixels count up to
//   twice as much as neutral ones when a region is reduced to one color.
// - Channel distance: sum of absolute per-channel differences, the metric used to
//   decide whether a smoothed color is worth sending to hardware.
//
// Every constructor that accepts floating point input rounds and clamps, so an
// `Rgb` can never hold an out-of-range channel.

use serde::{Deserialize, Serialize};

pub type Channel = u8;
pub type Brightness = f32;
pub type Chroma = u8;
pub type SaturationWeight = f32;
pub type ChannelDistance = u32;

/// An 8-bit sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "(Channel, Channel, Channel)", into = "(Channel, Channel, Channel)")]
pub struct Rgb {
    /// The red channel value (0-255).
    pub red: Channel,
    /// The green channel value (0-255).
    pub green: Channel,
    /// The blue channel value (0-255).
    pub blue: Channel,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(red: Channel, green: Channel, blue: Channel) -> Self {
        Self { red, green, blue }
    }

    /// Builds a color from floating point channels in the 0..255 scale.
    /// Values are rounded to the nearest integer and clamped; NaN maps to 0.
    pub fn from_f32_clamped(red: f32, green: f32, blue: f32) -> Self {
        Self {
            red: clamp_channel(red),
            green: clamp_channel(green),
            blue: clamp_channel(blue),
        }
    }

    pub fn channels(&self) -> [Channel; 3] {
        [self.red, self.green, self.blue]
    }

    pub fn max_channel(&self) -> Channel {
        self.red.max(self.green).max(self.blue)
    }

    pub fn min_channel(&self) -> Channel {
        self.red.min(self.green).min(self.blue)
    }

    /// Mean of the three channels (0.0-255.0).
    pub fn brightness(&self) -> Brightness {
        (self.red as f32 + self.green as f32 + self.blue as f32) / 3.0
    }

    /// Color purity: max - min. Zero means perfectly gray.
    pub fn chroma(&self) -> Chroma {
        self.max_channel() - self.min_channel()
    }

    pub fn is_achromatic(&self) -> bool {
        self.chroma() == 0
    }

    /// Weight used when averaging a region: 1.0 for grays up to 2.0 for fully
    /// saturated pixels.
    pub fn saturation_weight(&self) -> SaturationWeight {
        1.0 + self.chroma() as f32 / 255.0
    }

    /// Sum of absolute per-channel differences (0..=765).
    pub fn channel_distance(&self, other: &Rgb) -> ChannelDistance {
        self.red.abs_diff(other.red) as ChannelDistance
            + self.green.abs_diff(other.green) as ChannelDistance
            + self.blue.abs_diff(other.blue) as ChannelDistance
    }
}

/// Rounds and clamps a 0..255-scale value into a channel.
pub fn clamp_channel(value: f32) -> Channel {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as Channel
}

impl From<(Channel, Channel, Channel)> for Rgb {
    fn from((red, green, blue): (Channel, Channel, Channel)) -> Self {
        Rgb::new(red, green, blue)
    }
}

impl From<Rgb> for (Channel, Channel, Channel) {
    fn from(rgb: Rgb) -> Self {
        (rgb.red, rgb.green, rgb.blue)
    }
}

impl From<image::Rgba<u8>> for Rgb {
    fn from(pixel: image::Rgba<u8>) -> Self {
        let [red, green, blue, _alpha] = pixel.0;
        Rgb::new(red, green, blue)
    }
}

impl From<&image::Rgba<u8>> for Rgb {
    fn from(pixel: &image::Rgba<u8>) -> Self {
        Rgb::from(*pixel)
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_and_rounds_float_channels() {
        let rgb = Rgb::from_f32_clamped(-12.0, 127.5, 300.0);
        assert_eq!(rgb, Rgb::new(0, 128, 255));
        assert_eq!(Rgb::from_f32_clamped(f32::NAN, 1.4, 254.6), Rgb::new(0, 1, 255));
    }

    #[test]
    fn saturation_weight_spans_one_to_two() {
        assert_eq!(Rgb::new(90, 90, 90).saturation_weight(), 1.0);
        assert_eq!(Rgb::new(255, 0, 0).saturation_weight(), 2.0);
        let half = Rgb::new(200, 149, 149).saturation_weight();
        assert!((half - (1.0 + 51.0 / 255.0)).abs() < 1e-6);
    }

    #[test]
    fn channel_distance_is_symmetric_manhattan() {
        let a = Rgb::new(10, 200, 30);
        let b = Rgb::new(20, 190, 35);
        assert_eq!(a.channel_distance(&b), 25);
        assert_eq!(b.channel_distance(&a), 25);
        assert_eq!(Rgb::BLACK.channel_distance(&Rgb::WHITE), 765);
    }

    #[test]
    fn serializes_as_tuple() {
        let json = serde_json::to_string(&Rgb::new(1, 2, 3)).unwrap();
        assert_eq!(json, "[1,2,3]");
        let back: Rgb = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Rgb::new(1, 2, 3));
    }

    #[test]
    fn displays_as_hex() {
        assert_eq!(Rgb::new(255, 8, 0).to_string(), "#ff0800");
    }
}
