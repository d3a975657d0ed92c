// THEORY:
// The `region` module turns a fixture's logical placement ("left", "top-right",
// "ambient", ...) into a concrete pixel rectangle of the current frame. It is the
// spatial slicing step of the pipeline: everything downstream only ever sees the
// pixels inside one `ScreenRegion`.
//
// Regions are stored as fractions of the surface, not pixels, and recomputed from the
// frame dimensions every cycle. A resolution change mid-run is therefore picked up
// on the very next frame.
//
// Anything that is not a known label falls back to the full-surface "ambient" region.
// Mapping never fails.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A rectangle of the capture surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScreenRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRegion {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Fractional placement of a region: (x, y, width, height), each in [0, 1].
pub type RegionFractions = (f32, f32, f32, f32);

/// The fixed vocabulary of screen-relative placements a fixture can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum PositionLabel {
    Left,
    Right,
    Top,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
    Ambient,
    /// Serialized as "none": the fixture does not take part in mirroring.
    Excluded,
}

impl PositionLabel {
    pub const ALL: [PositionLabel; 11] = [
        PositionLabel::Left,
        PositionLabel::Right,
        PositionLabel::Top,
        PositionLabel::Bottom,
        PositionLabel::TopLeft,
        PositionLabel::TopRight,
        PositionLabel::BottomLeft,
        PositionLabel::BottomRight,
        PositionLabel::Center,
        PositionLabel::Ambient,
        PositionLabel::Excluded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionLabel::Left => "left",
            PositionLabel::Right => "right",
            PositionLabel::Top => "top",
            PositionLabel::Bottom => "bottom",
            PositionLabel::TopLeft => "top-left",
            PositionLabel::TopRight => "top-right",
            PositionLabel::BottomLeft => "bottom-left",
            PositionLabel::BottomRight => "bottom-right",
            PositionLabel::Center => "center",
            PositionLabel::Ambient => "ambient",
            PositionLabel::Excluded => "none",
        }
    }

    /// Parses a label. Unknown text maps to `Ambient`, matching the region fallback.
    pub fn parse(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
            .unwrap_or(PositionLabel::Ambient)
    }

    pub fn is_mirrored(&self) -> bool {
        !matches!(self, PositionLabel::Excluded)
    }

    /// The fractional rectangle for this label. `Excluded` maps to the ambient region.
    pub fn fractions(&self) -> RegionFractions {
        match self {
            PositionLabel::Left => (0.0, 0.2, 0.15, 0.6),
            PositionLabel::Right => (0.85, 0.2, 0.15, 0.6),
            PositionLabel::Top => (0.2, 0.0, 0.6, 0.15),
            PositionLabel::Bottom => (0.2, 0.85, 0.6, 0.15),
            PositionLabel::TopLeft => (0.0, 0.0, 0.25, 0.25),
            PositionLabel::TopRight => (0.75, 0.0, 0.25, 0.25),
            PositionLabel::BottomLeft => (0.0, 0.75, 0.25, 0.25),
            PositionLabel::BottomRight => (0.75, 0.75, 0.25, 0.25),
            PositionLabel::Center => (0.25, 0.25, 0.5, 0.5),
            PositionLabel::Ambient | PositionLabel::Excluded => (0.0, 0.0, 1.0, 1.0),
        }
    }
}

impl From<String> for PositionLabel {
    fn from(label: String) -> Self {
        PositionLabel::parse(&label)
    }
}

impl From<&str> for PositionLabel {
    fn from(label: &str) -> Self {
        PositionLabel::parse(label)
    }
}

impl From<PositionLabel> for &'static str {
    fn from(label: PositionLabel) -> Self {
        label.as_str()
    }
}

impl fmt::Display for PositionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes the pixel rectangle for `label` on a `surface_width` x `surface_height`
/// surface. The result always lies inside the surface and is at least 1x1 when the
/// surface itself is non-empty.
pub fn region_for(label: PositionLabel, surface_width: u32, surface_height: u32) -> ScreenRegion {
    if surface_width == 0 || surface_height == 0 {
        return ScreenRegion::default();
    }

    let (x_fraction, y_fraction, width_fraction, height_fraction) = label.fractions();
    let (x, width) = scale_span(surface_width, x_fraction, width_fraction);
    let (y, height) = scale_span(surface_height, y_fraction, height_fraction);

    ScreenRegion { x, y, width, height }
}

/// Same as `region_for`, starting from free-form label text.
pub fn region_for_label(label: &str, surface_width: u32, surface_height: u32) -> ScreenRegion {
    region_for(PositionLabel::parse(label), surface_width, surface_height)
}

fn scale_span(extent: u32, offset_fraction: f32, length_fraction: f32) -> (u32, u32) {
    let offset = ((extent as f64 * offset_fraction as f64) as u32).min(extent - 1);
    let length = (extent as f64 * length_fraction as f64) as u32;
    (offset, length.clamp(1, extent - offset))
}
