// THEORY:
// This file is the entry point of the `hue_mirror` library crate. It turns what is on
// screen into ambient lighting: regions of each captured frame are reduced to one
// representative color, that color is saturated, smoothed over time, converted to
// CIE xy chromaticity and written to the light fixtures placed around the display.
//
// The crate is layered bottom-up:
// - `core_modules`: pure color math with no I/O (pixel types, color-space
//   conversion, region geometry, dominant-color extraction, saturation, smoothing).
// - `pipeline`: one cycle of the algorithm built from the core modules.
// - `devices`: the traits the engine drives (capture, placement store, actuator)
//   plus the implementations a runner needs out of the box.
// - `engine`: the background loop, its lifecycle and its observable status.
//
// `config` and `error` are shared by every layer.

pub mod config;
pub mod core_modules;
pub mod devices;
pub mod engine;
pub mod error;
pub mod pipeline;

pub use config::{ConfigPatch, EngineOptions, MirrorConfig};
pub use core_modules::color_space::{Chromaticity, Gamut, chroma_to_rgb, rgb_to_chroma};
pub use core_modules::pixel::Rgb;
pub use core_modules::region::{PositionLabel, ScreenRegion, region_for};
pub use engine::{EngineStatus, MirrorEngine};
pub use error::{ActuatorError, CaptureError, ConfigError, EngineError, EngineResult, StoreError};
