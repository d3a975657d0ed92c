use std::time::Duration;
use thiserror::Error;

/// A configuration value outside its legal range. Rejected before any state changes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("fps must be positive, got {0}")]
    InvalidFps(u32),
    #[error("device brightness must be within 0..=254, got {0}")]
    InvalidBrightness(u8),
    #[error("saturation boost must be a finite value >= 0, got {0}")]
    InvalidSaturationBoost(f32),
    #[error("smoothing factor must be within (0, 1], got {0}")]
    InvalidSmoothingFactor(f32),
    #[error("brightness filter must satisfy floor < ceiling, got {floor}..{ceiling}")]
    InvalidBrightnessWindow { floor: f32, ceiling: f32 },
    #[error("sample grid must be positive")]
    InvalidSampleGrid,
}

/// Failure to grab a frame from the capture surface.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("no display available to capture")]
    NoDisplay,
    #[error("captured an empty frame")]
    EmptyFrame,
    #[error("capture backend failure: {0}")]
    Backend(String),
}

/// Failure to apply a color to one fixture.
#[derive(Debug, Clone, Error)]
pub enum ActuatorError {
    #[error("fixture {0:?} not found")]
    UnknownFixture(String),
    #[error("fixture {0:?} unreachable")]
    Unreachable(String),
    #[error("actuation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("actuator failure: {0}")]
    Backend(String),
}

/// Failure to read the fixture assignments.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read position store: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed position store: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("position store timed out after {0:?}")]
    TimedOut(Duration),
    #[error("position store failure: {0}")]
    Backend(String),
}

/// Errors surfaced by the engine control surface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("worker did not stop within {0:?}; it was aborted")]
    StopTimedOut(Duration),
    #[error("worker task failed: {0}")]
    WorkerFailed(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
