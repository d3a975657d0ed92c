use crate::core_modules::color_space::{Chromaticity, DeviceBrightness};
use crate::error::ActuatorError;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Everything a fixture needs for one color write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorCommand {
    pub chromaticity: Chromaticity,
    /// 0-254.
    pub brightness: DeviceBrightness,
    /// Fade duration in tenths of a second.
    pub transition_tenths: u16,
}

/// A set of individually addressable light fixtures.
///
/// Calls are made from the blocking thread pool and abandoned after the engine's
/// actuator timeout, so an implementation may block on network I/O. A failure only
/// affects the fixture it was issued for.
pub trait LightActuator: Send + Sync {
    fn set_color(&self, fixture: &str, command: ColorCommand) -> Result<(), ActuatorError>;
}

/// An actuator that only logs the writes it receives.
#[derive(Debug, Default)]
pub struct LoggingActuator {
    writes: AtomicU64,
}

impl LoggingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl LightActuator for LoggingActuator {
    fn set_color(&self, fixture: &str, command: ColorCommand) -> Result<(), ActuatorError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        info!(
            fixture,
            x = command.chromaticity.x,
            y = command.chromaticity.y,
            brightness = command.brightness,
            transition_tenths = command.transition_tenths,
            "set color"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_actuator_counts_writes() {
        let actuator = LoggingActuator::new();
        let command = ColorCommand {
            chromaticity: Chromaticity::new(0.3, 0.3),
            brightness: 100,
            transition_tenths: 1,
        };
        actuator.set_color("desk", command).unwrap();
        actuator.set_color("shelf", command).unwrap();
        assert_eq!(actuator.writes(), 2);
    }
}
