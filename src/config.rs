// THEORY:
// Configuration is split by who owns it and when it may change.
//
// - `MirrorConfig` is the live tuning the owning process may change at any moment
//   (fps, brightness, saturation, smoothing, transition time). It is immutable once
//   built; `SharedConfig` swaps whole snapshots atomically, and the worker loads one
//   snapshot at the top of every cycle, so no cycle can observe a half-applied
//   update.
// - `ConfigPatch` is a partial update. It is merged onto the current snapshot and
//   the result validated before the swap; an invalid patch changes nothing.
// - `EngineOptions` is fixed at construction: thresholds, sampling grid, gamut and
//   the timeouts that bound every call into an external collaborator.
//
// All three are serde types with per-field defaults, so a partial JSON document is a
// complete configuration.

use crate::core_modules::color_space::{DeviceBrightness, Gamut, MAX_DEVICE_BRIGHTNESS};
use crate::core_modules::dominant_color::{
    DEFAULT_BRIGHTNESS_CEILING, DEFAULT_BRIGHTNESS_FLOOR, DEFAULT_SAMPLE_GRID, DominantColorExtractor,
};
use crate::core_modules::saturation::SaturationFactor;
use crate::core_modules::smoother::{CommitThreshold, DEFAULT_COMMIT_THRESHOLD, SmoothingFactor};
use crate::error::ConfigError;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Live tuning for the mirroring loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Target cycles per second.
    pub fps: u32,
    /// Brightness sent with every color write (0-254).
    pub device_brightness: DeviceBrightness,
    /// Channel spread multiplier applied to every extracted color.
    pub saturation_boost: SaturationFactor,
    /// Weight of the newest observation in the moving average, in (0, 1].
    pub smoothing_factor: SmoothingFactor,
    /// Fade time requested from the fixture for each write.
    #[serde(with = "duration_millis")]
    pub transition_time: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            device_brightness: 200,
            saturation_boost: 1.2,
            smoothing_factor: 0.5,
            transition_time: Duration::from_millis(100),
        }
    }
}

impl MirrorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::InvalidFps(self.fps));
        }
        if self.device_brightness > MAX_DEVICE_BRIGHTNESS {
            return Err(ConfigError::InvalidBrightness(self.device_brightness));
        }
        if !self.saturation_boost.is_finite() || self.saturation_boost < 0.0 {
            return Err(ConfigError::InvalidSaturationBoost(self.saturation_boost));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(ConfigError::InvalidSmoothingFactor(self.smoothing_factor));
        }
        Ok(())
    }

    /// Time budget of one cycle.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps.max(1) as u64)
    }

    /// Transition time in the tenths-of-a-second unit fixtures expect.
    pub fn transition_tenths(&self) -> u16 {
        let tenths = (self.transition_time.as_millis() + 50) / 100;
        tenths.min(u16::MAX as u128) as u16
    }

    /// Returns a copy with `patch` applied. Not validated.
    pub fn merged(&self, patch: &ConfigPatch) -> MirrorConfig {
        MirrorConfig {
            fps: patch.fps.unwrap_or(self.fps),
            device_brightness: patch.device_brightness.unwrap_or(self.device_brightness),
            saturation_boost: patch.saturation_boost.unwrap_or(self.saturation_boost),
            smoothing_factor: patch.smoothing_factor.unwrap_or(self.smoothing_factor),
            transition_time: patch.transition_time.unwrap_or(self.transition_time),
        }
    }
}

/// A partial `MirrorConfig` update. `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub fps: Option<u32>,
    pub device_brightness: Option<DeviceBrightness>,
    pub saturation_boost: Option<SaturationFactor>,
    pub smoothing_factor: Option<SmoothingFactor>,
    #[serde(with = "option_duration_millis")]
    pub transition_time: Option<Duration>,
}

impl ConfigPatch {
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn device_brightness(mut self, brightness: DeviceBrightness) -> Self {
        self.device_brightness = Some(brightness);
        self
    }

    pub fn saturation_boost(mut self, boost: SaturationFactor) -> Self {
        self.saturation_boost = Some(boost);
        self
    }

    pub fn smoothing_factor(mut self, factor: SmoothingFactor) -> Self {
        self.smoothing_factor = Some(factor);
        self
    }

    pub fn transition_time(mut self, transition: Duration) -> Self {
        self.transition_time = Some(transition);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }
}

/// Construction-time engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Minimum total channel change before a smoothed color is written.
    pub commit_threshold: CommitThreshold,
    /// Samples with a channel mean at or below this are ignored.
    pub brightness_floor: f32,
    /// Samples with a channel mean at or above this are ignored.
    pub brightness_ceiling: f32,
    /// Side length of the grid each region is resampled to.
    pub sample_grid: u32,
    /// Matrix pair used for RGB -> xy conversion.
    pub gamut: Gamut,
    /// Upper bound on a single fixture write.
    #[serde(with = "duration_millis")]
    pub actuator_timeout: Duration,
    /// Upper bound on reading the fixture assignments.
    #[serde(with = "duration_millis")]
    pub store_timeout: Duration,
    /// How long `stop` waits for the worker before aborting it.
    #[serde(with = "duration_millis")]
    pub stop_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            commit_threshold: DEFAULT_COMMIT_THRESHOLD,
            brightness_floor: DEFAULT_BRIGHTNESS_FLOOR,
            brightness_ceiling: DEFAULT_BRIGHTNESS_CEILING,
            sample_grid: DEFAULT_SAMPLE_GRID,
            gamut: Gamut::default(),
            actuator_timeout: Duration::from_millis(500),
            store_timeout: Duration::from_millis(250),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

impl EngineOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_grid == 0 {
            return Err(ConfigError::InvalidSampleGrid);
        }
        if !(self.brightness_floor < self.brightness_ceiling) {
            return Err(ConfigError::InvalidBrightnessWindow {
                floor: self.brightness_floor,
                ceiling: self.brightness_ceiling,
            });
        }
        Ok(())
    }

    pub fn extractor(&self) -> DominantColorExtractor {
        DominantColorExtractor::new(self.sample_grid, self.brightness_floor, self.brightness_ceiling)
    }
}

/// The live `MirrorConfig`, swapped atomically as a whole.
#[derive(Debug)]
pub struct SharedConfig {
    current: ArcSwap<MirrorConfig>,
    // Serializes read-modify-write updates so patches apply in call order.
    writer: Mutex<()>,
}

impl SharedConfig {
    pub fn new(initial: MirrorConfig) -> Result<Self, ConfigError> {
        initial.validate()?;
        Ok(Self {
            current: ArcSwap::from_pointee(initial),
            writer: Mutex::new(()),
        })
    }

    /// The current snapshot. Never blocks.
    pub fn snapshot(&self) -> MirrorConfig {
        **self.current.load()
    }

    /// Merges `patch` onto the current snapshot and publishes the result.
    pub fn apply(&self, patch: &ConfigPatch) -> Result<MirrorConfig, ConfigError> {
        let _guard = self.writer.lock();
        let next = self.current.load().merged(patch);
        next.validate()?;
        self.current.store(Arc::new(next));
        Ok(next)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|millis| millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(MirrorConfig::default().validate().is_ok());
        assert!(EngineOptions::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let base = MirrorConfig::default();
        let cases = [
            (ConfigPatch::default().fps(0), ConfigError::InvalidFps(0)),
            (ConfigPatch::default().device_brightness(255), ConfigError::InvalidBrightness(255)),
            (ConfigPatch::default().saturation_boost(-0.5), ConfigError::InvalidSaturationBoost(-0.5)),
            (ConfigPatch::default().smoothing_factor(0.0), ConfigError::InvalidSmoothingFactor(0.0)),
            (ConfigPatch::default().smoothing_factor(1.5), ConfigError::InvalidSmoothingFactor(1.5)),
        ];
        for (patch, expected) in cases {
            assert_eq!(base.merged(&patch).validate(), Err(expected));
        }
        assert!(base.merged(&ConfigPatch::default().smoothing_factor(f32::NAN)).validate().is_err());
        assert!(base.merged(&ConfigPatch::default().smoothing_factor(1.0)).validate().is_ok());
    }

    #[test]
    fn invalid_patch_leaves_config_untouched() {
        let shared = SharedConfig::new(MirrorConfig::default()).unwrap();
        let before = shared.snapshot();
        let result = shared.apply(&ConfigPatch::default().fps(30).smoothing_factor(2.0));
        assert!(result.is_err());
        assert_eq!(shared.snapshot(), before);
    }

    #[test]
    fn sequential_patches_resolve_to_the_last_value() {
        let shared = SharedConfig::new(MirrorConfig::default()).unwrap();
        shared.apply(&ConfigPatch::default().fps(5)).unwrap();
        shared.apply(&ConfigPatch::default().fps(30)).unwrap();
        assert_eq!(shared.snapshot().fps, 30);
    }

    #[test]
    fn concurrent_patches_never_tear() {
        let shared = Arc::new(SharedConfig::new(MirrorConfig::default()).unwrap());
        let writers: Vec<_> = (0..4u32)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for n in 1..200u32 {
                        let value = i * 1000 + n;
                        // fps and brightness always move together.
                        let patch = ConfigPatch::default().fps(value).device_brightness((value % 200) as u8);
                        shared.apply(&patch).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..2000 {
            let snapshot = shared.snapshot();
            if snapshot.fps != 10 {
                assert_eq!((snapshot.fps % 200) as u8, snapshot.device_brightness);
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }
    }

    #[test]
    fn transition_time_rounds_to_tenths() {
        let mut config = MirrorConfig::default();
        assert_eq!(config.transition_tenths(), 1);
        config.transition_time = Duration::from_millis(0);
        assert_eq!(config.transition_tenths(), 0);
        config.transition_time = Duration::from_millis(449);
        assert_eq!(config.transition_tenths(), 4);
        config.transition_time = Duration::from_millis(450);
        assert_eq!(config.transition_tenths(), 5);
    }

    #[test]
    fn frame_interval_follows_fps() {
        let config = MirrorConfig { fps: 25, ..MirrorConfig::default() };
        assert_eq!(config.frame_interval(), Duration::from_millis(40));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: MirrorConfig = serde_json::from_str(r#"{"fps": 24, "transition_time": 300}"#).unwrap();
        assert_eq!(config.fps, 24);
        assert_eq!(config.transition_time, Duration::from_millis(300));
        assert_eq!(config.device_brightness, 200);

        let options: EngineOptions = serde_json::from_str(r#"{"commit_threshold": 30, "gamut": "hue-wide"}"#).unwrap();
        assert_eq!(options.commit_threshold, 30);
        assert_eq!(options.gamut, Gamut::HueWide);
        assert_eq!(options.stop_timeout, Duration::from_secs(2));

        let patch: ConfigPatch = serde_json::from_str(r#"{"smoothing_factor": 0.25}"#).unwrap();
        assert_eq!(patch, ConfigPatch::default().smoothing_factor(0.25));
    }

    #[test]
    fn options_reject_inverted_brightness_window() {
        let options = EngineOptions { brightness_floor: 200.0, brightness_ceiling: 100.0, ..EngineOptions::default() };
        assert!(options.validate().is_err());
    }
}
