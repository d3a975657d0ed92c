// THEORY:
// The `TemporalSmoother` is the only stateful stage of the color pipeline. It keeps
// one `FixtureColorState` per light and uses it for two separate jobs:
//
// 1.  **Smoothing**: each new observation is blended into the previous smoothed value
//     with an exponential moving average, next = prev + (target - prev) * factor.
//     Scene cuts turn into short fades instead of hard flashes. The first observation
//     of a fixture has no history and is taken verbatim.
// 2.  **Commit gating**: a smoothed color is only worth a hardware write when it has
//     drifted far enough from the color the fixture is actually showing, i.e. the
//     last *committed* one. Capture noise and the tail of a fade stay below the
//     threshold, which caps the write rate of a slow lighting bus independently of
//     the capture frame rate.
//
// The smoothed value advances every cycle whether or not a write happens, so the
// gate compares against where the light is, not where the filter was last time.
// A write that fails is never marked committed and gets retried on the next cycle.
//
// Entries are created lazily and live until `forget`/`clear`. The owner prunes
// fixtures that disappear from its placement list, so the map is bounded by the
// fixtures currently configured, not by every name ever seen.

use crate::core_modules::pixel::{ChannelDistance, Rgb};
use std::collections::HashMap;

pub type SmoothingFactor = f32;
pub type CommitThreshold = ChannelDistance;

pub const DEFAULT_COMMIT_THRESHOLD: CommitThreshold = 15;

/// Per-fixture color memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureColorState {
    /// The last target color observed for the fixture, before smoothing.
    pub last_observed: Rgb,
    /// The output of the most recent smoothing step.
    pub last_smoothed: Rgb,
    /// The last color successfully written to the fixture, if any.
    pub last_committed: Option<Rgb>,
}

/// Exponential smoothing and write gating for a set of fixtures.
#[derive(Debug, Default)]
pub struct TemporalSmoother {
    states: HashMap<String, FixtureColorState>,
}

impl TemporalSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blends `target` into the fixture's smoothed color and records both.
    pub fn smooth(&mut self, fixture: &str, target: Rgb, factor: SmoothingFactor) -> Rgb {
        match self.states.get_mut(fixture) {
            Some(state) => {
                let smoothed = interpolate(state.last_smoothed, target, factor);
                state.last_observed = target;
                state.last_smoothed = smoothed;
                smoothed
            }
            None => {
                self.states.insert(
                    fixture.to_owned(),
                    FixtureColorState {
                        last_observed: target,
                        last_smoothed: target,
                        last_committed: None,
                    },
                );
                target
            }
        }
    }

    /// True when `candidate` differs from the last committed color by strictly more
    /// than `threshold`. A fixture that was never committed always passes.
    pub fn should_commit(&self, fixture: &str, candidate: Rgb, threshold: CommitThreshold) -> bool {
        match self.states.get(fixture).and_then(|state| state.last_committed) {
            Some(committed) => candidate.channel_distance(&committed) > threshold,
            None => true,
        }
    }

    /// Records that `rgb` is now showing on the fixture.
    pub fn mark_committed(&mut self, fixture: &str, rgb: Rgb) {
        if let Some(state) = self.states.get_mut(fixture) {
            state.last_committed = Some(rgb);
        }
    }

    pub fn state(&self, fixture: &str) -> Option<&FixtureColorState> {
        self.states.get(fixture)
    }

    pub fn smoothed(&self, fixture: &str) -> Option<Rgb> {
        self.states.get(fixture).map(|state| state.last_smoothed)
    }

    /// Names of every fixture with history.
    pub fn fixtures(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn forget(&mut self, fixture: &str) -> Option<FixtureColorState> {
        self.states.remove(fixture)
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// One exponential smoothing step, rounded per channel.
pub fn interpolate(previous: Rgb, target: Rgb, factor: SmoothingFactor) -> Rgb {
    let step = |prev: u8, next: u8| prev as f32 + (next as f32 - prev as f32) * factor;
    Rgb::from_f32_clamped(
        step(previous.red, target.red),
        step(previous.green, target.green),
        step(previous.blue, target.blue),
    )
}
