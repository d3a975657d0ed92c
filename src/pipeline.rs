// THEORY:
// The `pipeline` module is the per-cycle algorithm of the mirroring engine with all
// I/O stripped away. Given one frame, the current fixture placements and one config
// snapshot, it decides what every fixture should show and which of them actually
// need a hardware write.
//
// It runs in two halves so the engine can put the expensive one on a blocking thread:
// 1.  **Sampling** (`sample_positions`, stateless): every distinct placement is
//     mapped to a region, reduced to a dominant color and saturation-boosted. Work
//     is per placement, not per fixture; three lights on "top" cost one extraction.
// 2.  **Planning** (`MirrorPipeline::plan`, stateful): each fixture's color is
//     smoothed against its history and passed through the commit gate. Fixtures that
//     pass get a ready-to-send `ColorCommand`.
//
// `process_frame` chains both halves for synchronous callers.

use crate::config::{EngineOptions, MirrorConfig};
use crate::core_modules::color_space::Gamut;
use crate::core_modules::dominant_color::DominantColorExtractor;
use crate::core_modules::pixel::Rgb;
use crate::core_modules::region::{PositionLabel, region_for};
use crate::core_modules::saturation::{SaturationFactor, boost};
use crate::core_modules::smoother::{CommitThreshold, TemporalSmoother};
use crate::devices::{ColorCommand, FixtureAssignment};
use image::RgbaImage;
use std::collections::{BTreeMap, HashSet};

/// Mirrored fixtures grouped by placement, in assignment order within a group.
pub type PositionGroups = BTreeMap<PositionLabel, Vec<String>>;

/// Boosted dominant color per placement for one frame.
pub type PositionColors = BTreeMap<PositionLabel, Rgb>;

/// The outcome of one cycle for one fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureUpdate {
    pub fixture: String,
    pub position: PositionLabel,
    /// The boosted dominant color of the fixture's region this cycle.
    pub observed: Rgb,
    /// The color after temporal smoothing; what the status reports.
    pub smoothed: Rgb,
    /// Present when the smoothed color passed the commit gate.
    pub command: Option<ColorCommand>,
}

/// Groups enabled, mirrored fixtures by placement. A fixture listed more than once
/// keeps its first enabled placement.
pub fn group_by_position(assignments: &[FixtureAssignment]) -> PositionGroups {
    let mut groups = PositionGroups::new();
    let mut seen = HashSet::new();

    for assignment in assignments.iter().filter(|a| a.is_mirrored()) {
        if seen.insert(assignment.fixture_name.as_str()) {
            groups
                .entry(assignment.position)
                .or_default()
                .push(assignment.fixture_name.clone());
        }
    }
    groups
}

/// Stage 1: region -> dominant color -> saturation boost, once per placement.
pub fn sample_positions<'a>(
    extractor: &DominantColorExtractor,
    frame: &RgbaImage,
    positions: impl IntoIterator<Item = &'a PositionLabel>,
    saturation_boost: SaturationFactor,
) -> PositionColors {
    positions
        .into_iter()
        .map(|position| {
            let region = region_for(*position, frame.width(), frame.height());
            let dominant = extractor.dominant_color(frame, region);
            (*position, boost(dominant, saturation_boost))
        })
        .collect()
}

/// The stateful half of a cycle: smoothing history and commit gating.
#[derive(Debug)]
pub struct MirrorPipeline {
    extractor: DominantColorExtractor,
    gamut: Gamut,
    commit_threshold: CommitThreshold,
    smoother: TemporalSmoother,
}

impl MirrorPipeline {
    pub fn new(options: &EngineOptions) -> Self {
        Self {
            extractor: options.extractor(),
            gamut: options.gamut,
            commit_threshold: options.commit_threshold,
            smoother: TemporalSmoother::new(),
        }
    }

    pub fn extractor(&self) -> DominantColorExtractor {
        self.extractor
    }

    pub fn smoother(&self) -> &TemporalSmoother {
        &self.smoother
    }

    /// Stage 2: smooth and gate every grouped fixture against this cycle's colors.
    /// Placements missing from `colors` are skipped.
    pub fn plan(&mut self, groups: &PositionGroups, colors: &PositionColors, config: &MirrorConfig) -> Vec<FixtureUpdate> {
        let mut updates = Vec::new();

        for (position, fixtures) in groups {
            let Some(observed) = colors.get(position).copied() else {
                continue;
            };

            for fixture in fixtures {
                let smoothed = self.smoother.smooth(fixture, observed, config.smoothing_factor);
                let command = self
                    .smoother
                    .should_commit(fixture, smoothed, self.commit_threshold)
                    .then(|| ColorCommand {
                        chromaticity: self.gamut.rgb_to_chroma(smoothed),
                        brightness: config.device_brightness,
                        transition_tenths: config.transition_tenths(),
                    });

                updates.push(FixtureUpdate {
                    fixture: fixture.clone(),
                    position: *position,
                    observed,
                    smoothed,
                    command,
                });
            }
        }
        updates
    }

    /// Drops the history of fixtures no longer listed at all. Disabled fixtures keep
    /// theirs so re-enabling one resumes from its last color.
    pub fn forget_missing(&mut self, assignments: &[FixtureAssignment]) {
        let listed: HashSet<&str> = assignments.iter().map(|a| a.fixture_name.as_str()).collect();
        let missing: Vec<String> = self
            .smoother
            .fixtures()
            .filter(|fixture| !listed.contains(fixture))
            .map(str::to_owned)
            .collect();

        for fixture in missing {
            self.smoother.forget(&fixture);
        }
    }

    /// Both stages in one synchronous call.
    pub fn process_frame(
        &mut self,
        frame: &RgbaImage,
        assignments: &[FixtureAssignment],
        config: &MirrorConfig,
    ) -> Vec<FixtureUpdate> {
        self.forget_missing(assignments);
        let groups = group_by_position(assignments);
        let colors = sample_positions(&self.extractor, frame, groups.keys(), config.saturation_boost);
        self.plan(&groups, &colors, config)
    }

    /// Records a successful hardware write.
    pub fn mark_committed(&mut self, fixture: &str, rgb: Rgb) {
        self.smoother.mark_committed(fixture, rgb);
    }

    /// Drops all per-fixture history.
    pub fn reset(&mut self) {
        self.smoother.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn assignment(name: &str, position: PositionLabel, enabled: bool) -> FixtureAssignment {
        FixtureAssignment::new(name, position, enabled)
    }

    /// Left third red, right third blue, middle gray.
    fn split_frame() -> RgbaImage {
        RgbaImage::from_fn(300, 100, |x, _| match x {
            0..=99 => Rgba([220, 30, 30, 255]),
            200.. => Rgba([30, 30, 220, 255]),
            _ => Rgba([120, 120, 120, 255]),
        })
    }

    fn config() -> MirrorConfig {
        MirrorConfig {
            saturation_boost: 1.0,
            smoothing_factor: 1.0,
            ..MirrorConfig::default()
        }
    }

    #[test]
    fn groups_only_enabled_mirrored_fixtures() {
        let groups = group_by_position(&[
            assignment("a", PositionLabel::Top, true),
            assignment("b", PositionLabel::Top, true),
            assignment("c", PositionLabel::Left, false),
            assignment("d", PositionLabel::Excluded, true),
            assignment("a", PositionLabel::Right, true),
        ]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&PositionLabel::Top], vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn fixtures_take_their_region_color() {
        let mut pipeline = MirrorPipeline::new(&EngineOptions::default());
        let updates = pipeline.process_frame(
            &split_frame(),
            &[
                assignment("left lamp", PositionLabel::Left, true),
                assignment("right lamp", PositionLabel::Right, true),
            ],
            &config(),
        );

        let left = updates.iter().find(|u| u.fixture == "left lamp").unwrap();
        let right = updates.iter().find(|u| u.fixture == "right lamp").unwrap();
        assert_eq!(left.smoothed, Rgb::new(220, 30, 30));
        assert_eq!(right.smoothed, Rgb::new(30, 30, 220));
        assert!(left.command.is_some() && right.command.is_some());
    }

    #[test]
    fn command_carries_config_and_chromaticity() {
        let mut pipeline = MirrorPipeline::new(&EngineOptions::default());
        let config = MirrorConfig {
            device_brightness: 123,
            transition_time: std::time::Duration::from_millis(400),
            ..config()
        };
        let updates = pipeline.process_frame(&split_frame(), &[assignment("l", PositionLabel::Left, true)], &config);
        let command = updates[0].command.unwrap();
        assert_eq!(command.brightness, 123);
        assert_eq!(command.transition_tenths, 4);
        assert_eq!(command.chromaticity, Gamut::Srgb.rgb_to_chroma(Rgb::new(220, 30, 30)));
    }

    #[test]
    fn shared_placement_is_sampled_once_and_fanned_out() {
        let frame = split_frame();
        let groups = group_by_position(&[
            assignment("a", PositionLabel::Left, true),
            assignment("b", PositionLabel::Left, true),
        ]);
        let colors = sample_positions(&DominantColorExtractor::default(), &frame, groups.keys(), 1.0);
        assert_eq!(colors.len(), 1);

        let mut pipeline = MirrorPipeline::new(&EngineOptions::default());
        let updates = pipeline.plan(&groups, &colors, &config());
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].smoothed, updates[1].smoothed);
    }

    #[test]
    fn unchanged_scene_stops_writing_after_commit() {
        let mut pipeline = MirrorPipeline::new(&EngineOptions::default());
        let frame = split_frame();
        let fixtures = [assignment("l", PositionLabel::Left, true)];

        let first = pipeline.process_frame(&frame, &fixtures, &config());
        pipeline.mark_committed("l", first[0].smoothed);

        let second = pipeline.process_frame(&frame, &fixtures, &config());
        assert!(second[0].command.is_none());
        assert_eq!(second[0].smoothed, first[0].smoothed);
    }

    #[test]
    fn failed_write_is_retried_next_cycle() {
        let mut pipeline = MirrorPipeline::new(&EngineOptions::default());
        let frame = split_frame();
        let fixtures = [assignment("l", PositionLabel::Left, true)];

        assert!(pipeline.process_frame(&frame, &fixtures, &config())[0].command.is_some());
        // No mark_committed: the write did not land.
        assert!(pipeline.process_frame(&frame, &fixtures, &config())[0].command.is_some());
    }

    #[test]
    fn commit_threshold_comes_from_options() {
        let options = EngineOptions { commit_threshold: 1000, ..EngineOptions::default() };
        let mut pipeline = MirrorPipeline::new(&options);
        let fixtures = [assignment("l", PositionLabel::Left, true)];
        let red = split_frame();
        let first = pipeline.process_frame(&red, &fixtures, &config());
        pipeline.mark_committed("l", first[0].smoothed);

        let green = RgbaImage::from_pixel(300, 100, Rgba([20, 200, 20, 255]));
        let second = pipeline.process_frame(&green, &fixtures, &config());
        assert!(second[0].command.is_none());
    }

    #[test]
    fn smoothing_lags_behind_scene_cuts() {
        let mut pipeline = MirrorPipeline::new(&EngineOptions::default());
        let fixtures = [assignment("amb", PositionLabel::Ambient, true)];
        let config = MirrorConfig { smoothing_factor: 0.5, saturation_boost: 1.0, ..MirrorConfig::default() };

        let dark_blue = RgbaImage::from_pixel(64, 64, Rgba([20, 20, 100, 255]));
        let orange = RgbaImage::from_pixel(64, 64, Rgba([220, 120, 20, 255]));

        pipeline.process_frame(&dark_blue, &fixtures, &config);
        let cut = pipeline.process_frame(&orange, &fixtures, &config);
        assert_eq!(cut[0].observed, Rgb::new(220, 120, 20));
        assert_eq!(cut[0].smoothed, Rgb::new(120, 70, 60));
    }

    #[test]
    fn removed_fixtures_lose_history_disabled_ones_keep_it() {
        let mut pipeline = MirrorPipeline::new(&EngineOptions::default());
        let frame = split_frame();
        pipeline.process_frame(
            &frame,
            &[
                assignment("a", PositionLabel::Left, true),
                assignment("b", PositionLabel::Right, true),
                assignment("c", PositionLabel::Top, true),
            ],
            &config(),
        );
        assert_eq!(pipeline.smoother().len(), 3);

        // "b" is disabled, "c" is gone from the list.
        pipeline.process_frame(
            &frame,
            &[assignment("a", PositionLabel::Left, true), assignment("b", PositionLabel::Right, false)],
            &config(),
        );
        assert!(pipeline.smoother().state("b").is_some());
        assert!(pipeline.smoother().state("c").is_none());
        assert_eq!(pipeline.smoother().len(), 2);
    }

    #[test]
    fn reset_forgets_history() {
        let mut pipeline = MirrorPipeline::new(&EngineOptions::default());
        pipeline.process_frame(&split_frame(), &[assignment("l", PositionLabel::Left, true)], &config());
        assert_eq!(pipeline.smoother().len(), 1);
        pipeline.reset();
        assert!(pipeline.smoother().is_empty());
    }
}
