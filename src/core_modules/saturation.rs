// THEORY:
// Averaged screen colors come out muddy, and a light fixture washes them out further.
// The booster pushes every channel away from the color's mid-level,
// avg = (max + min) / 2, by a constant factor. It is a cheap stand-in for scaling HSL
// saturation: hue is preserved, lightness stays put, and no trigonometry is needed.
//
// factor = 1 is the identity, factor > 1 makes colors more vivid, factor < 1 pulls
// them toward gray and factor = 0 collapses them onto the mid-level. Grays
// (max == min) carry no hue to amplify and are returned untouched.

use crate::core_modules::pixel::Rgb;

pub type SaturationFactor = f32;

/// Scales each channel's distance from the color's mid-level by `factor`.
pub fn boost(rgb: Rgb, factor: SaturationFactor) -> Rgb {
    if rgb.is_achromatic() {
        return rgb;
    }

    let mid_level = ((rgb.max_channel() as u16 + rgb.min_channel() as u16) / 2) as f32;
    let [red, green, blue] = rgb
        .channels()
        .map(|channel| mid_level + (channel as f32 - mid_level) * factor);
    Rgb::from_f32_clamped(red, green, blue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_factor_is_identity() {
        for r in (0..=255u16).step_by(15) {
            for g in (0..=255u16).step_by(17) {
                for b in (0..=255u16).step_by(51) {
                    let rgb = Rgb::new(r as u8, g as u8, b as u8);
                    assert_eq!(boost(rgb, 1.0), rgb);
                }
            }
        }
    }

    #[test]
    fn grays_are_untouched() {
        assert_eq!(boost(Rgb::new(128, 128, 128), 3.0), Rgb::new(128, 128, 128));
        assert_eq!(boost(Rgb::BLACK, 2.0), Rgb::BLACK);
    }

    #[test]
    fn boost_spreads_channels_around_mid_level() {
        // mid-level = (180 + 60) / 2 = 120
        let boosted = boost(Rgb::new(180, 100, 60), 1.5);
        assert_eq!(boosted, Rgb::new(210, 90, 30));
        assert!(boosted.chroma() > Rgb::new(180, 100, 60).chroma());
    }

    #[test]
    fn boost_clamps_to_channel_range() {
        assert_eq!(boost(Rgb::new(250, 10, 10), 2.0), Rgb::new(255, 0, 0));
    }

    #[test]
    fn zero_factor_flattens_to_mid_level() {
        assert_eq!(boost(Rgb::new(200, 50, 100), 0.0), Rgb::new(125, 125, 125));
    }
}
