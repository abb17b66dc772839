use rayon::prelude::*;
use termdoc_core::{DarkMode, RenderImage, ViewerConfig};

/// How dark the darkest output of each transform gets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DarkFloors {
    /// Channel value that pure white maps to under simple inversion.
    pub invert_floor: u8,
    /// Lightness that pure white maps to under smart inversion.
    pub lightness_floor: f32,
}

impl Default for DarkFloors {
    fn default() -> Self {
        Self {
            invert_floor: 30,
            lightness_floor: 0.12,
        }
    }
}

impl From<&ViewerConfig> for DarkFloors {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            invert_floor: config.invert_floor,
            lightness_floor: config.lightness_floor.clamp(0.0, 1.0),
        }
    }
}

pub fn apply_dark_mode(image: &mut RenderImage, mode: DarkMode, floors: DarkFloors) {
    match mode {
        DarkMode::Off => {}
        DarkMode::Simple => image.pixels.par_chunks_exact_mut(4).for_each(|px| {
            px[0] = simple_invert(px[0], floors.invert_floor);
            px[1] = simple_invert(px[1], floors.invert_floor);
            px[2] = simple_invert(px[2], floors.invert_floor);
        }),
        DarkMode::Smart => image.pixels.par_chunks_exact_mut(4).for_each(|px| {
            let [r, g, b] = smart_invert([px[0], px[1], px[2]], floors.lightness_floor);
            px[0] = r;
            px[1] = g;
            px[2] = b;
        }),
    }
}

/// Inverts one channel into `floor..=255` so white becomes dark grey
/// rather than black.
pub fn simple_invert(value: u8, floor: u8) -> u8 {
    let inverted = 255 - u32::from(value);
    let floor = u32::from(floor);
    (floor + inverted * (255 - floor) / 255) as u8
}

/// Inverts lightness only, keeping hue and saturation.
pub fn smart_invert(rgb: [u8; 3], lightness_floor: f32) -> [u8; 3] {
    let (h, s, l) = rgb_to_hsl(rgb);
    let l = lightness_floor + (1.0 - l) * (1.0 - lightness_floor);
    hsl_to_rgb(h, s, l)
}

fn rgb_to_hsl([r, g, b]: [u8; 3]) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if (max - min).abs() < f32::EPSILON {
        return (0.0, 0.0, l);
    }
    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h / 6.0, s, l)
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [u8; 3] {
    let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    if s == 0.0 {
        let v = to_byte(l);
        return [v, v, v];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [
        to_byte(hue_to_channel(p, q, h + 1.0 / 3.0)),
        to_byte(hue_to_channel(p, q, h)),
        to_byte(hue_to_channel(p, q, h - 1.0 / 3.0)),
    ]
}

fn hue_to_channel(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_invert_maps_white_to_floor() {
        assert_eq!(simple_invert(255, 30), 30);
        assert_eq!(simple_invert(0, 30), 255);
        assert_eq!(simple_invert(255, 0), 0);
        assert!(simple_invert(128, 30) > 30);
    }

    #[test]
    fn smart_invert_darkens_white_and_lightens_black() {
        let white = smart_invert([255, 255, 255], 0.12);
        assert_eq!(white, [31, 31, 31]);
        assert_eq!(smart_invert([0, 0, 0], 0.12), [255, 255, 255]);
    }

    #[test]
    fn smart_invert_keeps_hue() {
        let [r, g, b] = smart_invert([200, 30, 30], 0.12);
        assert!(r > g && r > b);
        assert_eq!(g, b);

        let [r, g, b] = smart_invert([20, 40, 180], 0.12);
        assert!(b > r && b > g);
    }

    #[test]
    fn hsl_round_trips_primary_colours() {
        for rgb in [[255, 0, 0], [0, 255, 0], [0, 0, 255], [120, 60, 200], [7, 7, 7]] {
            let (h, s, l) = rgb_to_hsl(rgb);
            assert_eq!(hsl_to_rgb(h, s, l), rgb);
        }
    }

    #[test]
    fn transforms_preserve_alpha() {
        let mut image = RenderImage::filled(4, 4, [255, 255, 255, 77]);
        apply_dark_mode(&mut image, DarkMode::Simple, DarkFloors::default());
        assert_eq!(image.pixel(3, 3), Some([30, 30, 30, 77]));

        let mut image = RenderImage::filled(2, 2, [255, 255, 255, 9]);
        apply_dark_mode(&mut image, DarkMode::Smart, DarkFloors::default());
        assert_eq!(image.pixel(0, 1), Some([31, 31, 31, 9]));

        let mut image = RenderImage::filled(2, 2, [10, 20, 30, 255]);
        apply_dark_mode(&mut image, DarkMode::Off, DarkFloors::default());
        assert_eq!(image.pixel(1, 1), Some([10, 20, 30, 255]));
    }
}
