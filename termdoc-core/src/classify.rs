//! Decides how a page should be presented: as reflowed text, as a raster
//! image, or as an image with its text underneath.

use crate::config::{ClassifierThresholds, VisualSampling};
use crate::state::ForceMode;
use crate::RenderImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Image,
    Mixed,
}

impl ContentKind {
    pub fn label(self) -> &'static str {
        match self {
            ContentKind::Text => "Text",
            ContentKind::Image => "Image",
            ContentKind::Mixed => "Image+Text",
        }
    }
}

/// Words longer than one character.
pub fn count_substantial_words(text: &str) -> usize {
    text.split_whitespace()
        .filter(|word| word.chars().count() > 1)
        .count()
}

pub fn classify(text: &str, has_visual: bool, force: ForceMode) -> ContentKind {
    classify_counts(
        count_substantial_words(text),
        has_visual,
        force,
        &ClassifierThresholds::default(),
    )
}

pub fn classify_counts(
    substantial_words: usize,
    has_visual: bool,
    force: ForceMode,
    thresholds: &ClassifierThresholds,
) -> ContentKind {
    match force {
        ForceMode::Text => return ContentKind::Text,
        ForceMode::Image => return ContentKind::Image,
        ForceMode::Auto => {}
    }

    if substantial_words >= thresholds.text_words {
        ContentKind::Text
    } else if substantial_words >= thresholds.sparse_words
        && substantial_words < thresholds.mixed_max_words
        && has_visual
    {
        ContentKind::Mixed
    } else if substantial_words < thresholds.sparse_words && has_visual {
        ContentKind::Image
    } else {
        ContentKind::Text
    }
}

/// Whether a page raster shows anything besides a blank background.
///
/// Counts sampled pixels that are noticeably darker than white and stops as
/// soon as enough are found. Large uniform non-white areas (photographs,
/// tinted backgrounds) are caught by a coarser colour-variance pass.
pub fn has_visual_content(image: &RenderImage, sampling: &VisualSampling) -> bool {
    if image.width < sampling.min_dimension || image.height < sampling.min_dimension {
        return false;
    }

    let stride = sampling.stride.max(1) as usize;
    let mut non_white = 0usize;
    for y in (0..image.height).step_by(stride) {
        for x in (0..image.width).step_by(stride) {
            let Some([r, g, b, a]) = image.pixel(x, y) else {
                continue;
            };
            if a < sampling.alpha_cutoff {
                continue;
            }
            let limit = sampling.white_threshold;
            if r < limit || g < limit || b < limit {
                non_white += 1;
                if non_white >= sampling.min_non_white {
                    return true;
                }
            }
        }
    }

    color_variance(image, sampling) > sampling.variance_threshold
}

/// Summed population variance of the R, G and B channels.
fn color_variance(image: &RenderImage, sampling: &VisualSampling) -> f64 {
    let stride = sampling.variance_stride.max(1) as usize;
    let mut sums = [0f64; 3];
    let mut squares = [0f64; 3];
    let mut count = 0usize;

    for y in (0..image.height).step_by(stride) {
        for x in (0..image.width).step_by(stride) {
            let Some(px) = image.pixel(x, y) else {
                continue;
            };
            if px[3] < sampling.alpha_cutoff {
                continue;
            }
            for channel in 0..3 {
                let v = f64::from(px[channel]);
                sums[channel] += v;
                squares[channel] += v * v;
            }
            count += 1;
        }
    }

    if count < sampling.min_variance_samples {
        return 0.0;
    }

    let n = count as f64;
    (0..3)
        .map(|channel| {
            let mean = sums[channel] / n;
            squares[channel] / n - mean * mean
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampling() -> VisualSampling {
        VisualSampling::default()
    }

    #[test]
    fn classify_matches_reference_table() {
        let t = ClassifierThresholds::default();
        assert_eq!(classify_counts(60, false, ForceMode::Auto, &t), ContentKind::Text);
        assert_eq!(classify_counts(10, true, ForceMode::Auto, &t), ContentKind::Mixed);
        assert_eq!(classify_counts(1, true, ForceMode::Auto, &t), ContentKind::Image);
        assert_eq!(classify_counts(1, false, ForceMode::Auto, &t), ContentKind::Text);
        for words in [0, 5, 30, 500] {
            for visual in [false, true] {
                assert_eq!(classify_counts(words, visual, ForceMode::Image, &t), ContentKind::Image);
                assert_eq!(classify_counts(words, visual, ForceMode::Text, &t), ContentKind::Text);
            }
        }
    }

    #[test]
    fn moderately_dense_pages_with_pictures_stay_text() {
        let t = ClassifierThresholds::default();
        assert_eq!(classify_counts(20, true, ForceMode::Auto, &t), ContentKind::Text);
        assert_eq!(classify_counts(49, true, ForceMode::Auto, &t), ContentKind::Text);
        assert_eq!(classify_counts(3, true, ForceMode::Auto, &t), ContentKind::Mixed);
        assert_eq!(classify_counts(19, true, ForceMode::Auto, &t), ContentKind::Mixed);
    }

    #[test]
    fn single_letter_tokens_are_not_substantial() {
        assert_eq!(count_substantial_words("a I x of the  cat\n7 42"), 4);
        assert_eq!(
            classify("a b c d e f g", true, ForceMode::Auto),
            ContentKind::Image
        );
    }

    #[test]
    fn blank_raster_has_no_visual_content() {
        let image = RenderImage::filled(200, 200, [255, 255, 255, 255]);
        assert!(!has_visual_content(&image, &sampling()));
    }

    #[test]
    fn tiny_rasters_are_rejected() {
        let image = RenderImage::filled(40, 400, [0, 0, 0, 255]);
        assert!(!has_visual_content(&image, &sampling()));
    }

    #[test]
    fn transparent_pixels_are_ignored() {
        let image = RenderImage::filled(200, 200, [0, 0, 0, 0]);
        assert!(!has_visual_content(&image, &sampling()));
    }

    #[test]
    fn dark_strokes_count_as_content() {
        let mut image = RenderImage::filled(200, 200, [255, 255, 255, 255]);
        // one dark row sampled by the stride-10 pass
        for x in 0..200u32 {
            let idx = (50 * 200 + x as usize) * 4;
            image.pixels[idx..idx + 3].copy_from_slice(&[10, 10, 10]);
        }
        assert!(has_visual_content(&image, &sampling()));
    }

    #[test]
    fn variance_catches_light_photographs() {
        // every pixel stays above the whiteness threshold, yet the colours vary
        let mut image = RenderImage::filled(200, 200, [255, 255, 255, 255]);
        for y in 0..200u32 {
            for x in 0..200u32 {
                let idx = (y as usize * 200 + x as usize) * 4;
                let v = if (x / 20 + y / 20) % 2 == 0 { 241 } else { 255 };
                let tint = if x % 40 < 20 { 241 } else { 255 };
                image.pixels[idx] = v;
                image.pixels[idx + 1] = tint;
                image.pixels[idx + 2] = 255 - (v - 241);
            }
        }
        let strict = VisualSampling {
            variance_threshold: 50.0,
            ..sampling()
        };
        assert!(has_visual_content(&image, &strict));
    }
}
