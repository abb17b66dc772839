//! Tunables for the viewer. Every field has a default so a config file only
//! needs the values it overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};

use crate::error::ViewerError;
use crate::state::{DarkMode, DualPageMode, FitMode, ForceMode};

/// Word-count thresholds that drive text/image/mixed classification.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// At or above this many substantial words a page is always text.
    pub text_words: usize,
    /// Below this many words a page with visual content is an image.
    pub sparse_words: usize,
    /// Mixed pages have fewer than this many words.
    pub mixed_max_words: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            text_words: 50,
            sparse_words: 3,
            mixed_max_words: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct VisualSampling {
    pub min_dimension: u32,
    pub stride: u32,
    pub white_threshold: u8,
    pub alpha_cutoff: u8,
    pub min_non_white: usize,
    pub variance_stride: u32,
    pub variance_threshold: f64,
    pub min_variance_samples: usize,
}

impl Default for VisualSampling {
    fn default() -> Self {
        Self {
            min_dimension: 50,
            stride: 10,
            white_threshold: 240,
            alpha_cutoff: 10,
            min_non_white: 20,
            variance_stride: 20,
            variance_threshold: 100.0,
            min_variance_samples: 10,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub settle_interval: Duration,
    pub settle_attempts: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub control_interval: Duration,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            settle_interval: Duration::from_millis(100),
            settle_attempts: 5,
            control_interval: Duration::from_millis(100),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub classifier: ClassifierThresholds,
    pub sampling: VisualSampling,
    pub reload: ReloadConfig,
    /// Narrowest column count text is ever wrapped to.
    pub min_reflow_width: usize,
    /// Fraction of short lines above which a page is treated as pre-wrapped.
    pub prewrapped_ratio: f64,
    pub min_dpi: f32,
    pub max_dpi: f32,
    /// Channel value white maps to under simple inversion.
    pub invert_floor: u8,
    /// Lightness white maps to under smart inversion.
    pub lightness_floor: f32,
    /// Layout width in points at 100% zoom for reflowable documents.
    pub reflow_page_width: f32,
    pub fit: FitMode,
    pub dark: DarkMode,
    pub force: ForceMode,
    pub dual: DualPageMode,
    pub scale: f32,
    /// Environment variable consulted for a `WxH` cell size override.
    pub cell_size_env: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub probe_timeout: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierThresholds::default(),
            sampling: VisualSampling::default(),
            reload: ReloadConfig::default(),
            min_reflow_width: 20,
            prewrapped_ratio: 0.3,
            min_dpi: 36.0,
            max_dpi: 300.0,
            invert_floor: 30,
            lightness_floor: 0.12,
            reflow_page_width: 450.0,
            fit: FitMode::Height,
            dark: DarkMode::Off,
            force: ForceMode::Auto,
            dual: DualPageMode::Off,
            scale: 1.0,
            cell_size_env: "TERMDOC_CELL_SIZE".to_string(),
            probe_timeout: Duration::from_millis(100),
        }
    }
}

impl ViewerConfig {
    pub fn from_toml(source: &str) -> Result<Self, ViewerError> {
        Ok(toml::from_str(source)?)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config = Self::from_toml(&source)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        Ok(config)
    }
}
