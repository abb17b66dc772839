use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::Deserialize;

use crate::error::ViewerError;

pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 2.0;
pub const SCALE_STEP: f32 = 0.1;

macro_rules! cyclic_mode {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal, default = $default:ident,
        [$($variant:ident => $label:literal),+ $(,)?]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            const ORDER: &'static [$name] = &[$($name::$variant),+];

            /// The next mode in the fixed cycle, wrapping around.
            pub fn cycle(self) -> Self {
                let pos = Self::ORDER.iter().position(|m| *m == self).unwrap_or(0);
                Self::ORDER[(pos + 1) % Self::ORDER.len()]
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = ViewerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_lowercase();
                Self::ORDER
                    .iter()
                    .copied()
                    .find(|m| m.label() == wanted)
                    .ok_or_else(|| ViewerError::InvalidMode {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

cyclic_mode!(
    /// How a page raster is reconciled with the available cell area.
    FitMode, "fit", default = Height,
    [Height => "height", Width => "width", Auto => "auto"]
);

cyclic_mode!(
    /// Overrides automatic text/image/mixed classification.
    ForceMode, "force", default = Auto,
    [Auto => "auto", Text => "text", Image => "image"]
);

cyclic_mode!(
    DarkMode, "dark", default = Off,
    [Off => "off", Smart => "smart", Simple => "simple"]
);

cyclic_mode!(
    DualPageMode, "dual", default = Off,
    [Off => "off", Vertical => "vertical", Horizontal => "horizontal"]
);

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage { count: usize },
    PrevPage { count: usize },
    FirstPage,
    LastPage,
    /// 1-based position in the content page list.
    GotoPage { number: usize },
    ScaleBy { delta: f32 },
    CycleFitMode,
    CycleForceMode,
    CycleDarkMode,
    CycleDualPage,
    Search { query: String },
    SearchNext { count: usize },
    SearchPrev { count: usize },
    ClearSearch,
}

/// Everything the user can change about the view. Written only by the event
/// loop; renderers receive it by shared reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub current_page: usize,
    pub force_mode: ForceMode,
    pub fit_mode: FitMode,
    pub scale: f32,
    pub dark_mode: DarkMode,
    pub dual_page: DualPageMode,
    pub search_query: String,
    pub search_hits: Vec<usize>,
    pub search_cursor: usize,
    pub last_modified: Option<SystemTime>,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            current_page: 0,
            force_mode: ForceMode::Auto,
            fit_mode: FitMode::Height,
            scale: 1.0,
            dark_mode: DarkMode::Off,
            dual_page: DualPageMode::Off,
            search_query: String::new(),
            search_hits: Vec::new(),
            search_cursor: 0,
            last_modified: None,
        }
    }
}

impl ViewerState {
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = clamp_scale(scale);
        self
    }

    pub fn has_search(&self) -> bool {
        !self.search_query.is_empty()
    }
}

/// Clamps to the supported zoom range, rounded to one decimal so repeated
/// steps do not accumulate float drift.
pub fn clamp_scale(scale: f32) -> f32 {
    if !scale.is_finite() {
        return 1.0;
    }
    ((scale * 10.0).round() / 10.0).clamp(MIN_SCALE, MAX_SCALE)
}

/// Parses a 1-based page number typed by the user. Anything that is not a
/// positive integer is rejected.
pub fn parse_page_number(input: &str) -> Option<usize> {
    input.trim().parse::<usize>().ok().filter(|&n| n >= 1)
}
