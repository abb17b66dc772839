use std::str::FromStr;

use crate::error::ViewerError;

/// Pixel size of one terminal character cell. Both dimensions are always
/// strictly positive and finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    width: f32,
    height: f32,
}

impl CellSize {
    pub const FALLBACK: CellSize = CellSize {
        width: 15.0,
        height: 30.0,
    };

    pub fn new(width: f32, height: f32) -> Option<Self> {
        let valid = |v: f32| v.is_finite() && v > 0.0;
        if valid(width) && valid(height) {
            Some(Self { width, height })
        } else {
            None
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }
}

impl FromStr for CellSize {
    type Err = ViewerError;

    /// Parses `WIDTHxHEIGHT`, e.g. `12x26` or `9.5x19`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ViewerError::InvalidCellSize(s.to_string());
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let w: f32 = w.trim().parse().map_err(|_| invalid())?;
        let h: f32 = h.trim().parse().map_err(|_| invalid())?;
        CellSize::new(w, h).ok_or_else(invalid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalGeometry {
    pub columns: u16,
    pub rows: u16,
    pub cell: CellSize,
}

impl TerminalGeometry {
    pub fn new(columns: u16, rows: u16, cell: CellSize) -> Self {
        Self {
            columns,
            rows,
            cell,
        }
    }
}
