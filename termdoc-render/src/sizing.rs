//! Page raster sizing: turns a cell budget into a render DPI, then crops and
//! recolours the raster and reports how many cells it occupies.

use std::ops::RangeInclusive;

use anyhow::{anyhow, Context, Result};
use image::{imageops, RgbaImage};
use termdoc_core::pages::REFERENCE_DPI;
use termdoc_core::{CellSize, DocumentBackend, FitMode, PageEntry, RenderImage, ViewerConfig, ViewerState};
use tracing::{debug, instrument};

use crate::color::{apply_dark_mode, DarkFloors};

/// Character cells available to one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellBudget {
    pub columns: u16,
    pub rows: u16,
}

impl CellBudget {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.columns == 0 || self.rows == 0
    }

    /// Pixel size of the budget at a given cell size and zoom.
    pub fn pixels(&self, cell: CellSize, scale: f32) -> (f32, f32) {
        (
            self.columns as f32 * cell.width() * scale,
            self.rows as f32 * cell.height() * scale,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSizing {
    pub dpi: f32,
    /// Expected raster size at `dpi`.
    pub pixel_width: u32,
    pub pixel_height: u32,
}

pub fn size_page(
    reference: (u32, u32),
    budget: CellBudget,
    fit: FitMode,
    scale: f32,
    cell: CellSize,
    dpi_range: RangeInclusive<f32>,
) -> PageSizing {
    let (min_dpi, max_dpi) = (*dpi_range.start(), *dpi_range.end());
    let (ref_w, ref_h) = (reference.0 as f32, reference.1 as f32);
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
    let (budget_w, budget_h) = budget.pixels(cell, scale);

    let fallback = REFERENCE_DPI.clamp(min_dpi, max_dpi);
    let dpi = if ref_w <= 0.0 || ref_h <= 0.0 || budget_w <= 0.0 || budget_h <= 0.0 {
        fallback
    } else {
        let aspect = ref_w / ref_h;
        let (width, height) = match fit {
            FitMode::Height => {
                let (mut w, mut h) = (budget_h * aspect, budget_h);
                if w > budget_w {
                    w = budget_w;
                    h = w / aspect;
                }
                (w, h)
            }
            FitMode::Width => (budget_w, budget_w / aspect),
            FitMode::Auto => {
                let (mut w, mut h) = (budget_w, budget_w / aspect);
                if h > budget_h {
                    h = budget_h;
                    w = h * aspect;
                }
                (w, h)
            }
        };
        let dpi = (width / ref_w * REFERENCE_DPI).min(height / ref_h * REFERENCE_DPI);
        if dpi.is_finite() {
            dpi.clamp(min_dpi, max_dpi)
        } else {
            fallback
        }
    };

    let factor = dpi / REFERENCE_DPI;
    PageSizing {
        dpi,
        pixel_width: (ref_w * factor).round() as u32,
        pixel_height: (ref_h * factor).round() as u32,
    }
}

/// Cells covered by a raster, rounded up and clamped to the budget.
pub fn cell_footprint(width: u32, height: u32, cell: CellSize, budget: CellBudget) -> (u16, u16) {
    let columns = (width as f32 / cell.width()).ceil() as u32;
    let rows = (height as f32 / cell.height()).ceil() as u32;
    (
        columns.clamp(1, u32::from(budget.columns.max(1))) as u16,
        rows.clamp(1, u32::from(budget.rows.max(1))) as u16,
    )
}

/// Crops a raster that overflows `max_width` x `max_height`. The kept region
/// is centred horizontally and starts at the top of the page.
pub fn crop_to_visible(image: RenderImage, max_width: u32, max_height: u32) -> Result<RenderImage> {
    let max_width = max_width.max(1);
    let max_height = max_height.max(1);
    if image.width <= max_width && image.height <= max_height {
        return Ok(image);
    }
    let (width, height) = (image.width, image.height);
    let buffer = RgbaImage::from_raw(width, height, image.pixels)
        .ok_or_else(|| anyhow!("raster buffer does not match {}x{}", width, height))?;
    let crop_w = width.min(max_width);
    let crop_h = height.min(max_height);
    let x = (width - crop_w) / 2;
    let cropped = imageops::crop_imm(&buffer, x, 0, crop_w, crop_h).to_image();
    Ok(RenderImage {
        width: crop_w,
        height: crop_h,
        pixels: cropped.into_raw(),
    })
}

/// A raster ready to paint plus its footprint in cells.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub image: RenderImage,
    pub columns: u16,
    pub rows: u16,
    pub sizing: PageSizing,
}

/// Rasterizes pages to fit a cell budget under the current view settings.
pub struct ImageCompositor<'a> {
    config: &'a ViewerConfig,
    cell: CellSize,
}

impl<'a> ImageCompositor<'a> {
    pub fn new(config: &'a ViewerConfig, cell: CellSize) -> Self {
        Self { config, cell }
    }

    pub fn cell(&self) -> CellSize {
        self.cell
    }

    #[instrument(skip_all, fields(page = entry.index, columns = budget.columns, rows = budget.rows))]
    pub fn prepare(
        &self,
        backend: &dyn DocumentBackend,
        entry: &PageEntry,
        budget: CellBudget,
        state: &ViewerState,
    ) -> Result<PreparedImage> {
        if budget.is_empty() {
            return Err(anyhow!("no room for page {}", entry.index + 1));
        }
        let probe = entry
            .probe(backend, &self.config.sampling)
            .ok_or_else(|| anyhow!("page {} has no reference raster", entry.index + 1))?;
        let sizing = size_page(
            (probe.width, probe.height),
            budget,
            state.fit_mode,
            state.scale,
            self.cell,
            self.config.min_dpi..=self.config.max_dpi,
        );
        debug!(dpi = sizing.dpi, width = sizing.pixel_width, height = sizing.pixel_height, "rendering page");

        let raster = backend
            .render_page(entry.index, sizing.dpi)
            .with_context(|| format!("failed to render page {} at {:.0} dpi", entry.index + 1, sizing.dpi))?;
        if raster.is_empty() {
            return Err(anyhow!("page {} rendered to an empty raster", entry.index + 1));
        }

        let (visible_w, visible_h) = budget.pixels(self.cell, 1.0);
        let mut image = crop_to_visible(raster, visible_w.floor() as u32, visible_h.floor() as u32)?;
        apply_dark_mode(&mut image, state.dark_mode, DarkFloors::from(self.config));

        let (columns, rows) = cell_footprint(image.width, image.height, self.cell, budget);
        Ok(PreparedImage {
            image,
            columns,
            rows,
            sizing,
        })
    }
}
