pub mod color;
pub mod compose;
#[cfg(feature = "pdf")]
mod pdfium;
pub mod sizing;

pub use color::{apply_dark_mode, smart_invert, simple_invert, DarkFloors};
pub use compose::{
    compose_frame, current_status, page_kind, status_line, truncate_with_ellipsis, ClearMode, DrawOp, FrameRequest,
    Overlay, RenderedFrame, Span, MARKER_GLYPH, PRIMARY_SLOT, SECONDARY_SLOT,
};
#[cfg(feature = "pdf")]
pub use pdfium::PdfiumRenderFactory;
pub use sizing::{cell_footprint, size_page, CellBudget, ImageCompositor, PageSizing, PreparedImage};

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};

    use anyhow::{anyhow, Result};
    use termdoc_core::pages::REFERENCE_DPI;
    use termdoc_core::{
        document_id_for_path, DocumentBackend, DocumentInfo, DocumentKind, DocumentMetadata, RenderImage,
    };

    /// Letter-sized pages with fixed text and a flat raster colour per page.
    pub struct StubBackend {
        info: DocumentInfo,
        texts: Vec<Option<String>>,
        rasters: Vec<[u8; 4]>,
        broken: HashSet<usize>,
    }

    impl StubBackend {
        /// Pages without a raster colour cannot be rendered at all.
        pub fn new(texts: Vec<Option<&str>>, rasters: Vec<[u8; 4]>) -> Self {
            let path = PathBuf::from("/tmp/stub.pdf");
            Self {
                info: DocumentInfo {
                    id: document_id_for_path(Path::new(&path)),
                    path,
                    kind: DocumentKind::Pdf,
                    page_count: texts.len(),
                    metadata: DocumentMetadata::default(),
                },
                texts: texts.into_iter().map(|t| t.map(str::to_string)).collect(),
                rasters,
                broken: HashSet::new(),
            }
        }

        /// Keeps the reference raster working but fails any other resolution.
        pub fn with_broken_render(mut self, page: usize) -> Self {
            self.broken.insert(page);
            self
        }
    }

    impl DocumentBackend for StubBackend {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        fn page_text(&self, page_index: usize) -> Result<String> {
            self.texts
                .get(page_index)
                .cloned()
                .flatten()
                .ok_or_else(|| anyhow!("no text for page {}", page_index))
        }

        fn render_page(&self, page_index: usize, dpi: f32) -> Result<RenderImage> {
            let rgba = self
                .rasters
                .get(page_index)
                .copied()
                .ok_or_else(|| anyhow!("page {} cannot be rasterized", page_index))?;
            if self.broken.contains(&page_index) && (dpi - REFERENCE_DPI).abs() > f32::EPSILON {
                return Err(anyhow!("renderer crashed on page {}", page_index));
            }
            let factor = dpi / REFERENCE_DPI;
            let width = (612.0 * factor).round() as u32;
            let height = (792.0 * factor).round() as u32;
            Ok(RenderImage::filled(width, height, rgba))
        }
    }

    pub fn words(count: usize) -> String {
        (0..count).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ")
    }
}
