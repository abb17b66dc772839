use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

pub mod classify;
pub mod config;
pub mod control;
pub mod error;
pub mod geometry;
pub mod pages;
pub mod reflow;
pub mod reload;
pub mod search;
pub mod state;
pub mod viewer;

pub use classify::{classify, classify_counts, count_substantial_words, has_visual_content, ContentKind};
pub use config::{ClassifierThresholds, ReloadConfig, ViewerConfig, VisualSampling};
pub use control::{control_path_for, parse_control_page, ControlChannel};
pub use error::ViewerError;
pub use geometry::{CellSize, TerminalGeometry};
pub use pages::{LoadedDocument, PageEntry, PageList, RasterProbe};
pub use reflow::reflow;
pub use reload::{check_for_reload, ReloadCheck};
pub use search::SearchIndex;
pub use state::{parse_page_number, Command, DarkMode, DualPageMode, FitMode, ForceMode, ViewerState};
pub use viewer::{Outcome, Viewer};

pub type DocumentId = Uuid;

const DOCUMENT_NAMESPACE: Uuid = Uuid::from_u128(0x3d1f7a52_0c4e_5b8e_9a61_2f64c0d9e1b7);

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = absolute_path(path);
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

pub fn absolute_path(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Broad document family, used where layout rules differ between fixed-page
/// and reflowable formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentKind {
    #[default]
    Pdf,
    Epub,
    Docx,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "epub" => DocumentKind::Epub,
            "docx" => DocumentKind::Docx,
            _ => DocumentKind::Pdf,
        }
    }

    /// Markup-derived text from these formats still carries named entities.
    pub fn has_markup_entities(self) -> bool {
        matches!(self, DocumentKind::Epub)
    }

    /// Formats whose backend lays pages out at a requested size. Only such
    /// a backend makes zoom-driven relayout and the "zoom @pt" status reachable;
    /// the bundled pdfium backend opens PDFs only.
    pub fn is_reflowable(self) -> bool {
        matches!(self, DocumentKind::Epub | DocumentKind::Docx)
    }

    pub fn label(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "PDF",
            DocumentKind::Epub => "EPUB",
            DocumentKind::Docx => "DOCX",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

impl DocumentInfo {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("<unknown>")
    }
}

/// An RGBA8 bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Page-level access to an opened document. Every call may fail for a single
/// page without invalidating the document.
pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    fn page_count(&self) -> usize {
        self.info().page_count
    }

    fn page_text(&self, page_index: usize) -> Result<String>;

    fn render_page(&self, page_index: usize, dpi: f32) -> Result<RenderImage>;

    /// Re-lays out a reflowable document for the given page box (points) and
    /// base font size. Fixed-layout backends, pdfium among them, keep this
    /// no-op.
    fn relayout(&self, _page_width: f32, _page_height: f32, _em: f32) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
}
