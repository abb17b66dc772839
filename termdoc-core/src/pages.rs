use std::sync::Arc;
use std::time::SystemTime;

use once_cell::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::classify::{count_substantial_words, has_visual_content};
use crate::config::VisualSampling;
use crate::error::ViewerError;
use crate::{DocumentBackend, DocumentInfo};

/// Resolution of the raster used for aspect ratio and blank-page detection.
pub const REFERENCE_DPI: f32 = 72.0;

/// Pages with at least this many words are content pages without looking at
/// their raster.
const MIN_TEXT_WORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterProbe {
    pub width: u32,
    pub height: u32,
    pub has_visual: bool,
}

#[derive(Debug)]
pub struct PageEntry {
    pub index: usize,
    text: Option<String>,
    substantial_words: usize,
    probe: OnceCell<Option<RasterProbe>>,
}

impl PageEntry {
    fn new(index: usize, text: Option<String>) -> Self {
        let substantial_words = text.as_deref().map(count_substantial_words).unwrap_or(0);
        Self {
            index,
            text,
            substantial_words,
            probe: OnceCell::new(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn substantial_words(&self) -> usize {
        self.substantial_words
    }

    /// The 72 DPI raster probe, computed on first use. `None` when the backend
    /// cannot rasterize the page.
    pub fn probe(
        &self,
        backend: &dyn DocumentBackend,
        sampling: &VisualSampling,
    ) -> Option<RasterProbe> {
        *self.probe.get_or_init(|| match backend.render_page(self.index, REFERENCE_DPI) {
            Ok(image) => Some(RasterProbe {
                width: image.width,
                height: image.height,
                has_visual: has_visual_content(&image, sampling),
            }),
            Err(err) => {
                warn!(?err, page = self.index, "failed to rasterize reference page");
                None
            }
        })
    }

    pub fn has_visual(&self, backend: &dyn DocumentBackend, sampling: &VisualSampling) -> bool {
        self.probe(backend, sampling)
            .map(|probe| probe.has_visual)
            .unwrap_or(false)
    }
}

/// Backend pages worth showing, in document order.
#[derive(Debug, Default)]
pub struct PageList {
    entries: Vec<PageEntry>,
}

impl PageList {
    #[instrument(skip(backend, sampling), fields(pages = backend.page_count()))]
    pub fn build(backend: &dyn DocumentBackend, sampling: &VisualSampling) -> Self {
        let mut entries = Vec::new();
        for index in 0..backend.page_count() {
            let text = match backend.page_text(index) {
                Ok(text) => Some(text),
                Err(err) => {
                    debug!(?err, page = index, "no extractable text");
                    None
                }
            };
            let words = text
                .as_deref()
                .map(|t| t.split_whitespace().count())
                .unwrap_or(0);
            let entry = PageEntry::new(index, text);
            if words >= MIN_TEXT_WORDS || entry.has_visual(backend, sampling) {
                entries.push(entry);
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&PageEntry> {
        self.entries.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageEntry> {
        self.entries.iter()
    }

    pub fn position_of(&self, backend_index: usize) -> Option<usize> {
        self.entries.iter().position(|e| e.index == backend_index)
    }

    /// Maps a backend page to a list position: the exact page if it is listed,
    /// else the first listed page after it, else the last page.
    pub fn nearest_position(&self, backend_index: usize) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        self.position_of(backend_index)
            .or_else(|| self.entries.iter().position(|e| e.index >= backend_index))
            .or(Some(self.entries.len() - 1))
    }
}

/// An opened document together with its content pages.
pub struct LoadedDocument {
    pub backend: Arc<dyn DocumentBackend>,
    pub pages: PageList,
    pub modified: Option<SystemTime>,
}

impl LoadedDocument {
    pub fn load(
        backend: Arc<dyn DocumentBackend>,
        sampling: &VisualSampling,
    ) -> Result<Self, ViewerError> {
        let pages = PageList::build(backend.as_ref(), sampling);
        if pages.is_empty() {
            return Err(ViewerError::NoContentPages);
        }
        let modified = std::fs::metadata(&backend.info().path)
            .and_then(|meta| meta.modified())
            .ok();
        Ok(Self {
            backend,
            pages,
            modified,
        })
    }

    pub fn info(&self) -> &DocumentInfo {
        self.backend.info()
    }
}
